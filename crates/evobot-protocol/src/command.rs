//! 控制帧构建
//!
//! 与现有固件完全兼容的指令编码：
//!
//! - 位置控制 (0x71)：10 关节 × 4 字节（位置高/低字节、速度、保留）
//! - 状态查询 (0x72)：按板卡 ID 查询
//! - ID 配置 (0x75)：写电机 ID 寄存器

use crate::constants::*;
use crate::{BoardId, CommandKind};

/// 编码位置控制指令 (0x71)
///
/// 位置会被钳制到 `0..=3000` 的硬件量程（内部生成的中间点走显式收敛路径，
/// 见运动控制层的软限位检查；此处的钳制只是最后一道防线）。
///
/// `speeds` 为空时使用默认速度参数 `0x08`。
pub fn encode_position_command(positions: &[i32; JOINT_COUNT], speeds: Option<&[u8; JOINT_COUNT]>) -> Vec<u8> {
    let mut payload = Vec::with_capacity(PAYLOAD_HEADER_LEN + JOINT_COUNT * 4);
    payload.push(0x00); // 长度占位符
    payload.push(0x2C); // 长度 = 44 字节
    payload.push(SEQUENCE);
    payload.push(SOURCE_ID);
    payload.push(DEST_ID);
    payload.push(CommandKind::PositionControl as u8);

    for i in 0..JOINT_COUNT {
        let pos = positions[i].clamp(POSITION_MIN, POSITION_MAX) as u16;
        let speed = speeds.map_or(DEFAULT_SPEED, |s| s[i]);

        payload.push((pos >> 8) as u8);
        payload.push((pos & 0xFF) as u8);
        payload.push(speed);
        payload.push(0x00); // 保留字节
    }

    crate::FrameCodec::encode(&payload)
}

/// 编码状态查询指令 (0x72)
pub fn encode_status_query(board: BoardId) -> Vec<u8> {
    let payload = [
        0x00, // 长度占位符
        0x05, // 长度 = 5 字节
        SEQUENCE,
        SOURCE_ID,
        DEST_ID,
        CommandKind::StatusQuery as u8,
        board as u8,
    ];
    crate::FrameCodec::encode(&payload)
}

/// 编码 ID 配置指令 (0x75)
///
/// `board_type`: 0x01=肩部, 0x02=肘部, 0x03=手腕, 0x04=手指
pub fn encode_id_config(board_type: u8, register_addr: u8, motor_id: u8, data2: u8) -> Vec<u8> {
    let payload = [
        0x00, // 长度占位符
        0x09, // 长度 = 9 字节
        SEQUENCE,
        SOURCE_ID,
        DEST_ID,
        CommandKind::IdConfig as u8,
        board_type,
        0x01, // 写入个数
        register_addr,
        motor_id,
        data2,
    ];
    crate::FrameCodec::encode(&payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FrameCodec;

    #[test]
    fn test_position_command_layout() {
        let positions = [1500i32; JOINT_COUNT];
        let frame = encode_position_command(&positions, None);
        let payload = FrameCodec::decode(&frame).unwrap();

        assert_eq!(payload.len(), PAYLOAD_HEADER_LEN + JOINT_COUNT * 4);
        assert_eq!(payload[1], 0x2C);
        assert_eq!(payload[5], 0x71);
        // 1500 = 0x05DC
        assert_eq!(&payload[6..10], &[0x05, 0xDC, DEFAULT_SPEED, 0x00]);
    }

    #[test]
    fn test_position_command_clamps_out_of_range() {
        let mut positions = [1500i32; JOINT_COUNT];
        positions[0] = -100;
        positions[9] = 9999;
        let frame = encode_position_command(&positions, None);
        let payload = FrameCodec::decode(&frame).unwrap();

        assert_eq!(&payload[6..8], &[0x00, 0x00]); // clamped to 0
        assert_eq!(&payload[42..44], &[0x0B, 0xB8]); // clamped to 3000
    }

    #[test]
    fn test_position_command_custom_speeds() {
        let positions = [0i32; JOINT_COUNT];
        let speeds = [0x10u8; JOINT_COUNT];
        let frame = encode_position_command(&positions, Some(&speeds));
        let payload = FrameCodec::decode(&frame).unwrap();
        assert_eq!(payload[8], 0x10);
    }

    #[test]
    fn test_status_query_bytes() {
        let frame = encode_status_query(BoardId::Arm);
        assert_eq!(
            frame,
            vec![0xFD, 0x00, 0x05, 0x02, 0x01, 0x00, 0x72, 0x01, 0x7B, 0xF8]
        );

        let frame = encode_status_query(BoardId::Wrist);
        let payload = FrameCodec::decode(&frame).unwrap();
        assert_eq!(payload[6], 0x02);
    }

    #[test]
    fn test_id_config_layout() {
        let frame = encode_id_config(0x03, 0x05, 0x07, 0x00);
        let payload = FrameCodec::decode(&frame).unwrap();
        assert_eq!(payload[5], 0x75);
        assert_eq!(payload[6], 0x03);
        assert_eq!(payload[7], 0x01);
        assert_eq!(payload[8], 0x05);
        assert_eq!(payload[9], 0x07);
    }
}
