//! 反馈帧解析
//!
//! 支持两种状态反馈：
//!
//! - 手臂板 (0x73)：4 关节（关节 6-9，肩部 ×2 + 肘部 ×2）+ 总电流
//! - 手腕板 (0x74)：6 关节（关节 0-5，手指 ×5 + 手腕）+ 总电流
//!
//! 每个关节 6 字节：位置 / 速度 / 电流，均为 16-bit 大端。

use crate::constants::*;
use crate::{BoardId, CommandKind, FrameCodec, ProtocolError};

/// 单关节状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JointStatus {
    /// 关节编号（0-9，固定的关节身份索引）
    pub joint_id: u8,
    /// 编码器位置
    pub position: u16,
    /// 速度
    pub velocity: u16,
    /// 电流 (mA)
    pub current: u16,
}

/// 一帧状态反馈
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusFrame {
    /// 来源板卡
    pub board: BoardId,
    /// 关节状态（手臂板 4 个 / 手腕板 6 个）
    pub joints: Vec<JointStatus>,
    /// 板卡总电流 (mA)
    pub total_current: u16,
}

/// 解码状态反馈帧
///
/// 输入完整的原始帧（含帧头帧尾）。非状态类指令返回 `UnknownCommand`；
/// 上层接收路径对所有错误统一丢弃计数（见 §错误处理策略）。
pub fn decode_status(raw: &[u8]) -> Result<StatusFrame, ProtocolError> {
    let payload = FrameCodec::decode(raw)?;
    if payload.len() < PAYLOAD_HEADER_LEN {
        return Err(ProtocolError::InvalidLength {
            expected: PAYLOAD_HEADER_LEN,
            actual: payload.len(),
        });
    }

    let code = payload[5];
    let data = &payload[PAYLOAD_HEADER_LEN..];
    match CommandKind::try_from(code) {
        Ok(CommandKind::ArmStatus) => decode_joint_block(data, ARM_STATUS_LEN, 4, 6, BoardId::Arm),
        Ok(CommandKind::WristStatus) => {
            decode_joint_block(data, WRIST_STATUS_LEN, 6, 0, BoardId::Wrist)
        },
        _ => Err(ProtocolError::UnknownCommand { code }),
    }
}

/// 解析关节数据块：`count` 个关节 × 6 字节 + 2 字节总电流
fn decode_joint_block(
    data: &[u8],
    expected_len: usize,
    count: usize,
    first_joint_id: u8,
    board: BoardId,
) -> Result<StatusFrame, ProtocolError> {
    if data.len() < expected_len {
        return Err(ProtocolError::InvalidLength {
            expected: expected_len,
            actual: data.len(),
        });
    }

    let mut joints = Vec::with_capacity(count);
    for i in 0..count {
        let off = i * 6;
        joints.push(JointStatus {
            joint_id: first_joint_id + i as u8,
            position: u16::from_be_bytes([data[off], data[off + 1]]),
            velocity: u16::from_be_bytes([data[off + 2], data[off + 3]]),
            current: u16::from_be_bytes([data[off + 4], data[off + 5]]),
        });
    }

    let cur_off = count * 6;
    let total_current = u16::from_be_bytes([data[cur_off], data[cur_off + 1]]);

    Ok(StatusFrame {
        board,
        joints,
        total_current,
    })
}
