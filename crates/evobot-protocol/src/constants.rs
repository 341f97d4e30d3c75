//! 协议常量定义

/// 帧头
pub const FRAME_HEADER: u8 = 0xFD;
/// 帧尾
pub const FRAME_TAIL: u8 = 0xF8;
/// 转义字符
pub const ESCAPE_CHAR: u8 = 0xFE;
/// 需要转义的字节集合（帧头 / 转义字符 / 帧尾）
pub const ESCAPED_BYTES: [u8; 3] = [FRAME_HEADER, ESCAPE_CHAR, FRAME_TAIL];

/// 关节数量（5 手指 + 手腕 + 肩部 ×2 + 肘部 ×2）
pub const JOINT_COUNT: usize = 10;

/// 编码器位置下限
pub const POSITION_MIN: i32 = 0;
/// 编码器位置上限
pub const POSITION_MAX: i32 = 3000;
/// 编码器一圈对应的计数值（3000 counts = 360°）
pub const COUNTS_PER_REV: f64 = 3000.0;

/// 位置控制指令的默认速度参数
pub const DEFAULT_SPEED: u8 = 0x08;

/// 帧 payload 固定头部：长度占位 / 长度 / 序号 / 源 ID / 目标 ID / 指令
pub const PAYLOAD_HEADER_LEN: usize = 6;

/// 默认序号字节
pub const SEQUENCE: u8 = 0x02;
/// 源 ID（上位机）
pub const SOURCE_ID: u8 = 0x01;
/// 目标 ID（广播）
pub const DEST_ID: u8 = 0x00;

/// 手臂板状态数据长度：4 关节 × 6 字节 + 2 字节总电流
pub const ARM_STATUS_LEN: usize = 26;
/// 手腕板状态数据长度：6 关节 × 6 字节 + 2 字节总电流
pub const WRIST_STATUS_LEN: usize = 38;

/// 编码器计数转弧度（3000 counts ↔ 2π）
pub fn counts_to_rad(counts: f64) -> f64 {
    counts * std::f64::consts::TAU / COUNTS_PER_REV
}

/// 弧度转编码器计数
pub fn rad_to_counts(rad: f64) -> f64 {
    rad * COUNTS_PER_REV / std::f64::consts::TAU
}

/// 关节名称（诊断和安全提示用）
pub fn joint_name(joint_id: usize) -> &'static str {
    match joint_id {
        0 => "thumb",
        1 => "index",
        2 => "middle",
        3 => "ring",
        4 => "little",
        5 => "wrist",
        6 => "shoulder-1",
        7 => "shoulder-2",
        8 => "elbow-1",
        9 => "elbow-2",
        _ => "unknown",
    }
}
