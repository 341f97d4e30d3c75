//! # EvoBot Protocol
//!
//! 机械臂 RS-485 总线协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `constants`: 协议常量定义（帧头/帧尾/转义字符等）
//! - `codec`: 帧编解码（转义 + 校验和）
//! - `command`: 控制帧构建（位置控制 / 状态查询 / ID 配置）
//! - `feedback`: 反馈帧解析（手臂板 / 手腕板状态）
//! - `assembler`: 字节流分帧器（从原始接收流中切出完整帧）
//!
//! ## 字节序
//!
//! 协议中所有 16-bit 字段均为高位在前（大端字节序）。

pub mod assembler;
pub mod codec;
pub mod command;
pub mod constants;
pub mod feedback;

pub use assembler::FrameAssembler;
pub use codec::FrameCodec;
pub use command::{encode_id_config, encode_position_command, encode_status_query};
pub use constants::*;
pub use feedback::{decode_status, JointStatus, StatusFrame};

use num_enum::TryFromPrimitive;
use thiserror::Error;

/// 协议解析错误类型
///
/// 按照解码边界策略（见 `decode_status` / `FrameCodec::decode`），
/// 错误帧在上层被丢弃计数，不会向控制路径传播。
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Frame too short: {len} bytes")]
    FrameTooShort { len: usize },

    #[error("Missing frame markers (header 0xFD / tail 0xF8)")]
    MissingMarkers,

    #[error("Checksum mismatch: received 0x{received:02X}, calculated 0x{calculated:02X}")]
    ChecksumMismatch { received: u8, calculated: u8 },

    #[error("Invalid payload length: expected at least {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Unknown command code: 0x{code:02X}")]
    UnknownCommand { code: u8 },

    #[error("Unknown board id: 0x{id:02X}")]
    UnknownBoard { id: u8 },
}

/// 指令类型
///
/// 对应帧 payload 中第 6 个字节（command 字段）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum CommandKind {
    /// 位置控制指令（10 关节 × 4 字节）
    PositionControl = 0x71,
    /// 状态查询指令
    StatusQuery = 0x72,
    /// 手臂板状态反馈（4 关节 + 总电流）
    ArmStatus = 0x73,
    /// 手腕板状态反馈（6 关节 + 总电流）
    WristStatus = 0x74,
    /// ID 配置指令
    IdConfig = 0x75,
}

/// 板卡 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum BoardId {
    /// 手臂板（肩部 + 肘部，关节 6-9）
    Arm = 0x01,
    /// 手腕板（手指 + 手腕，关节 0-5）
    Wrist = 0x02,
}
