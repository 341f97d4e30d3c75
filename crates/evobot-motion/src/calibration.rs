//! 标定映射
//!
//! 用户坐标（上层 API 看到的位置）与硬件坐标（固件编码器计数）
//! 之间的双向映射。控制路径在发送前套用 [`CalibrationMap::apply`]，
//! 反馈路径在上报前套用 [`CalibrationMap::reverse`]。

use evobot_protocol::JOINT_COUNT;

/// 用户坐标 ↔ 硬件坐标映射
///
/// 实现必须保证 `reverse(apply(p)) == p`（钳制到量程之前）。
pub trait CalibrationMap: Send + Sync {
    /// 用户坐标 → 硬件坐标
    fn apply(&self, user: &[i32; JOINT_COUNT]) -> [i32; JOINT_COUNT];

    /// 硬件坐标 → 用户坐标
    fn reverse(&self, hardware: &[i32; JOINT_COUNT]) -> [i32; JOINT_COUNT];
}

/// 恒等映射（未标定的设备）
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCalibration;

impl CalibrationMap for IdentityCalibration {
    fn apply(&self, user: &[i32; JOINT_COUNT]) -> [i32; JOINT_COUNT] {
        *user
    }

    fn reverse(&self, hardware: &[i32; JOINT_COUNT]) -> [i32; JOINT_COUNT] {
        *hardware
    }
}

/// 零位偏移标定：硬件坐标 = 用户坐标 + 零位偏移
#[derive(Debug, Clone, Copy, Default)]
pub struct OffsetCalibration {
    pub zero_offsets: [i32; JOINT_COUNT],
}

impl OffsetCalibration {
    pub fn new(zero_offsets: [i32; JOINT_COUNT]) -> Self {
        Self { zero_offsets }
    }
}

impl CalibrationMap for OffsetCalibration {
    fn apply(&self, user: &[i32; JOINT_COUNT]) -> [i32; JOINT_COUNT] {
        std::array::from_fn(|i| user[i] + self.zero_offsets[i])
    }

    fn reverse(&self, hardware: &[i32; JOINT_COUNT]) -> [i32; JOINT_COUNT] {
        std::array::from_fn(|i| hardware[i] - self.zero_offsets[i])
    }
}
