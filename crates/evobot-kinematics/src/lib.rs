//! EvoBot 10 自由度机械臂运动学
//!
//! - [`RobotModel`]：标准 DH 参数模型 + 关节限位
//! - [`KinematicsSolver`]：正解、阻尼最小二乘迭代逆解、几何雅可比、
//!   可操作性 / 奇异性判定
//! - [`workspace`]：关节空间蒙特卡洛采样的工作空间分析
//!
//! 所有角度单位为弧度，长度单位为米。编码器值与弧度的换算
//! （3000 计数 ↔ 2π）在 [`JointLimit::from_counts`]。
//!
//! 数值失败走 [`KinematicsError`]，不 panic。

mod model;
mod solver;
mod types;
pub mod workspace;

pub use model::{DhParam, JointLimit, RobotModel};
pub use solver::{IkConfig, IkSolution, KinematicsSolver};
pub use types::{JOINT_COUNT, JointVector, Pose6D};
pub use workspace::WorkspaceReport;

use thiserror::Error;

/// 运动学错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum KinematicsError {
    /// 输入关节数量不是 10
    #[error("Wrong joint count: expected {JOINT_COUNT}, got {actual}")]
    WrongJointCount { actual: usize },

    /// 逆解迭代耗尽仍未收敛（目标不可达或初值太差）
    #[error("Inverse kinematics did not converge after {iterations} iterations (residual {residual:.3e})")]
    NoConvergence { iterations: usize, residual: f64 },

    /// 逆解收敛但超出关节限位
    #[error("Solution out of limits at joint {joint}: {value:.4} rad not in [{min:.4}, {max:.4}]")]
    OutOfLimits {
        joint: usize,
        value: f64,
        min: f64,
        max: f64,
    },
}
