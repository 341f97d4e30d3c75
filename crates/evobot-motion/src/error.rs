//! 运动控制层错误

use evobot_kinematics::KinematicsError;
use evobot_planner::PlanningError;
use evobot_serial::TransportError;
use thiserror::Error;

/// 运动控制错误
///
/// 下层错误通过 `#[from]` 向上传递；安全校验失败携带足够的上下文
/// 供上层提示用户，绝不静默钳制用户指令。
#[derive(Debug, Error)]
pub enum MotionError {
    /// 串口未连接
    #[error("Serial transport is not connected")]
    NotConnected,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Kinematics(#[from] KinematicsError),

    #[error(transparent)]
    Planning(#[from] PlanningError),

    /// 目标位置超出软限位
    #[error("Joint {name} position {position} outside soft limits [{min}, {max}]")]
    SoftLimit {
        name: String,
        position: i32,
        min: i32,
        max: i32,
    },

    /// 关节编号越界
    #[error("Invalid joint id {joint}, expected 0-9")]
    InvalidJoint { joint: usize },

    /// 多点轨迹至少需要两个路径点
    #[error("At least 2 waypoints required, got {given}")]
    NotEnoughWaypoints { given: usize },

    /// 分段时长数量与路径段数不一致
    #[error("Expected {expected} segment durations, got {given}")]
    DurationCountMismatch { expected: usize, given: usize },

    /// 空轨迹无法执行
    #[error("Trajectory has no points")]
    EmptyTrajectory,

    /// 急停后未复位，拒绝一切运动指令
    #[error("Emergency stop latched, call reset_safety first")]
    EmergencyLatched,

    /// 轨迹执行期间不允许的操作（如切换控制模式）
    #[error("Operation not allowed while a trajectory is executing")]
    TrajectoryActive,

    /// 配置解析失败
    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
