//! EvoBot 运动控制层
//!
//! 把下层各个部件（协议编解码、串口传输、运动学、路径规划）组装成
//! 完整的控制回路：
//!
//! - [`TrajectoryGenerator`]：五种插值策略的轨迹生成
//! - [`MotionInterpolator`]：固定周期实时插值循环
//! - [`MotionController`]：统一控制入口（软限位、标定映射、控制模式）
//! - [`DeviceMonitor`]：状态轮询与健康告警
//! - [`EventBus`]：类型化事件广播
//!
//! 所有部件通过构造函数显式注入依赖，没有全局单例。线程之间用
//! crossbeam 通道传递消息，共享状态仅限于小块短生命周期的缓存
//! （arc-swap 的遥测快照、parking_lot 保护的状态字段）。

pub mod calibration;
pub mod config;
mod controller;
mod error;
mod events;
mod interpolator;
mod monitor;
mod trajectory;

pub use calibration::{CalibrationMap, IdentityCalibration, OffsetCalibration};
pub use config::{ArmConfig, ControlConfig, JointConfig, MonitorConfig, SerialSettings};
pub use controller::{
    ControlMode, MotionController, MotionStatus, SafetyLevel, VelocityParameters, VelocityPreset,
};
pub use error::MotionError;
pub use events::{AlertLevel, ArmEvent, EventBus};
pub use interpolator::{InterpolatorState, MotionInterpolator};
pub use monitor::{DeviceMonitor, HealthStatus, JointHealth, MonitorStats};
pub use trajectory::{
    DEFAULT_CONTROL_FREQUENCY, InterpolationKind, Trajectory, TrajectoryConstraints,
    TrajectoryGenerator, TrajectoryPoint,
};
