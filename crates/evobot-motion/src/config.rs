//! 配置
//!
//! TOML 配置文件反序列化到 [`ArmConfig`]。所有字段都有与固件匹配的
//! 默认值，空配置文件等价于默认配置。
//!
//! ```toml
//! [control]
//! frequency = 10.0
//!
//! [serial]
//! port = "/dev/ttyUSB0"
//!
//! [[joints]]
//! name = "thumb"
//! max_position = 2800
//! ```

use std::path::Path;

use evobot_protocol::{JOINT_COUNT, POSITION_MAX, POSITION_MIN, joint_name};
use serde::{Deserialize, Serialize};

use crate::error::MotionError;

/// 单关节配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JointConfig {
    pub name: String,
    /// 软限位下限（编码器计数）
    pub min_position: i32,
    /// 软限位上限（编码器计数）
    pub max_position: i32,
    /// 最大速度（counts/s）
    pub max_velocity: f64,
    /// 最大加速度（counts/s²）
    pub max_acceleration: f64,
    /// 电流告警阈值 (mA)
    pub max_current: u16,
}

impl Default for JointConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            min_position: POSITION_MIN,
            max_position: POSITION_MAX,
            max_velocity: 500.0,
            max_acceleration: 1000.0,
            max_current: 1500,
        }
    }
}

/// 控制回路配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// 插值频率 (Hz)
    pub frequency: f64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self { frequency: 10.0 }
    }
}

/// 串口配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    pub port: String,
    pub baud_rate: u32,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 1_000_000,
        }
    }
}

/// 设备监控配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// 状态查询间隔（毫秒，手臂板 / 手腕板交替）
    pub query_interval_ms: u64,
    /// 单关节电流告警阈值 (mA)
    pub current_threshold_ma: u16,
    /// 反馈超时判定（秒）
    pub stale_timeout_s: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            query_interval_ms: 200,
            current_threshold_ma: 1500,
            stale_timeout_s: 5.0,
        }
    }
}

/// 机械臂总配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArmConfig {
    pub joints: Vec<JointConfig>,
    pub control: ControlConfig,
    pub serial: SerialSettings,
    pub monitor: MonitorConfig,
}

impl Default for ArmConfig {
    fn default() -> Self {
        let joints = (0..JOINT_COUNT)
            .map(|i| JointConfig {
                name: joint_name(i).to_string(),
                ..JointConfig::default()
            })
            .collect();
        Self {
            joints,
            control: ControlConfig::default(),
            serial: SerialSettings::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

impl ArmConfig {
    /// 从 TOML 文本解析，缺失的关节条目补默认值
    pub fn from_toml_str(text: &str) -> Result<Self, MotionError> {
        let mut config: ArmConfig =
            toml::from_str(text).map_err(|e| MotionError::Config(e.to_string()))?;
        config.fill_missing_joints();
        config.validate()?;
        Ok(config)
    }

    /// 从文件加载
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MotionError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// 补齐到 10 个关节，未命名的关节用固定名称表
    fn fill_missing_joints(&mut self) {
        for i in 0..JOINT_COUNT {
            if i >= self.joints.len() {
                self.joints.push(JointConfig {
                    name: joint_name(i).to_string(),
                    ..JointConfig::default()
                });
            } else if self.joints[i].name.is_empty() {
                self.joints[i].name = joint_name(i).to_string();
            }
        }
        self.joints.truncate(JOINT_COUNT);
    }

    fn validate(&self) -> Result<(), MotionError> {
        if self.control.frequency <= 0.0 {
            return Err(MotionError::Config(format!(
                "control.frequency must be positive, got {}",
                self.control.frequency
            )));
        }
        for joint in &self.joints {
            if joint.min_position > joint.max_position {
                return Err(MotionError::Config(format!(
                    "joint {}: min_position {} > max_position {}",
                    joint.name, joint.min_position, joint.max_position
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_ten_named_joints() {
        let config = ArmConfig::default();
        assert_eq!(config.joints.len(), JOINT_COUNT);
        assert_eq!(config.joints[0].name, "thumb");
        assert_eq!(config.joints[9].name, "elbow-2");
        assert_eq!(config.control.frequency, 10.0);
        assert_eq!(config.serial.baud_rate, 1_000_000);
        assert_eq!(config.monitor.query_interval_ms, 200);
    }

    #[test]
    fn test_empty_toml_equals_default() {
        let config = ArmConfig::from_toml_str("").unwrap();
        assert_eq!(config, ArmConfig::default());
    }

    #[test]
    fn test_partial_toml_overrides() {
        let text = r#"
            [control]
            frequency = 50.0

            [serial]
            port = "/dev/ttyACM1"

            [[joints]]
            name = "thumb"
            max_position = 2800
        "#;
        let config = ArmConfig::from_toml_str(text).unwrap();
        assert_eq!(config.control.frequency, 50.0);
        assert_eq!(config.serial.port, "/dev/ttyACM1");
        assert_eq!(config.serial.baud_rate, 1_000_000);
        assert_eq!(config.joints.len(), JOINT_COUNT);
        assert_eq!(config.joints[0].max_position, 2800);
        // 未列出的关节回落默认
        assert_eq!(config.joints[1].name, "index");
        assert_eq!(config.joints[1].max_position, POSITION_MAX);
    }

    #[test]
    fn test_invalid_frequency_rejected() {
        let result = ArmConfig::from_toml_str("[control]\nfrequency = 0.0\n");
        assert!(matches!(result, Err(MotionError::Config(_))));
    }

    #[test]
    fn test_inverted_limits_rejected() {
        let text = "[[joints]]\nmin_position = 2000\nmax_position = 1000\n";
        let result = ArmConfig::from_toml_str(text);
        assert!(matches!(result, Err(MotionError::Config(_))));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = ArmConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed = ArmConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
