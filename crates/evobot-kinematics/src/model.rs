//! 机器人 DH 模型与关节限位

use std::f64::consts::{PI, TAU};

use nalgebra::{Isometry3, Vector3};

use crate::types::{JOINT_COUNT, JointVector, Pose6D};

/// 编码器整圈计数：3000 ↔ 2π
pub const COUNTS_PER_REV: f64 = 3000.0;

/// 标准 DH 参数（旋转关节）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DhParam {
    /// 连杆长度
    pub a: f64,
    /// 连杆偏移
    pub d: f64,
    /// 连杆扭角
    pub alpha: f64,
    /// 关节角度偏移
    pub theta: f64,
}

impl Default for DhParam {
    fn default() -> Self {
        Self {
            a: 0.05,
            d: 0.0,
            alpha: 0.0,
            theta: 0.0,
        }
    }
}

/// 关节限位（弧度）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointLimit {
    pub min: f64,
    pub max: f64,
}

impl Default for JointLimit {
    fn default() -> Self {
        Self { min: -PI, max: PI }
    }
}

impl JointLimit {
    /// 从编码器计数换算限位
    pub fn from_counts(min: i32, max: i32) -> Self {
        Self {
            min: f64::from(min) / COUNTS_PER_REV * TAU,
            max: f64::from(max) / COUNTS_PER_REV * TAU,
        }
    }

    pub fn contains(&self, angle: f64) -> bool {
        angle >= self.min && angle <= self.max
    }

    pub fn clamp(&self, angle: f64) -> f64 {
        angle.clamp(self.min, self.max)
    }
}

/// 10 关节串联模型
#[derive(Debug, Clone, PartialEq)]
pub struct RobotModel {
    dh: [DhParam; JOINT_COUNT],
    limits: [JointLimit; JOINT_COUNT],
}

impl Default for RobotModel {
    fn default() -> Self {
        Self {
            dh: [DhParam::default(); JOINT_COUNT],
            limits: [JointLimit::default(); JOINT_COUNT],
        }
    }
}

impl RobotModel {
    pub fn new(dh: [DhParam; JOINT_COUNT], limits: [JointLimit; JOINT_COUNT]) -> Self {
        Self { dh, limits }
    }

    pub fn dh_params(&self) -> &[DhParam; JOINT_COUNT] {
        &self.dh
    }

    pub fn limits(&self) -> &[JointLimit; JOINT_COUNT] {
        &self.limits
    }

    /// 第 `i` 个关节在角度 `q` 下的连杆变换
    ///
    /// 标准 DH 约定：`Rz(θ+q) · Tz(d) · Tx(a) · Rx(α)`
    pub fn joint_transform(&self, i: usize, q: f64) -> Isometry3<f64> {
        let dh = &self.dh[i];
        Isometry3::rotation(Vector3::z() * (dh.theta + q))
            * Isometry3::translation(dh.a, 0.0, dh.d)
            * Isometry3::rotation(Vector3::x() * dh.alpha)
    }

    /// 基座到末端的变换
    pub fn end_effector(&self, q: &JointVector) -> Isometry3<f64> {
        let mut t = Isometry3::identity();
        for i in 0..JOINT_COUNT {
            t *= self.joint_transform(i, q[i]);
        }
        t
    }

    /// 正运动学位姿
    pub fn forward(&self, q: &JointVector) -> Pose6D {
        Pose6D::from_isometry(&self.end_effector(q))
    }

    /// 基座到每个关节坐标系的变换（含基座，共 11 帧）
    ///
    /// 帧 `i` 是关节 `i` 的旋转轴所在坐标系，雅可比按这些帧构造。
    pub fn link_frames(&self, q: &JointVector) -> [Isometry3<f64>; JOINT_COUNT + 1] {
        let mut frames = [Isometry3::identity(); JOINT_COUNT + 1];
        for i in 0..JOINT_COUNT {
            frames[i + 1] = frames[i] * self.joint_transform(i, q[i]);
        }
        frames
    }

    /// 全部关节都在限位内
    pub fn within_limits(&self, q: &JointVector) -> bool {
        self.violating_joint(q).is_none()
    }

    /// 第一个超限的关节及其值
    pub fn violating_joint(&self, q: &JointVector) -> Option<(usize, f64)> {
        (0..JOINT_COUNT).find_map(|i| (!self.limits[i].contains(q[i])).then_some((i, q[i])))
    }

    /// 逐关节钳制到限位
    pub fn clamp_to_limits(&self, q: &JointVector) -> JointVector {
        let mut out = *q;
        for i in 0..JOINT_COUNT {
            out[i] = self.limits[i].clamp(out[i]);
        }
        out
    }
}
