//! 基础类型：关节向量与 6 自由度位姿

use nalgebra::{Isometry3, SVector, Translation3, UnitQuaternion, Vector3};

use crate::KinematicsError;

/// 关节数量：5 指 + 手腕 + 肩部 ×2 + 肘部 ×2
pub const JOINT_COUNT: usize = 10;

/// 10 维关节向量（弧度）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JointVector(pub [f64; JOINT_COUNT]);

impl JointVector {
    pub const ZERO: Self = Self([0.0; JOINT_COUNT]);

    pub fn new(values: [f64; JOINT_COUNT]) -> Self {
        Self(values)
    }

    /// 从切片构造，长度不是 10 返回 [`KinematicsError::WrongJointCount`]
    pub fn from_slice(values: &[f64]) -> Result<Self, KinematicsError> {
        let arr: [f64; JOINT_COUNT] = values
            .try_into()
            .map_err(|_| KinematicsError::WrongJointCount {
                actual: values.len(),
            })?;
        Ok(Self(arr))
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn to_svector(self) -> SVector<f64, JOINT_COUNT> {
        SVector::from(self.0)
    }

    pub fn from_svector(v: SVector<f64, JOINT_COUNT>) -> Self {
        Self(v.into())
    }

    /// 欧氏距离（RRT 的度量）
    pub fn distance(&self, other: &Self) -> f64 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt()
    }

    /// 线性插值，`t` ∈ [0, 1]
    pub fn lerp(&self, other: &Self, t: f64) -> Self {
        let mut out = [0.0; JOINT_COUNT];
        for i in 0..JOINT_COUNT {
            out[i] = self.0[i] + (other.0[i] - self.0[i]) * t;
        }
        Self(out)
    }

    /// 逐关节绝对差的最大值
    pub fn max_abs_diff(&self, other: &Self) -> f64 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }
}

impl From<[f64; JOINT_COUNT]> for JointVector {
    fn from(values: [f64; JOINT_COUNT]) -> Self {
        Self(values)
    }
}

impl std::ops::Index<usize> for JointVector {
    type Output = f64;

    fn index(&self, i: usize) -> &f64 {
        &self.0[i]
    }
}

impl std::ops::IndexMut<usize> for JointVector {
    fn index_mut(&mut self, i: usize) -> &mut f64 {
        &mut self.0[i]
    }
}

/// 末端 6 自由度位姿：位置 (m) + RPY 欧拉角 (rad)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose6D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl Pose6D {
    pub fn new(x: f64, y: f64, z: f64, roll: f64, pitch: f64, yaw: f64) -> Self {
        Self {
            x,
            y,
            z,
            roll,
            pitch,
            yaw,
        }
    }

    pub fn from_xyz(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z,
            ..Self::default()
        }
    }

    pub fn to_isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(
            Translation3::new(self.x, self.y, self.z),
            UnitQuaternion::from_euler_angles(self.roll, self.pitch, self.yaw),
        )
    }

    pub fn from_isometry(iso: &Isometry3<f64>) -> Self {
        let (roll, pitch, yaw) = iso.rotation.euler_angles();
        Self {
            x: iso.translation.x,
            y: iso.translation.y,
            z: iso.translation.z,
            roll,
            pitch,
            yaw,
        }
    }

    pub fn position(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    /// 到另一位姿的平移距离
    pub fn translation_distance(&self, other: &Self) -> f64 {
        (self.position() - other.position()).norm()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_joint_vector_from_slice_wrong_count() {
        assert_eq!(
            JointVector::from_slice(&[0.0; 7]),
            Err(KinematicsError::WrongJointCount { actual: 7 })
        );
        assert!(JointVector::from_slice(&[0.0; 10]).is_ok());
    }

    #[test]
    fn test_joint_vector_lerp_endpoints() {
        let a = JointVector::ZERO;
        let b = JointVector::new([1.0; 10]);
        assert_eq!(a.lerp(&b, 0.0), a);
        assert_eq!(a.lerp(&b, 1.0), b);
        assert_relative_eq!(a.lerp(&b, 0.5)[3], 0.5);
    }

    #[test]
    fn test_joint_vector_distance() {
        let a = JointVector::ZERO;
        let mut b = JointVector::ZERO;
        b[0] = 3.0;
        b[1] = 4.0;
        assert_relative_eq!(a.distance(&b), 5.0);
    }

    #[test]
    fn test_pose_isometry_roundtrip() {
        let pose = Pose6D::new(0.1, -0.2, 0.3, 0.4, -0.5, 0.6);
        let back = Pose6D::from_isometry(&pose.to_isometry());
        assert_relative_eq!(back.x, pose.x, epsilon = 1e-12);
        assert_relative_eq!(back.roll, pose.roll, epsilon = 1e-9);
        assert_relative_eq!(back.pitch, pose.pitch, epsilon = 1e-9);
        assert_relative_eq!(back.yaw, pose.yaw, epsilon = 1e-9);
    }
}
