//! 正逆运动学求解
//!
//! 逆解采用阻尼最小二乘（Levenberg–Marquardt 的固定阻尼形式）：
//!
//! ```text
//! Δq = Jᵀ (J Jᵀ + λ² I)⁻¹ e
//! ```
//!
//! 其中 `e` 是 6 维位姿误差旋量（平移差 + 轴角旋转差）。阻尼项保证
//! 奇异位形附近数值稳定。收敛后统一做限位校验，超限与不收敛是两种
//! 不同的错误。

use nalgebra::{Cholesky, Matrix6, SMatrix, SVector, Vector3, Vector6};
use tracing::{debug, trace};

use crate::KinematicsError;
use crate::model::RobotModel;
use crate::types::{JOINT_COUNT, JointVector, Pose6D};

/// 6×10 几何雅可比
pub type Jacobian = SMatrix<f64, 6, JOINT_COUNT>;

/// 逆解配置
#[derive(Debug, Clone, Copy)]
pub struct IkConfig {
    pub max_iterations: usize,
    /// 位姿误差旋量范数的收敛阈值
    pub tolerance: f64,
    /// 阻尼系数 λ
    pub damping: f64,
}

impl Default for IkConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-6,
            damping: 0.01,
        }
    }
}

/// 逆解结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IkSolution {
    pub joints: JointVector,
    pub iterations: usize,
    /// 收敛时的误差旋量范数
    pub residual: f64,
}

/// 运动学求解器
#[derive(Debug, Clone, Default)]
pub struct KinematicsSolver {
    model: RobotModel,
    config: IkConfig,
}

impl KinematicsSolver {
    pub fn new(model: RobotModel) -> Self {
        Self {
            model,
            config: IkConfig::default(),
        }
    }

    pub fn with_config(model: RobotModel, config: IkConfig) -> Self {
        Self { model, config }
    }

    pub fn model(&self) -> &RobotModel {
        &self.model
    }

    /// 正运动学
    ///
    /// 输入关节角切片（弧度），长度必须为 10。
    pub fn forward(&self, joints: &[f64]) -> Result<Pose6D, KinematicsError> {
        let q = JointVector::from_slice(joints)?;
        Ok(self.model.forward(&q))
    }

    /// 逆运动学
    ///
    /// `seed` 为空时以零位为初值。收敛但超限返回
    /// [`KinematicsError::OutOfLimits`]，迭代耗尽返回
    /// [`KinematicsError::NoConvergence`]。
    pub fn inverse(
        &self,
        target: &Pose6D,
        seed: Option<&[f64]>,
    ) -> Result<IkSolution, KinematicsError> {
        let mut q = match seed {
            Some(s) => JointVector::from_slice(s)?,
            None => JointVector::ZERO,
        };

        let target_iso = target.to_isometry();
        let damping_sq = self.config.damping * self.config.damping;
        let mut residual = f64::INFINITY;

        for iteration in 0..self.config.max_iterations {
            let current = self.model.end_effector(&q);
            let error = pose_twist_error(&target_iso, &current);
            residual = error.norm();
            trace!(iteration, residual, "ik iteration");

            if residual < self.config.tolerance {
                if let Some((joint, value)) = self.model.violating_joint(&q) {
                    let limit = self.model.limits()[joint];
                    debug!(joint, value, "ik solution out of limits");
                    return Err(KinematicsError::OutOfLimits {
                        joint,
                        value,
                        min: limit.min,
                        max: limit.max,
                    });
                }
                debug!(iterations = iteration, residual, "ik converged");
                return Ok(IkSolution {
                    joints: q,
                    iterations: iteration,
                    residual,
                });
            }

            let j = self.jacobian(&q);
            let jjt = j * j.transpose() + Matrix6::identity() * damping_sq;
            // J·Jᵀ + λ²I 对称正定，Cholesky 必然成功；失败只可能是 NaN 输入
            let chol = Cholesky::new(jjt).ok_or(KinematicsError::NoConvergence {
                iterations: iteration,
                residual,
            })?;
            let dq: SVector<f64, JOINT_COUNT> = j.transpose() * chol.solve(&error);
            q = JointVector::from_svector(q.to_svector() + dq);
        }

        debug!(residual, "ik exhausted iteration budget");
        Err(KinematicsError::NoConvergence {
            iterations: self.config.max_iterations,
            residual,
        })
    }

    /// 基坐标系几何雅可比
    ///
    /// 第 `i` 列为 `[zᵢ × (p − pᵢ); zᵢ]`，`zᵢ` 是关节 `i` 的旋转轴，
    /// `p` 是末端位置。
    pub fn jacobian(&self, q: &JointVector) -> Jacobian {
        let frames = self.model.link_frames(q);
        let p_end = frames[JOINT_COUNT].translation.vector;

        let mut j = Jacobian::zeros();
        for i in 0..JOINT_COUNT {
            let z = frames[i].rotation * Vector3::z();
            let p = frames[i].translation.vector;
            let linear = z.cross(&(p_end - p));

            j.fixed_view_mut::<3, 1>(0, i).copy_from(&linear);
            j.fixed_view_mut::<3, 1>(3, i).copy_from(&z);
        }
        j
    }

    /// Yoshikawa 可操作性：`sqrt(det(J·Jᵀ))`
    pub fn manipulability(&self, q: &JointVector) -> f64 {
        let j = self.jacobian(q);
        let jjt = j * j.transpose();
        jjt.determinant().max(0.0).sqrt()
    }

    /// 可操作性低于阈值即视为奇异位形
    pub fn is_singular(&self, q: &JointVector, threshold: f64) -> bool {
        self.manipulability(q) < threshold
    }
}

/// 位姿误差旋量：`[p_target − p_current; axis·angle(R_target · R_currentᵀ)]`
fn pose_twist_error(
    target: &nalgebra::Isometry3<f64>,
    current: &nalgebra::Isometry3<f64>,
) -> Vector6<f64> {
    let dp = target.translation.vector - current.translation.vector;
    let dr = (target.rotation * current.rotation.inverse()).scaled_axis();

    let mut e = Vector6::zeros();
    e.fixed_view_mut::<3, 1>(0, 0).copy_from(&dp);
    e.fixed_view_mut::<3, 1>(3, 0).copy_from(&dr);
    e
}
