//! 工作空间蒙特卡洛分析
//!
//! 在关节限位内均匀采样，正解得到末端可达点云，给出轴对齐包围盒
//! 和体积近似。可达判定半径由调用方给定，超出半径的采样点计入
//! 不可达比例并从点云剔除。采样规模由调用方决定，分析是纯计算，
//! 不触碰硬件。

use rand::Rng;
use tracing::debug;

use crate::solver::KinematicsSolver;
use crate::types::{JOINT_COUNT, JointVector};

/// 工作空间分析结果
#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceReport {
    /// 可达末端位置点云
    pub points: Vec<[f64; 3]>,
    pub min_bounds: [f64; 3],
    pub max_bounds: [f64; 3],
    /// 包围盒体积近似
    pub volume: f64,
    /// 末端落在 `reach_limit` 半径内的采样比例
    pub reachable_ratio: f64,
}

impl KinematicsSolver {
    /// 蒙特卡洛采样工作空间
    ///
    /// `reach_limit` 是以基座为球心的可达判定半径（米）。
    pub fn sample_workspace(
        &self,
        samples: usize,
        reach_limit: f64,
        rng: &mut impl Rng,
    ) -> WorkspaceReport {
        let limits = self.model().limits();
        let mut points = Vec::with_capacity(samples);

        for _ in 0..samples {
            let mut q = JointVector::ZERO;
            for i in 0..JOINT_COUNT {
                q[i] = rng.gen_range(limits[i].min..=limits[i].max);
            }
            let pose = self.model().forward(&q);
            let norm = (pose.x * pose.x + pose.y * pose.y + pose.z * pose.z).sqrt();
            if norm <= reach_limit {
                points.push([pose.x, pose.y, pose.z]);
            }
        }

        if points.is_empty() {
            return WorkspaceReport {
                points,
                min_bounds: [0.0; 3],
                max_bounds: [0.0; 3],
                volume: 0.0,
                reachable_ratio: 0.0,
            };
        }

        let mut min_bounds = [f64::INFINITY; 3];
        let mut max_bounds = [f64::NEG_INFINITY; 3];
        for p in &points {
            for axis in 0..3 {
                min_bounds[axis] = min_bounds[axis].min(p[axis]);
                max_bounds[axis] = max_bounds[axis].max(p[axis]);
            }
        }

        let volume = (0..3).map(|a| max_bounds[a] - min_bounds[a]).product();
        let reachable_ratio = points.len() as f64 / samples as f64;
        debug!(samples, volume, reachable_ratio, "workspace sampling complete");

        WorkspaceReport {
            points,
            min_bounds,
            max_bounds,
            volume,
            reachable_ratio,
        }
    }
}
