//! 碰撞检测
//!
//! 碰撞模型：正解得到末端执行器位置点，逐个障碍物判定，首个命中
//! 即返回。线段检测在两配置之间做 10 段线性插值（含端点共 11 个
//! 检查点）。
//!
//! 障碍物集合只能通过 `add_obstacle` / `clear_obstacles` 修改；
//! [`snapshot`](CollisionChecker::snapshot) 返回的不可变快照供规划
//! 器整次规划使用。

use std::sync::Arc;

use evobot_kinematics::{JointVector, KinematicsSolver};
use parking_lot::RwLock;
use tracing::info;

use crate::obstacle::Obstacle;

/// 线段检测的插值段数
const EDGE_CHECKS: usize = 10;

/// 碰撞检测器
pub struct CollisionChecker {
    solver: Arc<KinematicsSolver>,
    obstacles: RwLock<Vec<Obstacle>>,
}

impl CollisionChecker {
    pub fn new(solver: Arc<KinematicsSolver>) -> Self {
        Self {
            solver,
            obstacles: RwLock::new(Vec::new()),
        }
    }

    pub fn solver(&self) -> &Arc<KinematicsSolver> {
        &self.solver
    }

    pub fn add_obstacle(&self, obstacle: Obstacle) {
        info!(?obstacle.shape, center = ?obstacle.center, "obstacle added");
        self.obstacles.write().push(obstacle);
    }

    pub fn clear_obstacles(&self) {
        let mut obstacles = self.obstacles.write();
        info!(count = obstacles.len(), "obstacles cleared");
        obstacles.clear();
    }

    pub fn obstacle_count(&self) -> usize {
        self.obstacles.read().len()
    }

    /// 当前障碍物集合的不可变快照
    pub fn snapshot(&self) -> ObstacleSnapshot {
        ObstacleSnapshot {
            solver: Arc::clone(&self.solver),
            obstacles: self.obstacles.read().clone(),
        }
    }

    /// 单个配置是否碰撞
    pub fn collides(&self, q: &JointVector) -> bool {
        self.snapshot().collides(q)
    }

    /// 两配置间线性插值路径是否碰撞
    pub fn segment_collides(&self, from: &JointVector, to: &JointVector) -> bool {
        self.snapshot().segment_collides(from, to)
    }
}

/// 规划期间使用的障碍物快照
pub struct ObstacleSnapshot {
    solver: Arc<KinematicsSolver>,
    obstacles: Vec<Obstacle>,
}

impl ObstacleSnapshot {
    pub fn collides(&self, q: &JointVector) -> bool {
        if self.obstacles.is_empty() {
            return false;
        }
        let pose = self.solver.model().forward(q);
        let point = [pose.x, pose.y, pose.z];
        self.obstacles.iter().any(|o| o.contains(&point))
    }

    pub fn segment_collides(&self, from: &JointVector, to: &JointVector) -> bool {
        (0..=EDGE_CHECKS).any(|i| {
            let alpha = i as f64 / EDGE_CHECKS as f64;
            self.collides(&from.lerp(to, alpha))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evobot_kinematics::RobotModel;

    fn checker() -> CollisionChecker {
        CollisionChecker::new(Arc::new(KinematicsSolver::new(RobotModel::default())))
    }

    #[test]
    fn test_no_obstacles_never_collides() {
        let c = checker();
        assert!(!c.collides(&JointVector::ZERO));
        assert!(!c.segment_collides(&JointVector::ZERO, &JointVector::new([0.5; 10])));
    }

    #[test]
    fn test_end_effector_inside_sphere_collides() {
        let c = checker();
        // 零位末端在 (0.5, 0, 0)
        c.add_obstacle(Obstacle::sphere([0.5, 0.0, 0.0], 0.1));
        assert!(c.collides(&JointVector::ZERO));
        // 弯起手臂后末端离开球体
        assert!(!c.collides(&JointVector::new([0.3; 10])));
    }

    #[test]
    fn test_segment_hits_intermediate_obstacle() {
        let c = checker();
        let start = JointVector::ZERO;
        let goal = JointVector::new([0.2; 10]);
        // 障碍物放在中点配置的末端位置
        let mid = c.solver().model().forward(&start.lerp(&goal, 0.5));
        c.add_obstacle(Obstacle::sphere([mid.x, mid.y, mid.z], 0.02));

        assert!(!c.collides(&start));
        assert!(!c.collides(&goal));
        assert!(c.segment_collides(&start, &goal));
    }

    #[test]
    fn test_clear_obstacles() {
        let c = checker();
        c.add_obstacle(Obstacle::boxed([0.5, 0.0, 0.0], [0.2, 0.2, 0.2]));
        assert_eq!(c.obstacle_count(), 1);
        assert!(c.collides(&JointVector::ZERO));

        c.clear_obstacles();
        assert_eq!(c.obstacle_count(), 0);
        assert!(!c.collides(&JointVector::ZERO));
    }

    #[test]
    fn test_snapshot_isolated_from_later_mutation() {
        let c = checker();
        let snap = c.snapshot();
        c.add_obstacle(Obstacle::sphere([0.5, 0.0, 0.0], 0.1));

        assert!(c.collides(&JointVector::ZERO));
        assert!(!snap.collides(&JointVector::ZERO));
    }
}
