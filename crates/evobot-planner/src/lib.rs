//! EvoBot 关节空间路径规划
//!
//! - [`Obstacle`]：盒体 / 球体障碍物
//! - [`CollisionChecker`]：末端点与障碍物集合的碰撞检测
//! - [`RrtPlanner`]：RRT 规划 + 贪心回溯捷径平滑
//!
//! 规划在 10 维关节空间进行，碰撞模型只取末端执行器点（与现有
//! 上位机一致的简化）。规划期间读取障碍物集合的快照，规划结果
//! 不受并发修改影响。

mod collision;
mod obstacle;
mod rrt;

pub use collision::{CollisionChecker, ObstacleSnapshot};
pub use obstacle::{Obstacle, ObstacleShape};
pub use rrt::{PlannedPath, RrtConfig, RrtPlanner};

use thiserror::Error;

/// 规划错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PlanningError {
    /// 起始配置已在障碍物内，不做任何扩展
    #[error("Start configuration is in collision")]
    StartInCollision,

    /// 目标配置已在障碍物内，不做任何扩展
    #[error("Goal configuration is in collision")]
    GoalInCollision,

    /// 迭代预算耗尽仍未连通
    #[error("No collision-free path found within {iterations} iterations")]
    IterationBudgetExceeded { iterations: usize },
}
