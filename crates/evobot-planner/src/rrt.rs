//! RRT 规划器
//!
//! 经典单树 RRT：均匀采样关节空间（10% 概率直接采目标），向最近
//! 节点按固定步长扩展，边经过碰撞检测后入树。新节点进入目标容差
//! 即回溯出路径。起点 / 终点本身碰撞时直接拒绝，零次扩展。
//!
//! [`RrtPlanner::optimize`] 做贪心回溯捷径：从当前点尝试直连尽量
//! 靠后的路径点，连得上就跳过中间点。尽力而为的平滑，不保证最优。

use evobot_kinematics::{JOINT_COUNT, JointVector};
use rand::Rng;
use tracing::{debug, info};

use crate::PlanningError;
use crate::collision::CollisionChecker;

/// RRT 参数
#[derive(Debug, Clone, Copy)]
pub struct RrtConfig {
    pub max_iterations: usize,
    /// 扩展步长（弧度）
    pub step_size: f64,
    /// 目标容差（关节空间欧氏距离）
    pub goal_tolerance: f64,
    /// 直接采样目标的概率
    pub goal_bias: f64,
}

impl Default for RrtConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5000,
            step_size: 0.1,
            goal_tolerance: 0.1,
            goal_bias: 0.1,
        }
    }
}

/// 规划出的路径
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedPath {
    /// 路径点，首点为起始配置，末点为目标配置
    pub waypoints: Vec<JointVector>,
    /// 关节空间累计长度
    pub cost: f64,
    /// 消耗的迭代次数
    pub iterations: usize,
}

struct Node {
    config: JointVector,
    parent: Option<usize>,
    cost: f64,
}

/// RRT 规划器
pub struct RrtPlanner {
    config: RrtConfig,
}

impl Default for RrtPlanner {
    fn default() -> Self {
        Self::new(RrtConfig::default())
    }
}

impl RrtPlanner {
    pub fn new(config: RrtConfig) -> Self {
        Self { config }
    }

    /// 规划 `start` → `goal` 的无碰撞路径
    pub fn plan(
        &self,
        checker: &CollisionChecker,
        start: &JointVector,
        goal: &JointVector,
    ) -> Result<PlannedPath, PlanningError> {
        self.plan_with_rng(checker, start, goal, &mut rand::thread_rng())
    }

    /// 用外部随机源规划（测试时传入种子化的 RNG 保证可复现）
    pub fn plan_with_rng(
        &self,
        checker: &CollisionChecker,
        start: &JointVector,
        goal: &JointVector,
        rng: &mut impl Rng,
    ) -> Result<PlannedPath, PlanningError> {
        let snapshot = checker.snapshot();

        if snapshot.collides(start) {
            return Err(PlanningError::StartInCollision);
        }
        if snapshot.collides(goal) {
            return Err(PlanningError::GoalInCollision);
        }

        let limits = *checker.solver().model().limits();
        let mut nodes = vec![Node {
            config: *start,
            parent: None,
            cost: 0.0,
        }];

        for iteration in 0..self.config.max_iterations {
            let sample = if rng.r#gen::<f64>() < self.config.goal_bias {
                *goal
            } else {
                let mut q = JointVector::ZERO;
                for i in 0..JOINT_COUNT {
                    q[i] = rng.gen_range(limits[i].min..=limits[i].max);
                }
                q
            };

            let nearest = nearest_node(&nodes, &sample);
            let nearest_config = nodes[nearest].config;
            let new_config = self.steer(&nearest_config, &sample);

            if snapshot.segment_collides(&nearest_config, &new_config) {
                continue;
            }

            let cost = nodes[nearest].cost + nearest_config.distance(&new_config);
            nodes.push(Node {
                config: new_config,
                parent: Some(nearest),
                cost,
            });

            if new_config.distance(goal) < self.config.goal_tolerance {
                let waypoints = build_path(&nodes, nodes.len() - 1, goal);
                // 末跳（新节点 → 目标本身）计入总代价
                let cost = cost + new_config.distance(goal);
                info!(
                    iterations = iteration + 1,
                    nodes = nodes.len(),
                    cost,
                    "rrt path found"
                );
                return Ok(PlannedPath {
                    waypoints,
                    cost,
                    iterations: iteration + 1,
                });
            }
        }

        debug!(nodes = nodes.len(), "rrt iteration budget exhausted");
        Err(PlanningError::IterationBudgetExceeded {
            iterations: self.config.max_iterations,
        })
    }

    /// 贪心回溯捷径平滑
    pub fn optimize(&self, checker: &CollisionChecker, path: &[JointVector]) -> Vec<JointVector> {
        if path.len() < 3 {
            return path.to_vec();
        }
        let snapshot = checker.snapshot();

        let mut optimized = vec![path[0]];
        let mut i = 0;
        while i < path.len() - 1 {
            let mut advanced = false;
            for j in (i + 2..path.len()).rev() {
                if !snapshot.segment_collides(&path[i], &path[j]) {
                    optimized.push(path[j]);
                    i = j;
                    advanced = true;
                    break;
                }
            }
            if !advanced {
                i += 1;
                optimized.push(path[i]);
            }
        }

        debug!(before = path.len(), after = optimized.len(), "path optimized");
        optimized
    }

    /// 从 `from` 朝 `to` 前进至多一个步长
    fn steer(&self, from: &JointVector, to: &JointVector) -> JointVector {
        let distance = from.distance(to);
        if distance <= self.config.step_size {
            return *to;
        }
        from.lerp(to, self.config.step_size / distance)
    }
}

fn nearest_node(nodes: &[Node], target: &JointVector) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (i, node) in nodes.iter().enumerate() {
        let d = node.config.distance(target);
        if d < best_distance {
            best_distance = d;
            best = i;
        }
    }
    best
}

/// 从目标节点回溯到根，末尾追加目标配置本身
///
/// steer 恰好落在目标上时不重复追加，路径点两两互异。
fn build_path(nodes: &[Node], goal_node: usize, goal: &JointVector) -> Vec<JointVector> {
    let mut waypoints = Vec::new();
    if nodes[goal_node].config != *goal {
        waypoints.push(*goal);
    }
    let mut current = Some(goal_node);
    while let Some(id) = current {
        waypoints.push(nodes[id].config);
        current = nodes[id].parent;
    }
    waypoints.reverse();
    waypoints
}
