//! 轨迹生成
//!
//! 点到点 / 多点轨迹规划，五种插值策略：
//!
//! - 线性：匀速直达，端点速度不为零
//! - 三次样条：自然边界条件；只有两个节点时退化为直线段
//! - 五次多项式：端点速度、加速度均为零
//! - 梯形速度曲线：加速 / 匀速 / 减速三段，按约束拟合到给定时长
//! - S 曲线：7 段式，限制加加速度
//!
//! 轨迹点按控制频率等间隔采样，`duration` 秒的轨迹固定产出
//! `round(duration × frequency) + 1` 个点，首点在 t=0，末点恰好在
//! t=duration。梯形和 S 曲线保证末点速度精确为零、位置精确到达。

use evobot_protocol::JOINT_COUNT;
use tracing::debug;

use crate::error::MotionError;

/// 默认插值频率 (Hz)
pub const DEFAULT_CONTROL_FREQUENCY: f64 = 10.0;

/// 自动计算时长的下限（秒）
const MIN_AUTO_DURATION: f64 = 0.1;

/// 插值策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpolationKind {
    Linear,
    CubicSpline,
    Quintic,
    Trapezoidal,
    SCurve,
}

/// 逐关节运动学约束
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryConstraints {
    /// 最大速度 (counts/s)
    pub max_velocity: [f64; JOINT_COUNT],
    /// 最大加速度 (counts/s²)
    pub max_acceleration: [f64; JOINT_COUNT],
    /// 最大加加速度 (counts/s³)
    pub max_jerk: [f64; JOINT_COUNT],
}

impl TrajectoryConstraints {
    /// 未给定 jerk 时取 5 倍加速度
    pub fn new(
        max_velocity: [f64; JOINT_COUNT],
        max_acceleration: [f64; JOINT_COUNT],
    ) -> Self {
        let max_jerk = std::array::from_fn(|i| max_acceleration[i] * 5.0);
        Self {
            max_velocity,
            max_acceleration,
            max_jerk,
        }
    }

    pub fn with_jerk(
        max_velocity: [f64; JOINT_COUNT],
        max_acceleration: [f64; JOINT_COUNT],
        max_jerk: [f64; JOINT_COUNT],
    ) -> Self {
        Self {
            max_velocity,
            max_acceleration,
            max_jerk,
        }
    }

    /// 所有关节同样的速度 / 加速度上限
    pub fn uniform(velocity: f64, acceleration: f64) -> Self {
        Self::new([velocity; JOINT_COUNT], [acceleration; JOINT_COUNT])
    }

    /// 所有关节同样的速度 / 加速度 / 加加速度上限
    pub fn uniform_with_jerk(velocity: f64, acceleration: f64, jerk: f64) -> Self {
        Self::with_jerk(
            [velocity; JOINT_COUNT],
            [acceleration; JOINT_COUNT],
            [jerk; JOINT_COUNT],
        )
    }
}

impl Default for TrajectoryConstraints {
    fn default() -> Self {
        Self::uniform(500.0, 1000.0)
    }
}

/// 单个轨迹点
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryPoint {
    pub timestamp: f64,
    pub positions: [f64; JOINT_COUNT],
    pub velocities: [f64; JOINT_COUNT],
    pub accelerations: [f64; JOINT_COUNT],
}

/// 一条完整轨迹
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    points: Vec<TrajectoryPoint>,
    duration: f64,
    kind: InterpolationKind,
}

impl Trajectory {
    pub fn points(&self) -> &[TrajectoryPoint] {
        &self.points
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn kind(&self) -> InterpolationKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// 取时刻 `t` 的轨迹点，相邻采样点之间线性插值
    ///
    /// `t` 落在 `[0, duration]` 之外时返回 `None`。
    pub fn sample_at(&self, t: f64) -> Option<TrajectoryPoint> {
        if self.points.is_empty() || t < 0.0 || t > self.duration {
            return None;
        }

        for pair in self.points.windows(2) {
            let (t1, t2) = (pair[0].timestamp, pair[1].timestamp);
            if t1 <= t && t <= t2 {
                let alpha = if t2 > t1 { (t - t1) / (t2 - t1) } else { 0.0 };
                return Some(TrajectoryPoint {
                    timestamp: t,
                    positions: lerp_array(&pair[0].positions, &pair[1].positions, alpha),
                    velocities: lerp_array(&pair[0].velocities, &pair[1].velocities, alpha),
                    accelerations: lerp_array(
                        &pair[0].accelerations,
                        &pair[1].accelerations,
                        alpha,
                    ),
                });
            }
        }

        self.points.last().cloned()
    }
}

fn lerp_array(
    a: &[f64; JOINT_COUNT],
    b: &[f64; JOINT_COUNT],
    alpha: f64,
) -> [f64; JOINT_COUNT] {
    std::array::from_fn(|i| a[i] + alpha * (b[i] - a[i]))
}

/// 轨迹生成器
#[derive(Debug, Clone)]
pub struct TrajectoryGenerator {
    constraints: TrajectoryConstraints,
    frequency: f64,
}

impl Default for TrajectoryGenerator {
    fn default() -> Self {
        Self::new(TrajectoryConstraints::default())
    }
}

impl TrajectoryGenerator {
    pub fn new(constraints: TrajectoryConstraints) -> Self {
        Self::with_frequency(constraints, DEFAULT_CONTROL_FREQUENCY)
    }

    pub fn with_frequency(constraints: TrajectoryConstraints, frequency: f64) -> Self {
        Self {
            constraints,
            frequency,
        }
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn constraints(&self) -> &TrajectoryConstraints {
        &self.constraints
    }

    pub fn set_constraints(&mut self, constraints: TrajectoryConstraints) {
        self.constraints = constraints;
    }

    /// 点到点轨迹规划
    ///
    /// `duration` 为 `None` 时按最慢关节的梯形曲线最短时间自动计算
    /// （下限 0.1 秒）。
    pub fn plan_point_to_point(
        &self,
        start: &[f64; JOINT_COUNT],
        end: &[f64; JOINT_COUNT],
        duration: Option<f64>,
        kind: InterpolationKind,
    ) -> Trajectory {
        let displacements: [f64; JOINT_COUNT] = std::array::from_fn(|i| end[i] - start[i]);
        let duration = duration.unwrap_or_else(|| self.auto_duration(&displacements));

        let points = self.generate_segment(start, end, duration, kind, 0.0);
        debug!(
            ?kind,
            duration,
            points = points.len(),
            "point-to-point trajectory"
        );
        Trajectory {
            points,
            duration,
            kind,
        }
    }

    /// 多点轨迹规划
    ///
    /// 逐段生成再拼接，段边界处时间戳重复一次（段末点与下段首点
    /// 位置相同）。`durations` 给定时长度必须等于段数。
    pub fn plan_multi_point(
        &self,
        waypoints: &[[f64; JOINT_COUNT]],
        durations: Option<&[f64]>,
        kind: InterpolationKind,
    ) -> Result<Trajectory, MotionError> {
        if waypoints.len() < 2 {
            return Err(MotionError::NotEnoughWaypoints {
                given: waypoints.len(),
            });
        }
        let segments = waypoints.len() - 1;
        if let Some(d) = durations {
            if d.len() != segments {
                return Err(MotionError::DurationCountMismatch {
                    expected: segments,
                    given: d.len(),
                });
            }
        }

        let mut points = Vec::new();
        let mut current_time = 0.0;
        for i in 0..segments {
            let segment_duration = match durations {
                Some(d) => d[i],
                None => {
                    let disp: [f64; JOINT_COUNT] =
                        std::array::from_fn(|j| waypoints[i + 1][j] - waypoints[i][j]);
                    self.auto_duration(&disp)
                },
            };
            points.extend(self.generate_segment(
                &waypoints[i],
                &waypoints[i + 1],
                segment_duration,
                kind,
                current_time,
            ));
            current_time += segment_duration;
        }

        debug!(
            waypoints = waypoints.len(),
            duration = current_time,
            points = points.len(),
            "multi-point trajectory"
        );
        Ok(Trajectory {
            points,
            duration: current_time,
            kind,
        })
    }

    /// 最慢关节的梯形曲线最短时间，下限 0.1 秒
    pub fn auto_duration(&self, displacements: &[f64; JOINT_COUNT]) -> f64 {
        let mut max_duration: f64 = 0.0;

        for (i, &displacement) in displacements.iter().enumerate() {
            let abs_disp = displacement.abs();
            if abs_disp < 1e-6 {
                continue;
            }
            let max_vel = self.constraints.max_velocity[i];
            let max_acc = self.constraints.max_acceleration[i];

            let t_acc = max_vel / max_acc;
            let s_acc = 0.5 * max_acc * t_acc * t_acc;

            let duration = if 2.0 * s_acc <= abs_disp {
                // 有匀速段
                2.0 * t_acc + (abs_disp - 2.0 * s_acc) / max_vel
            } else {
                // 三角形速度曲线
                2.0 * (abs_disp / max_acc).sqrt()
            };
            max_duration = max_duration.max(duration);
        }

        max_duration.max(MIN_AUTO_DURATION)
    }

    /// 生成一段轨迹，时间戳整体平移 `t_offset`
    fn generate_segment(
        &self,
        start: &[f64; JOINT_COUNT],
        end: &[f64; JOINT_COUNT],
        duration: f64,
        kind: InterpolationKind,
        t_offset: f64,
    ) -> Vec<TrajectoryPoint> {
        let profiles: [JointProfile; JOINT_COUNT] = std::array::from_fn(|i| {
            let displacement = end[i] - start[i];
            match kind {
                // 两节点的自然三次样条二阶导为零，退化为直线段
                InterpolationKind::Linear | InterpolationKind::CubicSpline => {
                    JointProfile::Linear {
                        delta: displacement,
                        duration,
                    }
                },
                InterpolationKind::Quintic => JointProfile::Quintic {
                    delta: displacement,
                    duration,
                },
                InterpolationKind::Trapezoidal => JointProfile::Trapezoid(TrapezoidProfile::fit(
                    displacement,
                    self.constraints.max_velocity[i],
                    self.constraints.max_acceleration[i],
                    duration,
                )),
                InterpolationKind::SCurve => JointProfile::SCurve(SCurveProfile::fit(
                    displacement,
                    self.constraints.max_velocity[i],
                    self.constraints.max_acceleration[i],
                    self.constraints.max_jerk[i],
                )),
            }
        });

        let dt = 1.0 / self.frequency;
        let steps = (duration * self.frequency).round() as usize;

        let mut points = Vec::with_capacity(steps + 1);
        for i in 0..=steps {
            let t = (i as f64 * dt).min(duration);

            let mut positions = [0.0; JOINT_COUNT];
            let mut velocities = [0.0; JOINT_COUNT];
            let mut accelerations = [0.0; JOINT_COUNT];
            for j in 0..JOINT_COUNT {
                let (pos, vel, acc) = profiles[j].eval(t);
                positions[j] = start[j] + pos;
                velocities[j] = vel;
                accelerations[j] = acc;
            }

            points.push(TrajectoryPoint {
                timestamp: t_offset + t,
                positions,
                velocities,
                accelerations,
            });
        }
        points
    }
}

/// 单关节速度曲线（eval 返回相对起点的位移）
enum JointProfile {
    Linear { delta: f64, duration: f64 },
    Quintic { delta: f64, duration: f64 },
    Trapezoid(TrapezoidProfile),
    SCurve(SCurveProfile),
}

impl JointProfile {
    /// 时刻 `t` 的（位移, 速度, 加速度）
    fn eval(&self, t: f64) -> (f64, f64, f64) {
        match self {
            Self::Linear { delta, duration } => {
                if *duration <= 0.0 {
                    return (*delta, 0.0, 0.0);
                }
                let alpha = (t / duration).min(1.0);
                (delta * alpha, delta / duration, 0.0)
            },
            Self::Quintic { delta, duration } => {
                if *duration <= 0.0 {
                    return (*delta, 0.0, 0.0);
                }
                let tau = (t / duration).min(1.0);
                let tau2 = tau * tau;
                let tau3 = tau2 * tau;
                let s = 10.0 * tau3 - 15.0 * tau3 * tau + 6.0 * tau3 * tau2;
                let s_dot = (30.0 * tau2 - 60.0 * tau3 + 30.0 * tau3 * tau) / duration;
                let s_ddot =
                    (60.0 * tau - 180.0 * tau2 + 120.0 * tau3) / (duration * duration);
                (delta * s, delta * s_dot, delta * s_ddot)
            },
            Self::Trapezoid(profile) => profile.eval(t),
            Self::SCurve(profile) => profile.eval(t),
        }
    }
}

/// 梯形速度曲线参数
///
/// 内部全部用无符号量（位移绝对值、正速度），方向符号在 eval 时
/// 统一乘回去，保证负位移与正位移严格对称。
#[derive(Debug, Clone, Copy)]
struct TrapezoidProfile {
    abs_disp: f64,
    sign: f64,
    max_vel: f64,
    max_acc: f64,
    t_acc: f64,
    t_const: f64,
}

impl TrapezoidProfile {
    /// 把梯形曲线拟合到给定时长
    ///
    /// 按约束算出最短时间后，若短于给定时长则压低速度 / 加速度拉满
    /// 整个时长；位移太小达不到最大速度时退化为三角形曲线。
    fn fit(displacement: f64, vel_limit: f64, acc_limit: f64, duration: f64) -> Self {
        let abs_disp = displacement.abs();
        let sign = if displacement >= 0.0 { 1.0 } else { -1.0 };

        if abs_disp < 1e-12 {
            return Self {
                abs_disp: 0.0,
                sign,
                max_vel: 0.0,
                max_acc: 0.0,
                t_acc: 0.0,
                t_const: 0.0,
            };
        }

        let mut max_vel = vel_limit;
        let mut max_acc = acc_limit;
        let mut t_acc = max_vel / max_acc;
        let s_acc = 0.5 * max_acc * t_acc * t_acc;
        let mut t_const;

        if 2.0 * s_acc <= abs_disp {
            // 有匀速段
            t_const = (abs_disp - 2.0 * s_acc) / max_vel;
            let t_total = 2.0 * t_acc + t_const;

            if t_total < duration {
                // 比给定时长快，压低速度拉满时长
                let stretched = (duration - abs_disp / max_vel) / 2.0;
                if stretched > 0.0 {
                    t_acc = stretched;
                    max_vel = abs_disp / (duration - t_acc);
                    max_acc = max_vel / t_acc;
                    t_const = duration - 2.0 * t_acc;
                } else {
                    // 三角形曲线
                    t_acc = duration / 2.0;
                    max_vel = abs_disp / duration * 2.0;
                    max_acc = max_vel / t_acc;
                    t_const = 0.0;
                }
            } else {
                t_const = (duration - 2.0 * t_acc).max(0.0);
            }
        } else {
            // 三角形速度曲线
            t_acc = (abs_disp / max_acc).sqrt();
            max_vel = max_acc * t_acc;
            t_const = 0.0;

            if 2.0 * t_acc < duration {
                t_acc = duration / 2.0;
                max_vel = abs_disp / duration * 2.0;
                max_acc = max_vel / t_acc;
            }
        }

        Self {
            abs_disp,
            sign,
            max_vel,
            max_acc,
            t_acc,
            t_const,
        }
    }

    fn eval(&self, t: f64) -> (f64, f64, f64) {
        let (a, v) = (self.max_acc, self.max_vel);
        let t_total = 2.0 * self.t_acc + self.t_const;

        let (pos, vel, acc) = if t <= self.t_acc {
            // 加速段
            (0.5 * a * t * t, a * t, a)
        } else if t <= self.t_acc + self.t_const {
            // 匀速段
            let t_rel = t - self.t_acc;
            (0.5 * a * self.t_acc * self.t_acc + v * t_rel, v, 0.0)
        } else if t < t_total {
            // 减速段
            let t_rel = t - self.t_acc - self.t_const;
            (
                0.5 * a * self.t_acc * self.t_acc + v * self.t_const + v * t_rel
                    - 0.5 * a * t_rel * t_rel,
                v - a * t_rel,
                -a,
            )
        } else {
            // 结束，精确落在目标上
            (self.abs_disp, 0.0, 0.0)
        };

        (self.sign * pos, self.sign * vel, self.sign * acc)
    }
}

/// 7 段式 S 曲线参数
///
/// 段序：加加速 / 匀加速 / 减加速 / 匀速 / 加减速 / 匀减速 / 减减速。
/// 与梯形曲线一样，内部用无符号量，符号在 eval 时统一乘回。
/// 加速段位移用 0.5·a·t_acc² 近似（与固件侧规划一致），多出的
/// 时间留在曲线末尾保持不动。
#[derive(Debug, Clone, Copy)]
struct SCurveProfile {
    abs_disp: f64,
    sign: f64,
    max_vel: f64,
    max_acc: f64,
    max_jerk: f64,
    t1: f64,
    t2: f64,
    t4: f64,
}

impl SCurveProfile {
    fn fit(displacement: f64, vel_limit: f64, acc_limit: f64, jerk_limit: f64) -> Self {
        let abs_disp = displacement.abs();
        let sign = if displacement >= 0.0 { 1.0 } else { -1.0 };

        if abs_disp < 1e-12 {
            return Self {
                abs_disp: 0.0,
                sign,
                max_vel: 0.0,
                max_acc: 0.0,
                max_jerk: 0.0,
                t1: 0.0,
                t2: 0.0,
                t4: 0.0,
            };
        }

        let mut max_vel = vel_limit;
        let max_acc = acc_limit;
        let mut max_jerk = jerk_limit;

        let mut t_jerk = max_acc / max_jerk;
        let mut t_acc = max_vel / max_acc;
        // 加速时间容不下两个完整的 jerk 段时收缩 jerk 段
        if t_acc < 2.0 * t_jerk {
            t_jerk = t_acc / 2.0;
            max_jerk = max_acc / t_jerk;
        }

        let s_acc = 0.5 * max_acc * t_acc * t_acc;
        let t4;
        if 2.0 * s_acc <= abs_disp {
            // 有匀速段
            t4 = (abs_disp - 2.0 * s_acc) / max_vel;
        } else {
            // 没有匀速段，压低峰值速度
            t4 = 0.0;
            max_vel = (abs_disp * max_acc).sqrt();
            t_acc = max_vel / max_acc;
            if t_acc < 2.0 * t_jerk {
                t_jerk = t_acc / 2.0;
                max_jerk = max_acc / t_jerk;
            }
        }

        Self {
            abs_disp,
            sign,
            max_vel,
            max_acc,
            max_jerk,
            t1: t_jerk,
            t2: t_acc - t_jerk,
            t4,
        }
    }

    fn eval(&self, t: f64) -> (f64, f64, f64) {
        let (j, a, v) = (self.max_jerk, self.max_acc, self.max_vel);
        let (t1, t2, t4) = (self.t1, self.t2, self.t4);
        // t3 == t5 == t7 == t1, t6 == t2
        let cum1 = t1;
        let cum2 = cum1 + t2;
        let cum3 = cum2 + t1;
        let cum4 = cum3 + t4;
        let cum5 = cum4 + t1;
        let cum6 = cum5 + t2;
        let cum7 = cum6 + t1;

        let (s, vel, acc) = if t <= cum1 {
            // 加加速
            ((1.0 / 6.0) * j * t * t * t, 0.5 * j * t * t, j * t)
        } else if t <= cum2 {
            // 匀加速
            let t_rel = t - cum1;
            (
                (1.0 / 6.0) * j * t1 * t1 * t1
                    + 0.5 * j * t1 * t1 * t_rel
                    + 0.5 * a * t_rel * t_rel,
                0.5 * j * t1 * t1 + a * t_rel,
                a,
            )
        } else if t <= cum3 {
            // 减加速
            let t_rel = t - cum2;
            let v2 = 0.5 * j * t1 * t1 + a * t2;
            let s2 =
                (1.0 / 6.0) * j * t1 * t1 * t1 + 0.5 * j * t1 * t1 * t2 + 0.5 * a * t2 * t2;
            (
                s2 + v2 * t_rel + 0.5 * a * t_rel * t_rel
                    - (1.0 / 6.0) * j * t_rel * t_rel * t_rel,
                v2 + a * t_rel - 0.5 * j * t_rel * t_rel,
                a - j * t_rel,
            )
        } else if t <= cum4 {
            // 匀速
            let t_rel = t - cum3;
            (self.position_at_t3() + v * t_rel, v, 0.0)
        } else if t <= cum5 {
            // 加减速
            let t_rel = t - cum4;
            (
                self.position_at_t4() + v * t_rel
                    - (1.0 / 6.0) * j * t_rel * t_rel * t_rel,
                v - 0.5 * j * t_rel * t_rel,
                -j * t_rel,
            )
        } else if t <= cum6 {
            // 匀减速
            let t_rel = t - cum5;
            let v5 = v - 0.5 * j * t1 * t1;
            (
                self.position_at_t5() + v5 * t_rel - 0.5 * a * t_rel * t_rel,
                v5 - a * t_rel,
                -a,
            )
        } else if t < cum7 {
            // 减减速
            let t_rel = t - cum6;
            let v6 = v - 0.5 * j * t1 * t1 - a * t2;
            (
                self.position_at_t6() + v6 * t_rel - 0.5 * a * t_rel * t_rel
                    + (1.0 / 6.0) * j * t_rel * t_rel * t_rel,
                v6 - a * t_rel + 0.5 * j * t_rel * t_rel,
                -a + j * t_rel,
            )
        } else {
            // 结束，精确落在目标上
            (self.abs_disp, 0.0, 0.0)
        };

        (self.sign * s, self.sign * vel, self.sign * acc)
    }

    fn position_at_t3(&self) -> f64 {
        let (j, a) = (self.max_jerk, self.max_acc);
        let (t1, t2) = (self.t1, self.t2);
        let s1 = (1.0 / 6.0) * j * t1 * t1 * t1;
        let s2 = 0.5 * j * t1 * t1 * t2 + 0.5 * a * t2 * t2;
        let s3 = (0.5 * j * t1 * t1 + a * t2) * t1 + 0.5 * a * t1 * t1
            - (1.0 / 6.0) * j * t1 * t1 * t1;
        s1 + s2 + s3
    }

    fn position_at_t4(&self) -> f64 {
        self.position_at_t3() + self.max_vel * self.t4
    }

    fn position_at_t5(&self) -> f64 {
        let t1 = self.t1;
        self.position_at_t4() + self.max_vel * t1 - (1.0 / 6.0) * self.max_jerk * t1 * t1 * t1
    }

    fn position_at_t6(&self) -> f64 {
        let (t1, t2) = (self.t1, self.t2);
        let v5 = self.max_vel - 0.5 * self.max_jerk * t1 * t1;
        self.position_at_t5() + v5 * t2 - 0.5 * self.max_acc * t2 * t2
    }
}
