//! 运动控制器
//!
//! 控制路径：目标位置 → 软限位检查 → 标定映射 → 轨迹生成 →
//! 插值循环 → 位置指令编码 → 串口发送。
//!
//! 反馈路径：串口字节流 → 分帧 → 状态帧解码 → 遥测快照（arc-swap）
//! → Telemetry 事件 → 过流检查。解码失败的帧记日志后丢弃，不进入
//! 控制路径。
//!
//! 所有依赖在构造时显式注入，控制器自身不打开串口也不创建全局状态。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use crossbeam_channel::{Receiver, select, unbounded};
use evobot_kinematics::{JointVector, KinematicsSolver, Pose6D};
use evobot_planner::{CollisionChecker, Obstacle, RrtPlanner};
use evobot_protocol::{
    FrameAssembler, JOINT_COUNT, StatusFrame, counts_to_rad, decode_status,
    encode_position_command, joint_name, rad_to_counts,
};
use evobot_serial::{SerialTransport, TransportEvent};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::calibration::CalibrationMap;
use crate::config::{ArmConfig, JointConfig};
use crate::error::MotionError;
use crate::events::{AlertLevel, ArmEvent, EventBus};
use crate::interpolator::MotionInterpolator;
use crate::trajectory::{InterpolationKind, TrajectoryConstraints, TrajectoryGenerator};

/// 规划轨迹的默认总时长（秒）
const DEFAULT_PLANNED_DURATION: f64 = 5.0;

/// 控制模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlMode {
    /// 单关节 / 整臂点动
    #[default]
    Manual,
    /// 轨迹执行
    Trajectory,
    /// 示教
    Teaching,
    /// 脚本驱动
    Script,
}

/// 安全等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SafetyLevel {
    #[default]
    Normal,
    /// 出现过流等告警，运动仍被允许
    Warning,
    /// 急停锁存，拒绝运动指令直到复位
    Emergency,
}

/// 速度档位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VelocityPreset {
    VerySlow,
    Slow,
    #[default]
    Medium,
    Fast,
    VeryFast,
}

/// 一个速度档位对应的运动参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocityParameters {
    /// counts/s
    pub velocity: f64,
    /// counts/s²
    pub acceleration: f64,
    /// counts/s³
    pub jerk: f64,
    /// 该档位默认的插值策略
    pub interpolation: InterpolationKind,
}

impl VelocityPreset {
    pub fn parameters(self) -> VelocityParameters {
        // 低速档用 S 曲线求平滑，高速档用梯形求效率
        let (velocity, acceleration, jerk, interpolation) = match self {
            Self::VerySlow => (100.0, 200.0, 1000.0, InterpolationKind::SCurve),
            Self::Slow => (300.0, 500.0, 2000.0, InterpolationKind::SCurve),
            Self::Medium => (500.0, 1000.0, 5000.0, InterpolationKind::Trapezoidal),
            Self::Fast => (800.0, 1500.0, 8000.0, InterpolationKind::Trapezoidal),
            Self::VeryFast => (1000.0, 2000.0, 10000.0, InterpolationKind::Trapezoidal),
        };
        VelocityParameters {
            velocity,
            acceleration,
            jerk,
            interpolation,
        }
    }
}

impl VelocityParameters {
    pub fn constraints(&self) -> TrajectoryConstraints {
        TrajectoryConstraints::uniform_with_jerk(self.velocity, self.acceleration, self.jerk)
    }
}

/// 控制器状态快照
#[derive(Debug, Clone, PartialEq)]
pub struct MotionStatus {
    pub connected: bool,
    pub mode: ControlMode,
    pub safety: SafetyLevel,
    pub moving: bool,
    /// 当前轨迹进度 `[0, 1]`
    pub progress: f64,
    /// 用户坐标下的当前位置
    pub positions: [i32; JOINT_COUNT],
    pub currents: [u16; JOINT_COUNT],
}

/// 反馈快照（硬件坐标）
#[derive(Debug, Clone, Default)]
struct Telemetry {
    positions: [i32; JOINT_COUNT],
    velocities: [i32; JOINT_COUNT],
    currents: [u16; JOINT_COUNT],
    last_update: Option<Instant>,
}

/// 软限位 / 过流检查
struct SafetyChecker {
    joints: Vec<JointConfig>,
}

impl SafetyChecker {
    fn new(joints: Vec<JointConfig>) -> Self {
        Self { joints }
    }

    /// 用户坐标下逐关节软限位检查，第一个越限的关节报错
    fn check_positions(&self, positions: &[i32; JOINT_COUNT]) -> Result<(), MotionError> {
        for (i, joint) in self.joints.iter().enumerate() {
            let position = positions[i];
            if position < joint.min_position || position > joint.max_position {
                return Err(MotionError::SoftLimit {
                    name: joint.name.clone(),
                    position,
                    min: joint.min_position,
                    max: joint.max_position,
                });
            }
        }
        Ok(())
    }

    /// 把内部生成的中间点钳制进软限位
    ///
    /// 只用于规划器产出的路径点。用户指令越限走 `check_positions`
    /// 显式拒绝，绝不静默钳制。
    fn coerce_into_limits(&self, positions: [i32; JOINT_COUNT]) -> [i32; JOINT_COUNT] {
        std::array::from_fn(|i| {
            let joint = &self.joints[i];
            let clamped = positions[i].clamp(joint.min_position, joint.max_position);
            if clamped != positions[i] {
                warn!(
                    joint = %joint.name,
                    from = positions[i],
                    to = clamped,
                    "waypoint coerced into soft limits"
                );
            }
            clamped
        })
    }

    /// 档位约束逐关节收紧到配置上限
    fn constraints_for(&self, params: &VelocityParameters) -> TrajectoryConstraints {
        TrajectoryConstraints::with_jerk(
            std::array::from_fn(|i| params.velocity.min(self.joints[i].max_velocity)),
            std::array::from_fn(|i| params.acceleration.min(self.joints[i].max_acceleration)),
            [params.jerk; JOINT_COUNT],
        )
    }

    /// 返回反馈帧中第一个过流的关节
    fn overcurrent_joint(&self, frame: &StatusFrame) -> Option<(u8, u16)> {
        frame
            .joints
            .iter()
            .find(|j| {
                let id = j.joint_id as usize;
                id < self.joints.len() && j.current > self.joints[id].max_current
            })
            .map(|j| (j.joint_id, j.current))
    }

    /// 返回反馈帧中第一个超速的关节（counts/s）
    fn overspeed_joint(&self, frame: &StatusFrame) -> Option<(u8, u16)> {
        frame
            .joints
            .iter()
            .find(|j| {
                let id = j.joint_id as usize;
                id < self.joints.len() && f64::from(j.velocity) > self.joints[id].max_velocity
            })
            .map(|j| (j.joint_id, j.velocity))
    }
}

/// 运动控制器
pub struct MotionController {
    transport: Arc<SerialTransport>,
    solver: Arc<KinematicsSolver>,
    checker: CollisionChecker,
    planner: RrtPlanner,
    generator: Mutex<TrajectoryGenerator>,
    interpolator: MotionInterpolator,
    calibration: Arc<dyn CalibrationMap>,
    events: Arc<EventBus>,
    safety: Arc<SafetyChecker>,
    mode: Mutex<ControlMode>,
    safety_level: Arc<Mutex<SafetyLevel>>,
    velocity: Mutex<(VelocityPreset, VelocityParameters)>,
    telemetry: Arc<ArcSwap<Telemetry>>,
    feedback_alive: Arc<AtomicBool>,
    feedback: Mutex<Option<JoinHandle<()>>>,
}

impl MotionController {
    /// 组装控制器并启动反馈线程
    ///
    /// 传输层的数据 / 事件通道在这里接管，调用方只需要负责
    /// `transport.connect()` 的时机。
    pub fn new(
        config: ArmConfig,
        transport: Arc<SerialTransport>,
        solver: Arc<KinematicsSolver>,
        calibration: Arc<dyn CalibrationMap>,
        events: Arc<EventBus>,
    ) -> Result<Self, MotionError> {
        let preset = VelocityPreset::default();
        let params = preset.parameters();
        let safety = Arc::new(SafetyChecker::new(config.joints.clone()));
        let generator = TrajectoryGenerator::with_frequency(
            safety.constraints_for(&params),
            config.control.frequency,
        );

        let telemetry: Arc<ArcSwap<Telemetry>> =
            Arc::new(ArcSwap::from_pointee(Telemetry::default()));
        let safety_level = Arc::new(Mutex::new(SafetyLevel::Normal));

        // 插值回调：编码位置指令并发送。发送失败只告警，插值循环继续，
        // 断线由传输层的重连路径处理。
        let transport_tx = Arc::clone(&transport);
        let interpolator = MotionInterpolator::new(
            config.control.frequency,
            Arc::clone(&events),
            move |positions| {
                let frame = encode_position_command(&positions, None);
                if let Err(e) = transport_tx.send(frame) {
                    warn!(error = %e, "position command dropped");
                }
            },
        );

        let (data_tx, data_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();
        transport.set_data_sender(data_tx);
        transport.set_event_sender(event_tx);

        let feedback_alive = Arc::new(AtomicBool::new(true));
        let feedback = spawn_feedback_worker(
            data_rx,
            event_rx,
            Arc::clone(&telemetry),
            Arc::clone(&events),
            Arc::clone(&safety),
            Arc::clone(&safety_level),
            Arc::clone(&feedback_alive),
        )?;

        Ok(Self {
            checker: CollisionChecker::new(Arc::clone(&solver)),
            planner: RrtPlanner::default(),
            generator: Mutex::new(generator),
            interpolator,
            transport,
            solver,
            calibration,
            events,
            safety,
            mode: Mutex::new(ControlMode::default()),
            safety_level,
            velocity: Mutex::new((preset, params)),
            telemetry,
            feedback_alive,
            feedback: Mutex::new(Some(feedback)),
        })
    }

    pub fn connect(&self) -> Result<(), MotionError> {
        self.transport.connect()?;
        Ok(())
    }

    pub fn disconnect(&self) {
        self.interpolator.stop();
        self.transport.disconnect();
    }

    /// 整臂移动到用户坐标下的目标位置
    ///
    /// `duration` 为 `None` 时按当前速度档位自动计算，`kind` 为
    /// `None` 时用档位默认的插值策略。
    pub fn move_to(
        &self,
        positions: [i32; JOINT_COUNT],
        duration: Option<f64>,
        kind: Option<InterpolationKind>,
    ) -> Result<(), MotionError> {
        self.ensure_movable()?;
        self.safety.check_positions(&positions)?;

        let hardware = self.calibration.apply(&positions);
        let start = self.telemetry.load().positions.map(f64::from);
        let target = hardware.map(f64::from);
        let kind = kind.unwrap_or(self.velocity.lock().1.interpolation);

        let trajectory = self
            .generator
            .lock()
            .plan_point_to_point(&start, &target, duration, kind);
        info!(?kind, duration = trajectory.duration(), "move_to");
        self.interpolator.start(trajectory)
    }

    /// 单关节移动，其余关节保持当前位置
    pub fn move_joint(
        &self,
        joint: usize,
        position: i32,
        duration: Option<f64>,
    ) -> Result<(), MotionError> {
        if joint >= JOINT_COUNT {
            return Err(MotionError::InvalidJoint { joint });
        }
        let mut target = self.current_positions();
        target[joint] = position;
        self.move_to(target, duration, None)
    }

    /// 移动到笛卡尔位姿（逆解 → 关节空间轨迹）
    pub fn move_to_pose(&self, pose: &Pose6D, duration: Option<f64>) -> Result<(), MotionError> {
        let solution = self.solver.inverse(pose, None)?;
        let counts: [i32; JOINT_COUNT] =
            std::array::from_fn(|i| rad_to_counts(solution.joints[i]).round() as i32);
        // 逆解得到硬件坐标，转回用户坐标走统一的软限位检查
        let user = self.calibration.reverse(&counts);
        debug!(
            iterations = solution.iterations,
            residual = solution.residual,
            "ik solution"
        );
        self.move_to(user, duration, None)
    }

    /// 带避障的位姿移动：RRT 规划 + 捷径平滑 + 多点样条轨迹
    pub fn move_with_path_planning(
        &self,
        pose: &Pose6D,
        duration: Option<f64>,
    ) -> Result<(), MotionError> {
        self.ensure_movable()?;

        let start_counts = self.telemetry.load().positions;
        let start = JointVector::new(std::array::from_fn(|i| {
            counts_to_rad(f64::from(start_counts[i]))
        }));
        let goal = self.solver.inverse(pose, None)?;

        let path = self.planner.plan(&self.checker, &start, &goal.joints)?;
        let waypoints = self.planner.optimize(&self.checker, &path.waypoints);

        // 规划出的中间点钳制进软限位（用户坐标下检查）
        let joint_waypoints: Vec<[f64; JOINT_COUNT]> = waypoints
            .iter()
            .map(|q| {
                let counts: [i32; JOINT_COUNT] =
                    std::array::from_fn(|i| rad_to_counts(q[i]).round() as i32);
                let user = self.safety.coerce_into_limits(self.calibration.reverse(&counts));
                self.calibration.apply(&user).map(f64::from)
            })
            .collect();
        let segments = joint_waypoints.len() - 1;
        let total = duration.unwrap_or(DEFAULT_PLANNED_DURATION);
        let durations = vec![total / segments as f64; segments];

        let trajectory = self.generator.lock().plan_multi_point(
            &joint_waypoints,
            Some(&durations),
            InterpolationKind::CubicSpline,
        )?;
        info!(
            waypoints = joint_waypoints.len(),
            cost = path.cost,
            total,
            "planned motion"
        );
        self.interpolator.start(trajectory)
    }

    pub fn add_obstacle(&self, obstacle: Obstacle) {
        self.checker.add_obstacle(obstacle);
    }

    pub fn clear_obstacles(&self) {
        self.checker.clear_obstacles();
    }

    /// 停止当前轨迹（等待插值线程退出）
    pub fn stop(&self) {
        self.interpolator.stop();
    }

    /// 暂停当前轨迹，返回是否发生了状态切换
    pub fn pause(&self) -> bool {
        self.interpolator.pause()
    }

    pub fn resume(&self) -> bool {
        self.interpolator.resume()
    }

    /// 急停：立即停止插值并锁存 Emergency 等级
    ///
    /// 只置位不等待，可以在任意线程调用。复位前所有运动指令被拒绝。
    pub fn emergency_stop(&self) {
        warn!("emergency stop");
        self.interpolator.emergency_stop();
        *self.safety_level.lock() = SafetyLevel::Emergency;
        self.events.publish(ArmEvent::EmergencyStop);
    }

    /// 复位安全等级。轨迹仍在执行时拒绝
    pub fn reset_safety(&self) -> Result<(), MotionError> {
        if self.interpolator.is_active() {
            return Err(MotionError::TrajectoryActive);
        }
        *self.safety_level.lock() = SafetyLevel::Normal;
        info!("safety level reset");
        Ok(())
    }

    /// 切换控制模式，轨迹执行期间拒绝
    pub fn set_mode(&self, mode: ControlMode) -> Result<(), MotionError> {
        if self.interpolator.is_active() {
            return Err(MotionError::TrajectoryActive);
        }
        let mut current = self.mode.lock();
        if *current != mode {
            let from = *current;
            *current = mode;
            drop(current);
            self.events.publish(ArmEvent::ModeChanged { from, to: mode });
        }
        Ok(())
    }

    pub fn mode(&self) -> ControlMode {
        *self.mode.lock()
    }

    /// 切换速度档位，影响后续轨迹的约束和默认插值策略
    pub fn apply_preset(&self, preset: VelocityPreset) {
        let params = preset.parameters();
        self.generator
            .lock()
            .set_constraints(self.safety.constraints_for(&params));
        *self.velocity.lock() = (preset, params);
        info!(?preset, "velocity preset applied");
    }

    pub fn velocity_preset(&self) -> VelocityPreset {
        self.velocity.lock().0
    }

    /// 用户坐标下的当前位置（来自最近一帧反馈）
    pub fn current_positions(&self) -> [i32; JOINT_COUNT] {
        self.calibration.reverse(&self.telemetry.load().positions)
    }

    /// 当前末端位姿（正运动学）
    pub fn current_pose(&self) -> Result<Pose6D, MotionError> {
        let counts = self.telemetry.load().positions;
        let rad: [f64; JOINT_COUNT] =
            std::array::from_fn(|i| counts_to_rad(f64::from(counts[i])));
        Ok(self.solver.forward(&rad)?)
    }

    /// 当前位形的可操作性指标
    pub fn manipulability(&self) -> f64 {
        let counts = self.telemetry.load().positions;
        let q = JointVector::new(std::array::from_fn(|i| {
            counts_to_rad(f64::from(counts[i]))
        }));
        self.solver.manipulability(&q)
    }

    /// 当前位形是否接近奇异
    pub fn check_singularity(&self, threshold: f64) -> bool {
        let counts = self.telemetry.load().positions;
        let q = JointVector::new(std::array::from_fn(|i| {
            counts_to_rad(f64::from(counts[i]))
        }));
        self.solver.is_singular(&q, threshold)
    }

    pub fn safety_level(&self) -> SafetyLevel {
        *self.safety_level.lock()
    }

    pub fn is_moving(&self) -> bool {
        self.interpolator.is_active()
    }

    pub fn status(&self) -> MotionStatus {
        let telemetry = self.telemetry.load();
        MotionStatus {
            connected: self.transport.is_connected(),
            mode: self.mode(),
            safety: self.safety_level(),
            moving: self.interpolator.is_active(),
            progress: self.interpolator.progress(),
            positions: self.calibration.reverse(&telemetry.positions),
            currents: telemetry.currents,
        }
    }

    fn ensure_movable(&self) -> Result<(), MotionError> {
        if !self.transport.is_connected() {
            return Err(MotionError::NotConnected);
        }
        if *self.safety_level.lock() == SafetyLevel::Emergency {
            return Err(MotionError::EmergencyLatched);
        }
        Ok(())
    }
}

impl Drop for MotionController {
    fn drop(&mut self) {
        self.interpolator.stop();
        self.feedback_alive.store(false, Ordering::SeqCst);
        if let Some(handle) = self.feedback.lock().take() {
            let _ = handle.join();
        }
    }
}

/// 反馈线程：串口数据分帧解码进快照，传输层事件映射成机械臂事件
#[allow(clippy::too_many_arguments)]
fn spawn_feedback_worker(
    data_rx: Receiver<Vec<u8>>,
    event_rx: Receiver<TransportEvent>,
    telemetry: Arc<ArcSwap<Telemetry>>,
    events: Arc<EventBus>,
    safety: Arc<SafetyChecker>,
    safety_level: Arc<Mutex<SafetyLevel>>,
    alive: Arc<AtomicBool>,
) -> Result<JoinHandle<()>, MotionError> {
    let handle = thread::Builder::new()
        .name("evobot-feedback".to_string())
        .spawn(move || {
            let mut assembler = FrameAssembler::new();
            while alive.load(Ordering::SeqCst) {
                select! {
                    recv(data_rx) -> msg => match msg {
                        Ok(chunk) => {
                            for raw in assembler.feed(&chunk) {
                                match decode_status(&raw) {
                                    Ok(frame) => handle_status_frame(
                                        &frame,
                                        &telemetry,
                                        &events,
                                        &safety,
                                        &safety_level,
                                    ),
                                    Err(e) => debug!(error = %e, "discarding malformed frame"),
                                }
                            }
                        },
                        Err(_) => break,
                    },
                    recv(event_rx) -> msg => match msg {
                        Ok(event) => {
                            if matches!(event, TransportEvent::Disconnected { .. }) {
                                assembler.reset();
                            }
                            events.publish(map_transport_event(event));
                        },
                        Err(_) => break,
                    },
                    default(Duration::from_millis(100)) => {},
                }
            }
        })?;
    Ok(handle)
}

fn handle_status_frame(
    frame: &StatusFrame,
    telemetry: &ArcSwap<Telemetry>,
    events: &EventBus,
    safety: &SafetyChecker,
    safety_level: &Mutex<SafetyLevel>,
) {
    let mut snapshot = (**telemetry.load()).clone();
    for joint in &frame.joints {
        let id = joint.joint_id as usize;
        if id < JOINT_COUNT {
            snapshot.positions[id] = i32::from(joint.position);
            snapshot.velocities[id] = i32::from(joint.velocity);
            snapshot.currents[id] = joint.current;
        }
    }
    snapshot.last_update = Some(Instant::now());
    telemetry.store(Arc::new(snapshot));

    events.publish(ArmEvent::Telemetry(frame.clone()));

    if let Some((id, current)) = safety.overcurrent_joint(frame) {
        escalate_to_warning(safety_level);
        warn!(joint = id, current, "overcurrent");
        events.publish(ArmEvent::Alert {
            joint: Some(id),
            level: AlertLevel::Warning,
            message: format!(
                "joint {} current {}mA exceeds limit",
                joint_name(id as usize),
                current
            ),
        });
    }

    if let Some((id, velocity)) = safety.overspeed_joint(frame) {
        escalate_to_warning(safety_level);
        warn!(joint = id, velocity, "overspeed");
        events.publish(ArmEvent::Alert {
            joint: Some(id),
            level: AlertLevel::Warning,
            message: format!(
                "joint {} velocity {}counts/s exceeds limit",
                joint_name(id as usize),
                velocity
            ),
        });
    }
}

/// Normal → Warning，急停锁存不被降级
fn escalate_to_warning(safety_level: &Mutex<SafetyLevel>) {
    let mut level = safety_level.lock();
    if *level == SafetyLevel::Normal {
        *level = SafetyLevel::Warning;
    }
}

fn map_transport_event(event: TransportEvent) -> ArmEvent {
    match event {
        TransportEvent::Connected { port, baud } => ArmEvent::Connected {
            port,
            baud_rate: baud,
        },
        TransportEvent::Disconnected { reason } => ArmEvent::Disconnected { reason },
        TransportEvent::Reconnecting { attempt } => ArmEvent::Alert {
            joint: None,
            level: AlertLevel::Info,
            message: format!("reconnect attempt {attempt}"),
        },
        TransportEvent::ReconnectFailed => ArmEvent::Alert {
            joint: None,
            level: AlertLevel::Critical,
            message: "reconnect attempts exhausted".to_string(),
        },
    }
}
