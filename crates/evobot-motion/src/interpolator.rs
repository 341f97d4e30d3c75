//! 实时插值循环
//!
//! 独立线程按控制频率从轨迹取点，回调推给发送路径。用逻辑时钟驱动：
//! 第 n 拍对应轨迹时刻 n/frequency，和墙钟调度抖动解耦，一条
//! `duration` 秒的轨迹总是精确产出 `round(duration×frequency)+1` 次
//! 回调。节拍用 spin_sleep 做绝对时刻调度，不累积漂移。
//!
//! 暂停冻结逻辑时钟，恢复后从暂停的拍继续。[`MotionInterpolator::stop`]
//! 等待线程退出；[`MotionInterpolator::emergency_stop`] 只置位不等待，
//! 允许在任意线程（包括回调内部）调用。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use evobot_protocol::JOINT_COUNT;
use parking_lot::Mutex;
use spin_sleep::SpinSleeper;
use tracing::{debug, error, info};

use crate::error::MotionError;
use crate::events::{AlertLevel, ArmEvent, EventBus};
use crate::trajectory::Trajectory;

/// 插值器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpolatorState {
    Idle,
    Running,
    Paused,
    Stopping,
    Error,
}

type PositionCallback = dyn Fn([i32; JOINT_COUNT]) + Send + Sync;

struct Shared {
    state: Mutex<InterpolatorState>,
    progress: Mutex<f64>,
    /// 急停路径置位：停止时不发 TrajectoryStopped 事件
    silent_stop: AtomicBool,
    frequency: f64,
    callback: Box<PositionCallback>,
    events: Arc<EventBus>,
}

/// 实时插值器
pub struct MotionInterpolator {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl MotionInterpolator {
    pub fn new(
        frequency: f64,
        events: Arc<EventBus>,
        callback: impl Fn([i32; JOINT_COUNT]) + Send + Sync + 'static,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(InterpolatorState::Idle),
                progress: Mutex::new(0.0),
                silent_stop: AtomicBool::new(false),
                frequency,
                callback: Box::new(callback),
                events,
            }),
            handle: Mutex::new(None),
        }
    }

    /// 开始执行轨迹，正在执行的轨迹先被停掉
    pub fn start(&self, trajectory: Trajectory) -> Result<(), MotionError> {
        if trajectory.is_empty() {
            return Err(MotionError::EmptyTrajectory);
        }
        self.stop();

        let mut handle = self.handle.lock();
        *self.shared.state.lock() = InterpolatorState::Running;
        *self.shared.progress.lock() = 0.0;
        self.shared.silent_stop.store(false, Ordering::Relaxed);

        info!(
            duration = trajectory.duration(),
            points = trajectory.len(),
            "trajectory execution started"
        );
        self.shared.events.publish(ArmEvent::TrajectoryStarted {
            duration: trajectory.duration(),
            points: trajectory.len(),
        });

        let shared = Arc::clone(&self.shared);
        *handle = Some(
            thread::Builder::new()
                .name("evobot-interpolator".to_string())
                .spawn(move || run_loop(shared, trajectory))?,
        );
        Ok(())
    }

    /// 停止执行并等待循环线程退出
    pub fn stop(&self) {
        {
            let mut state = self.shared.state.lock();
            if matches!(
                *state,
                InterpolatorState::Running | InterpolatorState::Paused
            ) {
                *state = InterpolatorState::Stopping;
            }
        }
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }

    /// 急停：只置停止位，不等待线程退出
    ///
    /// 可以在任意线程调用，包括插值回调内部。事件由调用方负责发布。
    pub fn emergency_stop(&self) {
        self.shared.silent_stop.store(true, Ordering::Relaxed);
        let mut state = self.shared.state.lock();
        if matches!(
            *state,
            InterpolatorState::Running | InterpolatorState::Paused
        ) {
            *state = InterpolatorState::Stopping;
        }
    }

    /// 暂停，逻辑时钟冻结。只在 Running 状态下生效
    pub fn pause(&self) -> bool {
        let mut state = self.shared.state.lock();
        if *state == InterpolatorState::Running {
            *state = InterpolatorState::Paused;
            debug!("interpolation paused");
            true
        } else {
            false
        }
    }

    /// 从暂停恢复
    pub fn resume(&self) -> bool {
        let mut state = self.shared.state.lock();
        if *state == InterpolatorState::Paused {
            *state = InterpolatorState::Running;
            debug!("interpolation resumed");
            true
        } else {
            false
        }
    }

    pub fn state(&self) -> InterpolatorState {
        *self.shared.state.lock()
    }

    /// 轨迹进度 `[0, 1]`，执行期间单调不减，完成时恰为 1.0
    pub fn progress(&self) -> f64 {
        *self.shared.progress.lock()
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self.state(),
            InterpolatorState::Running | InterpolatorState::Paused
        )
    }
}

impl Drop for MotionInterpolator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(shared: Arc<Shared>, trajectory: Trajectory) {
    let sleeper = SpinSleeper::default();
    let period = Duration::from_secs_f64(1.0 / shared.frequency);
    let duration = trajectory.duration();
    let mut next_tick = Instant::now() + period;
    let mut tick: u64 = 0;

    loop {
        let state = *shared.state.lock();
        match state {
            InterpolatorState::Running => {},
            InterpolatorState::Paused => {
                // 逻辑时钟冻结，节拍基准顺延
                sleeper.sleep(period);
                next_tick = Instant::now() + period;
                continue;
            },
            InterpolatorState::Stopping => {
                *shared.state.lock() = InterpolatorState::Idle;
                if !shared.silent_stop.load(Ordering::Relaxed) {
                    shared.events.publish(ArmEvent::TrajectoryStopped {
                        reason: "stop requested".to_string(),
                    });
                }
                debug!(tick, "interpolation stopped");
                return;
            },
            InterpolatorState::Idle | InterpolatorState::Error => return,
        }

        // 逻辑时刻：第 tick 拍对应 tick/frequency 秒
        let logical = tick as f64 / shared.frequency;
        let finishing = logical >= duration;
        let t = logical.min(duration);

        match trajectory.sample_at(t) {
            Some(sample) => {
                let positions: [i32; JOINT_COUNT] =
                    std::array::from_fn(|i| sample.positions[i].round() as i32);
                (shared.callback)(positions);
                *shared.progress.lock() = if duration > 0.0 { t / duration } else { 1.0 };
            },
            None => {
                error!(t, duration, "trajectory sample missing");
                *shared.state.lock() = InterpolatorState::Error;
                shared.events.publish(ArmEvent::Alert {
                    joint: None,
                    level: AlertLevel::Critical,
                    message: format!("trajectory sample missing at t={t:.3}"),
                });
                return;
            },
        }

        if finishing {
            *shared.state.lock() = InterpolatorState::Idle;
            info!(duration, "trajectory completed");
            shared
                .events
                .publish(ArmEvent::TrajectoryCompleted { elapsed: duration });
            return;
        }

        tick += 1;
        let now = Instant::now();
        if next_tick > now {
            sleeper.sleep(next_tick - now);
        } else {
            debug!(tick, overrun_us = (now - next_tick).as_micros() as u64, "tick overrun");
        }
        next_tick += period;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::{InterpolationKind, TrajectoryConstraints, TrajectoryGenerator};

    fn wait_for(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        condition()
    }

    fn linear_trajectory(target: f64, duration: f64, frequency: f64) -> Trajectory {
        let r#gen =
            TrajectoryGenerator::with_frequency(TrajectoryConstraints::default(), frequency);
        r#gen.plan_point_to_point(
            &[0.0; JOINT_COUNT],
            &[target; JOINT_COUNT],
            Some(duration),
            InterpolationKind::Linear,
        )
    }

    fn collector() -> (
        Arc<Mutex<Vec<[i32; JOINT_COUNT]>>>,
        impl Fn([i32; JOINT_COUNT]) + Send + Sync + 'static,
    ) {
        let sink = Arc::new(Mutex::new(Vec::new()));
        let sink2 = Arc::clone(&sink);
        (sink, move |p| sink2.lock().push(p))
    }

    #[test]
    fn test_runs_to_completion_with_exact_sample_count() {
        let events = Arc::new(EventBus::new());
        let rx = events.subscribe();
        let (sink, callback) = collector();
        let interp = MotionInterpolator::new(50.0, Arc::clone(&events), callback);

        interp.start(linear_trajectory(100.0, 0.2, 50.0)).unwrap();
        assert!(wait_for(
            || interp.state() == InterpolatorState::Idle,
            Duration::from_secs(2)
        ));

        // 0.2s × 50Hz → 11 个采样点
        let samples = sink.lock().clone();
        assert_eq!(samples.len(), 11);
        assert_eq!(samples[0], [0; JOINT_COUNT]);
        assert_eq!(samples[10], [100; JOINT_COUNT]);
        assert_eq!(interp.progress(), 1.0);

        let received: Vec<_> = rx.try_iter().collect();
        assert!(matches!(received[0], ArmEvent::TrajectoryStarted { .. }));
        assert!(
            received
                .iter()
                .any(|e| matches!(e, ArmEvent::TrajectoryCompleted { .. }))
        );
    }

    #[test]
    fn test_pause_freezes_progress() {
        let events = Arc::new(EventBus::new());
        let (_sink, callback) = collector();
        let interp = MotionInterpolator::new(50.0, events, callback);

        interp.start(linear_trajectory(1000.0, 2.0, 50.0)).unwrap();
        assert!(wait_for(|| interp.progress() > 0.05, Duration::from_secs(1)));
        assert!(interp.pause());
        assert_eq!(interp.state(), InterpolatorState::Paused);

        // 暂停一段时间后进度不变
        thread::sleep(Duration::from_millis(50));
        let frozen = interp.progress();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(interp.progress(), frozen);

        assert!(interp.resume());
        assert!(wait_for(
            || interp.progress() > frozen,
            Duration::from_secs(1)
        ));
        interp.stop();
    }

    #[test]
    fn test_stop_interrupts_and_publishes_stopped() {
        let events = Arc::new(EventBus::new());
        let rx = events.subscribe();
        let (sink, callback) = collector();
        let interp = MotionInterpolator::new(50.0, Arc::clone(&events), callback);

        interp.start(linear_trajectory(1000.0, 5.0, 50.0)).unwrap();
        assert!(wait_for(|| !sink.lock().is_empty(), Duration::from_secs(1)));
        interp.stop();

        assert_eq!(interp.state(), InterpolatorState::Idle);
        assert!(interp.progress() < 1.0);

        let received: Vec<_> = rx.try_iter().collect();
        assert!(
            received
                .iter()
                .any(|e| matches!(e, ArmEvent::TrajectoryStopped { .. }))
        );
        assert!(
            !received
                .iter()
                .any(|e| matches!(e, ArmEvent::TrajectoryCompleted { .. }))
        );
    }

    #[test]
    fn test_emergency_stop_is_silent_and_non_blocking() {
        let events = Arc::new(EventBus::new());
        let rx = events.subscribe();
        let (_sink, callback) = collector();
        let interp = MotionInterpolator::new(50.0, Arc::clone(&events), callback);

        interp.start(linear_trajectory(1000.0, 5.0, 50.0)).unwrap();
        interp.emergency_stop();

        assert!(wait_for(
            || interp.state() == InterpolatorState::Idle,
            Duration::from_secs(1)
        ));
        let received: Vec<_> = rx.try_iter().collect();
        assert!(
            !received
                .iter()
                .any(|e| matches!(e, ArmEvent::TrajectoryStopped { .. }))
        );
    }

    #[test]
    fn test_restart_supersedes_running_trajectory() {
        let events = Arc::new(EventBus::new());
        let rx = events.subscribe();
        let (sink, callback) = collector();
        let interp = MotionInterpolator::new(50.0, Arc::clone(&events), callback);

        interp.start(linear_trajectory(1000.0, 5.0, 50.0)).unwrap();
        assert!(wait_for(|| !sink.lock().is_empty(), Duration::from_secs(1)));
        interp.start(linear_trajectory(200.0, 0.1, 50.0)).unwrap();

        assert!(wait_for(
            || interp.state() == InterpolatorState::Idle && interp.progress() == 1.0,
            Duration::from_secs(2)
        ));
        assert_eq!(*sink.lock().last().unwrap(), [200; JOINT_COUNT]);

        let received: Vec<_> = rx.try_iter().collect();
        let started = received
            .iter()
            .filter(|e| matches!(e, ArmEvent::TrajectoryStarted { .. }))
            .count();
        assert_eq!(started, 2);
    }

    #[test]
    fn test_progress_monotonic_during_run() {
        let events = Arc::new(EventBus::new());
        let interp = Arc::new(MotionInterpolator::new(100.0, events, |_| {}));

        interp.start(linear_trajectory(500.0, 0.5, 100.0)).unwrap();
        let mut last = 0.0;
        while interp.state() != InterpolatorState::Idle {
            let p = interp.progress();
            assert!(p >= last);
            last = p;
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(interp.progress(), 1.0);
    }
}
