//! 设备监控
//!
//! 独立线程按固定间隔交替向手臂板 / 手腕板发状态查询，同时订阅
//! 事件总线上的遥测帧维护逐关节健康表。两类告警都是边沿触发，
//! 进入异常状态时发一次 Alert，恢复后允许再次触发：
//!
//! - 过流：关节电流超过阈值
//! - 失联：超过超时时间没有该关节的反馈

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use evobot_protocol::{BoardId, JOINT_COUNT, encode_status_query, joint_name};
use evobot_serial::SerialTransport;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::error::MotionError;
use crate::events::{AlertLevel, ArmEvent, EventBus};

/// 关节健康状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HealthStatus {
    /// 尚未收到任何反馈
    #[default]
    Unknown,
    Healthy,
    /// 过流
    Warning,
    /// 反馈超时
    Offline,
}

/// 单关节健康信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JointHealth {
    pub joint_id: u8,
    pub position: u16,
    pub current: u16,
    pub status: HealthStatus,
}

/// 监控通信统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorStats {
    /// 已发出的状态查询数
    pub queries_sent: u64,
    /// 并入健康表的遥测帧数
    pub frames_ingested: u64,
    /// 已发布的告警数
    pub alerts_published: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct HealthEntry {
    position: u16,
    current: u16,
    last_update: Option<Instant>,
    status: HealthStatus,
}

/// 设备监控器
pub struct DeviceMonitor {
    transport: Arc<SerialTransport>,
    events: Arc<EventBus>,
    config: MonitorConfig,
    health: Arc<Mutex<[HealthEntry; JOINT_COUNT]>>,
    stats: Arc<Mutex<MonitorStats>>,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceMonitor {
    pub fn new(
        transport: Arc<SerialTransport>,
        events: Arc<EventBus>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            transport,
            events,
            config,
            health: Arc::new(Mutex::new([HealthEntry::default(); JOINT_COUNT])),
            stats: Arc::new(Mutex::new(MonitorStats::default())),
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    /// 启动监控线程，重复调用是空操作
    pub fn start(&self) -> Result<(), MotionError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let telemetry_rx = self.events.subscribe();
        let transport = Arc::clone(&self.transport);
        let events = Arc::clone(&self.events);
        let config = self.config.clone();
        let health = Arc::clone(&self.health);
        let stats = Arc::clone(&self.stats);
        let running = Arc::clone(&self.running);

        let handle = thread::Builder::new()
            .name("evobot-monitor".to_string())
            .spawn(move || {
                info!(
                    interval_ms = config.query_interval_ms,
                    "device monitor started"
                );
                let mut query_arm = true;
                while running.load(Ordering::SeqCst) {
                    // 交替查询两块板卡
                    if transport.is_connected() {
                        let board = if query_arm { BoardId::Arm } else { BoardId::Wrist };
                        match transport.send(encode_status_query(board)) {
                            Ok(()) => stats.lock().queries_sent += 1,
                            Err(e) => debug!(error = %e, ?board, "status query dropped"),
                        }
                        query_arm = !query_arm;
                    }

                    for event in telemetry_rx.try_iter() {
                        if let ArmEvent::Telemetry(frame) = event {
                            stats.lock().frames_ingested += 1;
                            ingest_frame(&health, &events, &config, &stats, &frame);
                        }
                    }
                    check_stale(&health, &events, &config, &stats);

                    thread::sleep(Duration::from_millis(config.query_interval_ms));
                }
                info!("device monitor stopped");
            })?;
        *self.handle.lock() = Some(handle);
        Ok(())
    }

    /// 停止监控线程并等待退出
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> MonitorStats {
        *self.stats.lock()
    }

    /// 当前健康表快照
    pub fn health(&self) -> [JointHealth; JOINT_COUNT] {
        let entries = self.health.lock();
        std::array::from_fn(|i| JointHealth {
            joint_id: i as u8,
            position: entries[i].position,
            current: entries[i].current,
            status: entries[i].status,
        })
    }
}

impl Drop for DeviceMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// 把一帧遥测并入健康表，过流的关节边沿触发告警
fn ingest_frame(
    health: &Mutex<[HealthEntry; JOINT_COUNT]>,
    events: &EventBus,
    config: &MonitorConfig,
    stats: &Mutex<MonitorStats>,
    frame: &evobot_protocol::StatusFrame,
) {
    for joint in &frame.joints {
        let id = joint.joint_id as usize;
        if id >= JOINT_COUNT {
            continue;
        }

        let previous = {
            let mut entries = health.lock();
            let entry = &mut entries[id];
            let previous = entry.status;
            entry.position = joint.position;
            entry.current = joint.current;
            entry.last_update = Some(Instant::now());
            entry.status = if joint.current > config.current_threshold_ma {
                HealthStatus::Warning
            } else {
                HealthStatus::Healthy
            };
            previous
        };

        if joint.current > config.current_threshold_ma && previous != HealthStatus::Warning {
            warn!(joint = joint.joint_id, current = joint.current, "overcurrent");
            stats.lock().alerts_published += 1;
            events.publish(ArmEvent::Alert {
                joint: Some(joint.joint_id),
                level: AlertLevel::Warning,
                message: format!(
                    "joint {} current {}mA exceeds {}mA",
                    joint_name(id),
                    joint.current,
                    config.current_threshold_ma
                ),
            });
        }
    }
}

/// 把超时没有反馈的关节标记为 Offline，边沿触发告警
fn check_stale(
    health: &Mutex<[HealthEntry; JOINT_COUNT]>,
    events: &EventBus,
    config: &MonitorConfig,
    stats: &Mutex<MonitorStats>,
) {
    let timeout = Duration::from_secs_f64(config.stale_timeout_s);
    let now = Instant::now();
    let mut newly_stale = Vec::new();

    {
        let mut entries = health.lock();
        for (id, entry) in entries.iter_mut().enumerate() {
            let Some(last) = entry.last_update else {
                continue;
            };
            if now.duration_since(last) > timeout && entry.status != HealthStatus::Offline {
                entry.status = HealthStatus::Offline;
                newly_stale.push(id);
            }
        }
    }

    for id in newly_stale {
        warn!(joint = id, "feedback stale");
        stats.lock().alerts_published += 1;
        events.publish(ArmEvent::Alert {
            joint: Some(id as u8),
            level: AlertLevel::Warning,
            message: format!(
                "joint {} no feedback for {:.1}s",
                joint_name(id),
                config.stale_timeout_s
            ),
        });
    }
}
