//! 事件广播
//!
//! 订阅者通过 [`EventBus::subscribe`] 拿到自己的 crossbeam 接收端，
//! 各自按自己的节奏消费，互不阻塞（无界通道）。接收端被丢弃后，
//! 对应的发送端在下一次 publish 时被清理。

use crossbeam_channel::{Receiver, Sender, unbounded};
use evobot_protocol::StatusFrame;
use parking_lot::Mutex;
use tracing::trace;

use crate::controller::ControlMode;

/// 告警级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

/// 机械臂事件
#[derive(Debug, Clone, PartialEq)]
pub enum ArmEvent {
    /// 串口连接建立
    Connected { port: String, baud_rate: u32 },
    /// 串口断开
    Disconnected { reason: String },
    /// 轨迹开始执行
    TrajectoryStarted { duration: f64, points: usize },
    /// 轨迹正常走完
    TrajectoryCompleted { elapsed: f64 },
    /// 轨迹被外部停止
    TrajectoryStopped { reason: String },
    /// 急停触发
    EmergencyStop,
    /// 收到一帧状态反馈
    Telemetry(StatusFrame),
    /// 健康告警（过流 / 反馈超时等）
    Alert {
        joint: Option<u8>,
        level: AlertLevel,
        message: String,
    },
    /// 控制模式切换
    ModeChanged { from: ControlMode, to: ControlMode },
}

/// 事件总线
#[derive(Default)]
pub struct EventBus {
    senders: Mutex<Vec<Sender<ArmEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一个订阅者，返回其专属接收端
    pub fn subscribe(&self) -> Receiver<ArmEvent> {
        let (tx, rx) = unbounded();
        self.senders.lock().push(tx);
        rx
    }

    /// 向所有存活的订阅者广播一个事件
    pub fn publish(&self, event: ArmEvent) {
        trace!(?event, "publish");
        let mut senders = self.senders.lock();
        senders.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.senders.lock().len()
    }
}
