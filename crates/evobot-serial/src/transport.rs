//! 串口传输：连接状态机 + IO 工作线程 + 自动重连
//!
//! 单个 IO 线程承担两个逻辑角色：先排空发送队列，再读取可用字节，
//! 空闲时短暂休眠。读写任一方向出错即进入重连流程：固定间隔重试
//! 有限次，成功则换上新链路继续，耗尽则进入 `Error` 终态等待上层
//! 显式处理。
//!
//! 发送队列有界（默认 100 帧），队列满时 `send` 立即返回错误。
//! 控制线程绝不因为串口堵塞而被拖住。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded};
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::TransportError;
use crate::link::{LinkFactory, SerialLink};

/// 连接状态机
///
/// ```text
/// Disconnected → Connecting → Connected ⇄ Reconnecting
///                    ↓                        ↓
///                  Error  ←───────────────────┘ (重试耗尽)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Error,
}

/// 连接事件，经 crossbeam 通道广播给上层
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected { port: String, baud: u32 },
    Disconnected { reason: String },
    Reconnecting { attempt: u32 },
    ReconnectFailed,
}

/// 传输层配置
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub port: String,
    pub baud: u32,
    /// 发送队列容量（帧数），满时 `send` 立即失败
    pub send_queue_capacity: usize,
    /// 单次读取的缓冲区大小
    pub read_chunk_size: usize,
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    /// 无数据可读时 IO 线程的休眠时长
    pub idle_sleep: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud: 1_000_000,
            send_queue_capacity: 100,
            read_chunk_size: 12 * 1024,
            reconnect_attempts: 3,
            reconnect_delay: Duration::from_secs(1),
            idle_sleep: Duration::from_millis(1),
        }
    }
}

/// 传输统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub frames_sent: u64,
    pub send_errors: u64,
    pub receive_errors: u64,
    pub reconnects: u64,
}

struct Shared {
    config: SerialConfig,
    factory: Arc<dyn LinkFactory>,
    state: Mutex<ConnectionState>,
    stats: Mutex<TransportStats>,
    data_tx: Mutex<Option<Sender<Vec<u8>>>>,
    event_tx: Mutex<Option<Sender<TransportEvent>>>,
    alive: AtomicBool,
}

impl Shared {
    fn set_state(&self, s: ConnectionState) {
        *self.state.lock() = s;
    }

    fn publish(&self, ev: TransportEvent) {
        if let Some(tx) = self.event_tx.lock().as_ref() {
            // 接收端已关闭时静默丢弃
            let _ = tx.send(ev);
        }
    }
}

/// 串口传输
pub struct SerialTransport {
    shared: Arc<Shared>,
    cmd_tx: Mutex<Option<Sender<Vec<u8>>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SerialTransport {
    pub fn new(factory: Arc<dyn LinkFactory>, config: SerialConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                factory,
                state: Mutex::new(ConnectionState::Disconnected),
                stats: Mutex::new(TransportStats::default()),
                data_tx: Mutex::new(None),
                event_tx: Mutex::new(None),
                alive: AtomicBool::new(false),
            }),
            cmd_tx: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    /// 注册接收字节块的通道
    pub fn set_data_sender(&self, tx: Sender<Vec<u8>>) {
        *self.shared.data_tx.lock() = Some(tx);
    }

    /// 注册连接事件通道
    pub fn set_event_sender(&self, tx: Sender<TransportEvent>) {
        *self.shared.event_tx.lock() = Some(tx);
    }

    /// 打开串口并启动 IO 线程
    ///
    /// 已连接时直接返回成功。打开失败进入 `Error` 状态。
    pub fn connect(&self) -> Result<(), TransportError> {
        {
            let mut st = self.shared.state.lock();
            if *st == ConnectionState::Connected {
                return Ok(());
            }
            *st = ConnectionState::Connecting;
        }

        let config = &self.shared.config;
        let link = match self.shared.factory.open(&config.port, config.baud) {
            Ok(link) => link,
            Err(e) => {
                self.shared.set_state(ConnectionState::Error);
                error!(port = %config.port, error = %e, "serial open failed");
                return Err(e);
            },
        };

        let (tx, rx) = bounded(config.send_queue_capacity);
        self.shared.alive.store(true, Ordering::SeqCst);

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("evobot-serial-io".to_string())
            .spawn(move || io_loop(link, rx, shared))
            .map_err(|e| TransportError::Thread(e.to_string()))?;

        *self.cmd_tx.lock() = Some(tx);
        *self.worker.lock() = Some(handle);
        self.shared.set_state(ConnectionState::Connected);
        info!(port = %config.port, baud = config.baud, "serial connected");
        self.shared.publish(TransportEvent::Connected {
            port: config.port.clone(),
            baud: config.baud,
        });
        Ok(())
    }

    /// 停止 IO 线程并关闭串口
    pub fn disconnect(&self) {
        self.shared.alive.store(false, Ordering::SeqCst);
        *self.cmd_tx.lock() = None;
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
        if *self.shared.state.lock() != ConnectionState::Disconnected {
            self.shared.set_state(ConnectionState::Disconnected);
            self.shared.publish(TransportEvent::Disconnected {
                reason: "disconnect requested".to_string(),
            });
            info!("serial disconnected");
        }
    }

    /// 入队一帧待发送字节
    ///
    /// 未连接返回 [`TransportError::NotConnected`]；队列满返回
    /// [`TransportError::QueueFull`] 并计入 `send_errors`，绝不阻塞。
    pub fn send(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        if self.state() != ConnectionState::Connected {
            return Err(TransportError::NotConnected);
        }
        let guard = self.cmd_tx.lock();
        let tx = guard.as_ref().ok_or(TransportError::NotConnected)?;
        match tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.shared.stats.lock().send_errors += 1;
                warn!("send queue full, frame dropped");
                Err(TransportError::QueueFull)
            },
            Err(TrySendError::Disconnected(_)) => Err(TransportError::NotConnected),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn stats(&self) -> TransportStats {
        *self.shared.stats.lock()
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn io_loop(mut link: Box<dyn SerialLink>, cmd_rx: Receiver<Vec<u8>>, shared: Arc<Shared>) {
    let mut buf = vec![0u8; shared.config.read_chunk_size];

    while shared.alive.load(Ordering::SeqCst) {
        let mut io_failed = false;

        // 先排空发送队列
        loop {
            match cmd_rx.try_recv() {
                Ok(frame) => match link.write_all(&frame) {
                    Ok(()) => {
                        let mut stats = shared.stats.lock();
                        stats.bytes_sent += frame.len() as u64;
                        stats.frames_sent += 1;
                    },
                    Err(e) => {
                        warn!(error = %e, "serial write failed");
                        shared.stats.lock().send_errors += 1;
                        io_failed = true;
                        break;
                    },
                },
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return,
            }
        }

        if !io_failed {
            match link.read_chunk(&mut buf) {
                Ok(0) => thread::sleep(shared.config.idle_sleep),
                Ok(n) => {
                    shared.stats.lock().bytes_received += n as u64;
                    if let Some(tx) = shared.data_tx.lock().as_ref() {
                        let _ = tx.send(buf[..n].to_vec());
                    }
                },
                Err(e) => {
                    warn!(error = %e, "serial read failed");
                    shared.stats.lock().receive_errors += 1;
                    io_failed = true;
                },
            }
        }

        if io_failed {
            match reconnect(&shared) {
                Some(new_link) => link = new_link,
                None => return,
            }
        }
    }
}

/// 固定间隔重试打开链路，成功返回新链路，耗尽返回 `None` 并进入 `Error`
fn reconnect(shared: &Arc<Shared>) -> Option<Box<dyn SerialLink>> {
    shared.set_state(ConnectionState::Reconnecting);
    shared.publish(TransportEvent::Disconnected {
        reason: "io error".to_string(),
    });

    for attempt in 1..=shared.config.reconnect_attempts {
        if !shared.alive.load(Ordering::SeqCst) {
            return None;
        }
        shared.publish(TransportEvent::Reconnecting { attempt });
        info!(attempt, "attempting serial reconnect");
        thread::sleep(shared.config.reconnect_delay);

        match shared.factory.open(&shared.config.port, shared.config.baud) {
            Ok(link) => {
                shared.stats.lock().reconnects += 1;
                shared.set_state(ConnectionState::Connected);
                shared.publish(TransportEvent::Connected {
                    port: shared.config.port.clone(),
                    baud: shared.config.baud,
                });
                info!("serial reconnected");
                return Some(link);
            },
            Err(e) => warn!(attempt, error = %e, "reconnect attempt failed"),
        }
    }

    error!("reconnect attempts exhausted, transport entering error state");
    shared.set_state(ConnectionState::Error);
    shared.publish(TransportEvent::ReconnectFailed);
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockLinkFactory, MockPort};
    use crossbeam_channel::unbounded;

    fn test_config() -> SerialConfig {
        SerialConfig {
            port: "/dev/mock".to_string(),
            reconnect_delay: Duration::from_millis(20),
            idle_sleep: Duration::from_millis(1),
            ..SerialConfig::default()
        }
    }

    fn make_transport(config: SerialConfig) -> (SerialTransport, MockPort, Arc<MockLinkFactory>) {
        let port = MockPort::new();
        let factory = Arc::new(MockLinkFactory::new(port.clone()));
        let transport = SerialTransport::new(factory.clone(), config);
        (transport, port, factory)
    }

    fn wait_for(mut cond: impl FnMut() -> bool) {
        for _ in 0..400 {
            if cond() {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("condition not met within timeout");
    }

    #[test]
    fn test_connect_and_send() {
        let (transport, port, _) = make_transport(test_config());
        transport.connect().unwrap();
        assert_eq!(transport.state(), ConnectionState::Connected);

        transport.send(vec![0x01, 0x02, 0x03]).unwrap();
        wait_for(|| port.written() == vec![0x01, 0x02, 0x03]);

        let stats = transport.stats();
        assert_eq!(stats.bytes_sent, 3);
        assert_eq!(stats.frames_sent, 1);
    }

    #[test]
    fn test_send_when_disconnected_fails() {
        let (transport, _, _) = make_transport(test_config());
        assert!(matches!(
            transport.send(vec![0x01]),
            Err(TransportError::NotConnected)
        ));
    }

    #[test]
    fn test_connect_is_idempotent() {
        let (transport, _, factory) = make_transport(test_config());
        transport.connect().unwrap();
        transport.connect().unwrap();
        assert_eq!(factory.open_count(), 1);
    }

    #[test]
    fn test_open_failure_enters_error_state() {
        let (transport, _, factory) = make_transport(test_config());
        factory.fail_next_opens(1);
        assert!(transport.connect().is_err());
        assert_eq!(transport.state(), ConnectionState::Error);
    }

    #[test]
    fn test_incoming_bytes_forwarded() {
        let (transport, port, _) = make_transport(test_config());
        let (tx, rx) = unbounded();
        transport.set_data_sender(tx);
        transport.connect().unwrap();

        port.inject(&[0xFD, 0x01, 0x02, 0xF8]);

        let mut collected = Vec::new();
        while collected.len() < 4 {
            let chunk = rx.recv_timeout(Duration::from_secs(2)).unwrap();
            collected.extend(chunk);
        }
        assert_eq!(collected, vec![0xFD, 0x01, 0x02, 0xF8]);
        assert_eq!(transport.stats().bytes_received, 4);
    }

    #[test]
    fn test_queue_full_fails_fast() {
        let config = SerialConfig {
            send_queue_capacity: 1,
            ..test_config()
        };
        let (transport, port, _) = make_transport(config);
        port.set_write_delay(Duration::from_millis(50));
        transport.connect().unwrap();

        let mut full_errors = 0u64;
        for _ in 0..10 {
            if matches!(transport.send(vec![0xAA; 4]), Err(TransportError::QueueFull)) {
                full_errors += 1;
            }
        }
        assert!(full_errors > 0);
        assert!(transport.stats().send_errors >= full_errors);
    }

    #[test]
    fn test_reconnect_after_read_error() {
        let (transport, port, _) = make_transport(test_config());
        transport.connect().unwrap();

        port.fail_reads();
        wait_for(|| transport.state() != ConnectionState::Connected);
        port.clear_faults();

        wait_for(|| transport.state() == ConnectionState::Connected);
        assert!(transport.stats().reconnects >= 1);

        // 重连后的链路继续工作
        transport.send(vec![0x55]).unwrap();
        wait_for(|| port.written().contains(&0x55));
    }

    #[test]
    fn test_reconnect_exhaustion_enters_error() {
        let config = SerialConfig {
            reconnect_attempts: 2,
            reconnect_delay: Duration::from_millis(5),
            ..test_config()
        };
        let (transport, port, factory) = make_transport(config);
        let (tx, rx) = unbounded();
        transport.set_event_sender(tx);
        transport.connect().unwrap();

        factory.fail_next_opens(usize::MAX);
        port.fail_reads();

        wait_for(|| transport.state() == ConnectionState::Error);
        assert!(matches!(
            transport.send(vec![0x01]),
            Err(TransportError::NotConnected)
        ));

        let events: Vec<_> = rx.try_iter().collect();
        assert!(events.contains(&TransportEvent::ReconnectFailed));
    }

    #[test]
    fn test_disconnect_resets_state() {
        let (transport, port, _) = make_transport(test_config());
        transport.connect().unwrap();
        transport.send(vec![0x01]).unwrap();
        wait_for(|| !port.written().is_empty());

        transport.disconnect();
        assert_eq!(transport.state(), ConnectionState::Disconnected);
        assert!(matches!(
            transport.send(vec![0x02]),
            Err(TransportError::NotConnected)
        ));
    }
}
