//! EvoBot RS-485 串口传输层
//!
//! 职责划分：
//!
//! - [`link`]：串口链路抽象（`SerialLink` trait），真实实现基于 `serialport`，
//!   测试用 [`mock`] 模块提供内存链路
//! - [`SerialTransport`]：连接状态机 + IO 工作线程 + 自动重连
//!
//! 传输层只搬运字节，不理解帧格式。分帧与编解码在 `evobot-protocol`。
//! 上层通过 crossbeam 通道拿到接收字节块和连接事件，发送走有界队列，
//! 队列满时立即失败而不是阻塞控制线程。

pub mod link;
pub mod mock;
mod transport;

pub use link::{LinkFactory, SerialLink, SystemLinkFactory, SystemSerialLink};
pub use transport::{
    ConnectionState, SerialConfig, SerialTransport, TransportEvent, TransportStats,
};

use thiserror::Error;

/// 传输层错误
#[derive(Debug, Error)]
pub enum TransportError {
    /// 打开串口失败
    #[error("Failed to open serial port {port}: {message}")]
    Open { port: String, message: String },

    /// 未连接时调用了需要连接的操作
    #[error("Transport is not connected")]
    NotConnected,

    /// 发送队列已满（立即失败，不阻塞调用线程）
    #[error("Send queue is full, frame dropped")]
    QueueFull,

    /// IO 线程启动失败
    #[error("Failed to spawn IO thread: {0}")]
    Thread(String),
}
