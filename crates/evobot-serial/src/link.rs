//! 串口链路抽象
//!
//! `SerialLink` 是传输层唯一接触硬件的缝隙：真实实现包装 `serialport`
//! 的阻塞句柄，测试实现见 [`crate::mock`]。工厂 trait 让重连逻辑
//! 可以在不持有具体类型的情况下重新打开链路。

use std::io;
use std::time::Duration;

use crate::TransportError;

/// 读超时：短超时把阻塞读变成轮询，IO 线程才能及时处理发送队列
const READ_TIMEOUT: Duration = Duration::from_millis(10);

/// 字节链路
pub trait SerialLink: Send {
    /// 写出全部字节并刷新
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// 读取当前可用的字节，超时无数据返回 `Ok(0)`
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// 链路工厂，重连时按相同参数重新打开
pub trait LinkFactory: Send + Sync {
    fn open(&self, port: &str, baud: u32) -> Result<Box<dyn SerialLink>, TransportError>;
}

/// 基于 `serialport` 的真实串口链路
///
/// 固件侧固定 1 Mbaud 8N1。
pub struct SystemSerialLink {
    port: Box<dyn serialport::SerialPort>,
}

impl SystemSerialLink {
    pub fn open(port_name: &str, baud: u32) -> Result<Self, TransportError> {
        let port = serialport::new(port_name, baud)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| TransportError::Open {
                port: port_name.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self { port })
    }
}

impl SerialLink for SystemSerialLink {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.port.write_all(data)?;
        self.port.flush()
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }
}

/// 默认工厂
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLinkFactory;

impl LinkFactory for SystemLinkFactory {
    fn open(&self, port: &str, baud: u32) -> Result<Box<dyn SerialLink>, TransportError> {
        Ok(Box::new(SystemSerialLink::open(port, baud)?))
    }
}
