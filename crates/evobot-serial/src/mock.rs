//! 测试用内存串口
//!
//! [`MockPort`] 是测试侧的控制句柄：注入"固件发来"的字节、检查
//! 上位机写出的字节、按需注入读写故障。同一个 `MockPort` 克隆后
//! 在工厂重开链路时仍指向同一份状态，可以模拟重连场景。

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::TransportError;
use crate::link::{LinkFactory, SerialLink};

#[derive(Default)]
struct MockState {
    incoming: VecDeque<u8>,
    written: Vec<u8>,
    fail_reads: bool,
    fail_writes: bool,
    write_delay: Option<Duration>,
}

/// 测试控制句柄
#[derive(Clone, Default)]
pub struct MockPort {
    state: Arc<Mutex<MockState>>,
}

impl MockPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注入固件侧发来的字节
    pub fn inject(&self, bytes: &[u8]) {
        self.state.lock().incoming.extend(bytes);
    }

    /// 上位机已写出的全部字节
    pub fn written(&self) -> Vec<u8> {
        self.state.lock().written.clone()
    }

    /// 取走已写出的字节并清空
    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut self.state.lock().written)
    }

    pub fn fail_reads(&self) {
        self.state.lock().fail_reads = true;
    }

    pub fn fail_writes(&self) {
        self.state.lock().fail_writes = true;
    }

    pub fn clear_faults(&self) {
        let mut st = self.state.lock();
        st.fail_reads = false;
        st.fail_writes = false;
    }

    /// 让每次写入阻塞一段时间，用于制造发送队列积压
    pub fn set_write_delay(&self, delay: Duration) {
        self.state.lock().write_delay = Some(delay);
    }
}

/// 内存链路
pub struct MockLink {
    port: MockPort,
}

impl MockLink {
    pub fn new(port: MockPort) -> Self {
        Self { port }
    }
}

impl SerialLink for MockLink {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let delay = self.port.state.lock().write_delay;
        if let Some(d) = delay {
            std::thread::sleep(d);
        }

        let mut st = self.port.state.lock();
        if st.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock write fault"));
        }
        st.written.extend_from_slice(data);
        Ok(())
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut st = self.port.state.lock();
        if st.fail_reads {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock read fault"));
        }
        let mut n = 0;
        while n < buf.len() {
            match st.incoming.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                },
                None => break,
            }
        }
        Ok(n)
    }
}

/// 内存链路工厂
///
/// `fail_next_opens` 可以让接下来的 N 次打开失败，用于测试重连耗尽。
pub struct MockLinkFactory {
    port: MockPort,
    fail_next: AtomicUsize,
    opens: AtomicUsize,
}

impl MockLinkFactory {
    pub fn new(port: MockPort) -> Self {
        Self {
            port,
            fail_next: AtomicUsize::new(0),
            opens: AtomicUsize::new(0),
        }
    }

    pub fn fail_next_opens(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// 累计打开次数（含失败）
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl LinkFactory for MockLinkFactory {
    fn open(&self, port: &str, _baud: u32) -> Result<Box<dyn SerialLink>, TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let should_fail = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(TransportError::Open {
                port: port.to_string(),
                message: "mock open fault".to_string(),
            });
        }
        Ok(Box::new(MockLink::new(self.port.clone())))
    }
}
