//! 字节流分帧器
//!
//! 串口接收线程读到的是任意切分的字节块，帧边界可能跨块。
//! 分帧器在内部累积字节，按帧头 0xFD / 帧尾 0xF8 切出完整帧。
//!
//! 转义机制保证 payload 内不会出现裸的 0xFD / 0xF8，因此
//! 直接按标记字节扫描是安全的。帧外的杂散字节被丢弃并计数。

use crate::constants::{FRAME_HEADER, FRAME_TAIL};

/// 增量分帧器
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buf: Vec<u8>,
    in_frame: bool,
    /// 帧外被丢弃的字节数（诊断用）
    discarded: u64,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 喂入一块原始字节，返回其中切出的完整帧（含帧头帧尾）
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();

        for &b in chunk {
            if !self.in_frame {
                if b == FRAME_HEADER {
                    self.in_frame = true;
                    self.buf.clear();
                    self.buf.push(b);
                } else {
                    self.discarded += 1;
                }
                continue;
            }

            // 帧内再次遇到帧头：前一帧不完整，丢弃重新同步
            if b == FRAME_HEADER {
                self.discarded += self.buf.len() as u64;
                self.buf.clear();
                self.buf.push(b);
                continue;
            }

            self.buf.push(b);
            if b == FRAME_TAIL {
                frames.push(std::mem::take(&mut self.buf));
                self.in_frame = false;
            }
        }

        frames
    }

    /// 帧外被丢弃的字节总数
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded
    }

    /// 清空内部状态（重连后调用）
    pub fn reset(&mut self) {
        self.buf.clear();
        self.in_frame = false;
    }
}
