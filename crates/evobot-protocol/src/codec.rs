//! 帧编解码器
//!
//! 处理转义和校验和，保证与现有硬件固件的线缆兼容性：
//!
//! ```text
//! [0xFD] [escaped(payload + checksum)] [0xF8]
//! ```
//!
//! - 校验和：payload 所有字节之和 mod 256，追加在 payload 末尾
//! - 转义：payload 中出现 {0xFD, 0xFE, 0xF8} 时替换为 `0xFE, (b & 0x0F) + 0x70`
//! - 反转义：`0xFE` 后的字节加 0x80 还原
//!
//! 编解码均为纯函数，解码失败返回错误而非部分结果。

use crate::ProtocolError;
use crate::constants::*;

/// 帧编解码器
pub struct FrameCodec;

impl FrameCodec {
    /// 编码完整帧
    ///
    /// 输入 payload（不含帧头/帧尾/校验和），输出可直接写入串口的完整帧。
    pub fn encode(payload: &[u8]) -> Vec<u8> {
        let checksum = Self::checksum(payload);

        // 预留：payload + 校验和 + 帧头帧尾，转义最多使长度翻倍
        let mut frame = Vec::with_capacity(payload.len() * 2 + 4);
        frame.push(FRAME_HEADER);

        for &b in payload.iter().chain(std::iter::once(&checksum)) {
            if ESCAPED_BYTES.contains(&b) {
                frame.push(ESCAPE_CHAR);
                frame.push((b & 0x0F) + 0x70);
            } else {
                frame.push(b);
            }
        }

        frame.push(FRAME_TAIL);
        frame
    }

    /// 解码完整帧
    ///
    /// 输入完整帧（含帧头帧尾），输出 payload（不含校验和）。
    /// 帧过短、缺少帧头帧尾或校验和不匹配时返回错误，绝不返回部分解码结果。
    pub fn decode(raw: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        if raw.len() < 3 {
            return Err(ProtocolError::FrameTooShort { len: raw.len() });
        }
        if raw[0] != FRAME_HEADER || raw[raw.len() - 1] != FRAME_TAIL {
            return Err(ProtocolError::MissingMarkers);
        }

        let body = &raw[1..raw.len() - 1];
        let mut unescaped = Vec::with_capacity(body.len());
        let mut i = 0;
        while i < body.len() {
            if body[i] == ESCAPE_CHAR && i + 1 < body.len() {
                unescaped.push(body[i + 1].wrapping_add(0x80));
                i += 2;
            } else {
                unescaped.push(body[i]);
                i += 1;
            }
        }

        if unescaped.len() < 3 {
            return Err(ProtocolError::FrameTooShort { len: unescaped.len() });
        }

        let (data, tail) = unescaped.split_at(unescaped.len() - 1);
        let received = tail[0];
        let calculated = Self::checksum(data);
        if received != calculated {
            return Err(ProtocolError::ChecksumMismatch { received, calculated });
        }

        Ok(data.to_vec())
    }

    /// 校验和：所有字节之和 mod 256
    pub fn checksum(data: &[u8]) -> u8 {
        data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_plain_payload() {
        let payload = [0x00, 0x05, 0x02, 0x01, 0x00, 0x72, 0x01];
        let frame = FrameCodec::encode(&payload);
        // 校验和 = 0x7B，无需转义
        assert_eq!(
            frame,
            vec![0xFD, 0x00, 0x05, 0x02, 0x01, 0x00, 0x72, 0x01, 0x7B, 0xF8]
        );
    }

    #[test]
    fn test_escape_header_byte_in_payload() {
        let payload = [0xFD, 0x00, 0x00];
        let frame = FrameCodec::encode(&payload);
        // 0xFD → 0xFE 0x7D；校验和 0xFD 也需要转义
        assert_eq!(frame[1], ESCAPE_CHAR);
        assert_eq!(frame[2], 0x7D);
        let decoded = FrameCodec::decode(&frame).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_escape_all_marker_bytes() {
        let payload = [0xFD, 0xFE, 0xF8, 0x01];
        let frame = FrameCodec::encode(&payload);
        let decoded = FrameCodec::decode(&frame).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_decode_too_short() {
        assert_eq!(
            FrameCodec::decode(&[0xFD, 0xF8]),
            Err(ProtocolError::FrameTooShort { len: 2 })
        );
    }

    #[test]
    fn test_decode_missing_markers() {
        assert_eq!(
            FrameCodec::decode(&[0x00, 0x01, 0x02, 0x03]),
            Err(ProtocolError::MissingMarkers)
        );
    }

    #[test]
    fn test_decode_checksum_mismatch() {
        let payload = [0x01, 0x02, 0x03];
        let mut frame = FrameCodec::encode(&payload);
        // 破坏校验和字节（帧尾前一个字节）
        let idx = frame.len() - 2;
        frame[idx] ^= 0x01;
        assert!(matches!(
            FrameCodec::decode(&frame),
            Err(ProtocolError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_roundtrip_basic() {
        let payload: Vec<u8> = (0u8..=60).collect();
        let frame = FrameCodec::encode(&payload);
        assert_eq!(FrameCodec::decode(&frame).unwrap(), payload);
    }

    #[test]
    fn test_checksum_wraps() {
        assert_eq!(FrameCodec::checksum(&[0xFF, 0x02]), 0x01);
    }
}
