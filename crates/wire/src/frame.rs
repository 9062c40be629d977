//! MUD-mode framing: a 4-byte big-endian length prefix followed by exactly
//! that many bytes of LPC-encoded value. The outermost value is always an
//! array (the packet).

use crate::error::{Result, WireError};
use crate::value::LpcValue;

pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Encode a complete outbound frame: length prefix + LPC array bytes.
pub fn encode_frame(array: &LpcValue) -> Vec<u8> {
    let body = array.encode();
    let mut out = Vec::with_capacity(4 + body.len());
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(&body);
    out
}

/// Buffers arbitrary byte slices from the socket and yields complete
/// frames as they become available. Partial frames are buffered across
/// `push` calls; the decoder never reads past the end of what's buffered.
pub struct FrameDecoder {
    buf: Vec<u8>,
    max_frame_bytes: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl FrameDecoder {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_frame_bytes,
        }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Try to decode the next complete frame out of the buffer. Returns
    /// `Ok(None)` when more bytes are needed (not an error — callers read
    /// more from the socket and call again). A `FrameTooLarge` or `BadPkt`
    /// error is fatal for the owning link.
    pub fn try_next(&mut self) -> Result<Option<LpcValue>> {
        if self.buf.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_be_bytes(self.buf[..4].try_into().expect("4 bytes")) as usize;
        if len > self.max_frame_bytes {
            return Err(WireError::FrameTooLarge {
                size: len,
                limit: self.max_frame_bytes,
            });
        }
        if self.buf.len() < 4 + len {
            return Ok(None);
        }

        let frame = &self.buf[4..4 + len];
        let (value, consumed) = LpcValue::decode(frame)?;
        if consumed != len {
            return Err(WireError::BadPkt(format!(
                "frame declared {len} bytes but decoded value used {consumed}"
            )));
        }
        if !matches!(value, LpcValue::Array(_)) {
            return Err(WireError::BadPkt("frame payload is not an array".into()));
        }

        self.buf.drain(..4 + len);
        Ok(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_array(tag: &str) -> LpcValue {
        LpcValue::Array(vec![LpcValue::Str(tag.into()), LpcValue::Int(1)])
    }

    #[test]
    fn single_frame_decodes() {
        let v = sample_array("tell");
        let bytes = encode_frame(&v);
        let mut dec = FrameDecoder::default();
        dec.push(&bytes);
        assert_eq!(dec.try_next().unwrap(), Some(v));
        assert_eq!(dec.try_next().unwrap(), None);
    }

    #[test]
    fn incomplete_frame_yields_none() {
        let v = sample_array("tell");
        let bytes = encode_frame(&v);
        let mut dec = FrameDecoder::default();
        dec.push(&bytes[..bytes.len() - 1]);
        assert_eq!(dec.try_next().unwrap(), None);
    }

    #[test]
    fn two_frames_concatenated_yield_both_in_order_with_arbitrary_slicing() {
        let v1 = sample_array("tell");
        let v2 = sample_array("emoteto");
        let mut all = encode_frame(&v1);
        all.extend_from_slice(&encode_frame(&v2));

        // Feed it back byte by byte to exercise arbitrary slicing.
        let mut dec = FrameDecoder::default();
        let mut out = Vec::new();
        for chunk in all.chunks(3) {
            dec.push(chunk);
            while let Some(v) = dec.try_next().unwrap() {
                out.push(v);
            }
        }
        assert_eq!(out, vec![v1, v2]);
        assert_eq!(dec.try_next().unwrap(), None);
        assert!(dec.buf.is_empty(), "no leftover bytes after full drain");
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let mut dec = FrameDecoder::new(8);
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&100u32.to_be_bytes());
        dec.push(&bytes);
        let err = dec.try_next().unwrap_err();
        assert!(matches!(err, WireError::FrameTooLarge { .. }));
    }
}
