//! LPC value encoding: one type tag byte followed by payload.
//!
//! Tag table (pinned per the external wire contract, not re-derived):
//! `0=null`, `1=string`, `2=integer`, `3=float`, `4=array`, `5=mapping`,
//! `6=buffer`. Lengths and counts are 4-byte big-endian; integers are
//! 8-byte big-endian two's complement; floats are 8-byte big-endian
//! IEEE-754.

use crate::error::{Result, WireError};

pub const TAG_NULL: u8 = 0;
pub const TAG_STRING: u8 = 1;
pub const TAG_INTEGER: u8 = 2;
pub const TAG_FLOAT: u8 = 3;
pub const TAG_ARRAY: u8 = 4;
pub const TAG_MAPPING: u8 = 5;
pub const TAG_BUFFER: u8 = 6;

#[derive(Debug, Clone, PartialEq)]
pub enum LpcValue {
    Null,
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<LpcValue>),
    /// Key/value pairs in encounter order — LPC mappings have no
    /// canonical ordering, so round-tripping preserves insertion order
    /// rather than sorting.
    Map(Vec<(LpcValue, LpcValue)>),
    Buffer(Vec<u8>),
}

impl LpcValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            LpcValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            LpcValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[LpcValue]> {
        match self {
            LpcValue::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(LpcValue, LpcValue)]> {
        match self {
            LpcValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Protocol-level nullable-string convention: `0` and `""` both mean
    /// "absent" at field positions the protocol defines as nullable. The
    /// codec itself keeps them distinct (round-trip law); this helper is
    /// for the packet factory layer, not the codec.
    pub fn as_nullable_str(&self) -> Option<Option<&str>> {
        match self {
            LpcValue::Int(0) => Some(None),
            LpcValue::Str(s) => Some(Some(s.as_str())),
            _ => None,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf);
        buf
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            LpcValue::Null => buf.push(TAG_NULL),
            LpcValue::Str(s) => {
                buf.push(TAG_STRING);
                let bytes = s.as_bytes();
                buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
                buf.extend_from_slice(bytes);
            }
            LpcValue::Int(i) => {
                buf.push(TAG_INTEGER);
                buf.extend_from_slice(&i.to_be_bytes());
            }
            LpcValue::Float(f) => {
                buf.push(TAG_FLOAT);
                buf.extend_from_slice(&f.to_be_bytes());
            }
            LpcValue::Array(items) => {
                buf.push(TAG_ARRAY);
                buf.extend_from_slice(&(items.len() as u32).to_be_bytes());
                for item in items {
                    item.encode_into(buf);
                }
            }
            LpcValue::Map(pairs) => {
                buf.push(TAG_MAPPING);
                buf.extend_from_slice(&(pairs.len() as u32).to_be_bytes());
                for (k, v) in pairs {
                    k.encode_into(buf);
                    v.encode_into(buf);
                }
            }
            LpcValue::Buffer(bytes) => {
                buf.push(TAG_BUFFER);
                buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
                buf.extend_from_slice(bytes);
            }
        }
    }

    /// Decode one value from the front of `bytes`, returning the value and
    /// the number of bytes consumed. Returns `ShortRead` (not a hard
    /// error) when `bytes` doesn't yet hold a complete value — callers
    /// buffer and retry.
    pub fn decode(bytes: &[u8]) -> Result<(LpcValue, usize)> {
        let tag = *bytes.first().ok_or(WireError::ShortRead {
            needed: 1,
            available: bytes.len(),
        })?;
        let rest = &bytes[1..];
        match tag {
            TAG_NULL => Ok((LpcValue::Null, 1)),
            TAG_STRING => {
                let (len, body) = read_len(rest)?;
                let s = std::str::from_utf8(body)
                    .map_err(|e| WireError::BadPkt(format!("invalid utf-8 string: {e}")))?
                    .to_string();
                Ok((LpcValue::Str(s), 1 + 4 + len))
            }
            TAG_INTEGER => {
                let arr: [u8; 8] = rest
                    .get(..8)
                    .ok_or(WireError::ShortRead {
                        needed: 8,
                        available: rest.len(),
                    })?
                    .try_into()
                    .expect("slice of len 8");
                Ok((LpcValue::Int(i64::from_be_bytes(arr)), 1 + 8))
            }
            TAG_FLOAT => {
                let arr: [u8; 8] = rest
                    .get(..8)
                    .ok_or(WireError::ShortRead {
                        needed: 8,
                        available: rest.len(),
                    })?
                    .try_into()
                    .expect("slice of len 8");
                Ok((LpcValue::Float(f64::from_be_bytes(arr)), 1 + 8))
            }
            TAG_ARRAY => {
                let (count, mut body) = read_count(rest)?;
                let mut consumed = 1 + 4;
                let mut items = Vec::with_capacity(count.min(4096));
                for _ in 0..count {
                    let (item, n) = LpcValue::decode(body)?;
                    consumed += n;
                    body = &body[n..];
                    items.push(item);
                }
                Ok((LpcValue::Array(items), consumed))
            }
            TAG_MAPPING => {
                let (count, mut body) = read_count(rest)?;
                let mut consumed = 1 + 4;
                let mut pairs = Vec::with_capacity(count.min(4096));
                for _ in 0..count {
                    let (k, nk) = LpcValue::decode(body)?;
                    consumed += nk;
                    body = &body[nk..];
                    let (v, nv) = LpcValue::decode(body)?;
                    consumed += nv;
                    body = &body[nv..];
                    pairs.push((k, v));
                }
                Ok((LpcValue::Map(pairs), consumed))
            }
            TAG_BUFFER => {
                let (len, body) = read_len(rest)?;
                Ok((LpcValue::Buffer(body.to_vec()), 1 + 4 + len))
            }
            other => Err(WireError::BadTag(other)),
        }
    }
}

fn read_len(rest: &[u8]) -> Result<(usize, &[u8])> {
    let (count, body) = read_count(rest)?;
    let body = body.get(..count).ok_or(WireError::ShortRead {
        needed: count,
        available: body.len(),
    })?;
    Ok((count, body))
}

fn read_count(rest: &[u8]) -> Result<(usize, &[u8])> {
    let arr: [u8; 4] = rest
        .get(..4)
        .ok_or(WireError::ShortRead {
            needed: 4,
            available: rest.len(),
        })?
        .try_into()
        .expect("slice of len 4");
    let count = u32::from_be_bytes(arr) as usize;
    Ok((count, &rest[4..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(v: LpcValue) {
        let bytes = v.encode();
        let (decoded, consumed) = LpcValue::decode(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded, v);
    }

    #[test]
    fn null_roundtrips() {
        roundtrip(LpcValue::Null);
    }

    #[test]
    fn empty_string_and_zero_are_distinct() {
        let empty = LpcValue::Str(String::new());
        let zero = LpcValue::Int(0);
        assert_ne!(empty.encode(), zero.encode());
        roundtrip(empty);
        roundtrip(zero);
    }

    #[test]
    fn string_roundtrips() {
        roundtrip(LpcValue::Str("hello intermud".into()));
    }

    #[test]
    fn negative_integer_roundtrips() {
        roundtrip(LpcValue::Int(-1));
        roundtrip(LpcValue::Int(i64::MIN));
        roundtrip(LpcValue::Int(i64::MAX));
    }

    #[test]
    fn float_roundtrips() {
        roundtrip(LpcValue::Float(3.5));
        roundtrip(LpcValue::Float(-0.0));
    }

    #[test]
    fn nested_array_roundtrips() {
        roundtrip(LpcValue::Array(vec![
            LpcValue::Str("tell".into()),
            LpcValue::Int(0),
            LpcValue::Array(vec![LpcValue::Null, LpcValue::Int(42)]),
        ]));
    }

    #[test]
    fn mapping_roundtrips() {
        roundtrip(LpcValue::Map(vec![
            (LpcValue::Str("a".into()), LpcValue::Int(1)),
            (LpcValue::Str("b".into()), LpcValue::Int(0)),
        ]));
    }

    #[test]
    fn buffer_roundtrips() {
        roundtrip(LpcValue::Buffer(vec![0, 1, 2, 255]));
    }

    #[test]
    fn truncated_string_is_short_read() {
        let mut bytes = LpcValue::Str("hello".into()).encode();
        bytes.truncate(bytes.len() - 2);
        let err = LpcValue::decode(&bytes).unwrap_err();
        assert!(matches!(err, WireError::ShortRead { .. }));
    }

    #[test]
    fn unknown_tag_is_bad_tag() {
        let err = LpcValue::decode(&[0xff]).unwrap_err();
        assert_eq!(err, WireError::BadTag(0xff));
    }
}
