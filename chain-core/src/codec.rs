//! Deterministic binary encoding used both on the wire and as the
//! pre-image for hashing. Distinct from the `serde_json` config/debug
//! path: this one is hand-rolled because byte-exact output is the point,
//! and serde's map ordering is not a tool for that.

use crate::error::{CoreError, Result};

/// Implemented by every entity that has a canonical binary form.
/// `decode` returns the number of bytes consumed so a caller can decode a
/// sequence of entities back to back without a length prefix.
pub trait Codec: Sized {
    fn encode(&self) -> Vec<u8>;
    fn decode(bytes: &[u8]) -> Result<(Self, usize)>;
}

/// Width discriminants for [`encode_varuint`]/[`decode_varuint`]: the
/// narrowest of 1/2/4/6 bytes able to hold the value, tagged so decode can
/// recover the width deterministically.
const WIDTH_1: u8 = 0;
const WIDTH_2: u8 = 1;
const WIDTH_4: u8 = 2;
const WIDTH_6: u8 = 3;

/// Encodes `value` as a one-byte width tag followed by its little-endian
/// bytes at the narrowest fitting width (1, 2, 4, or 6 bytes).
#[must_use]
pub fn encode_varuint(value: u64) -> Vec<u8> {
    let le = value.to_le_bytes();
    if value <= u64::from(u8::MAX) {
        vec![WIDTH_1, le[0]]
    } else if value <= u64::from(u16::MAX) {
        let mut out = vec![WIDTH_2];
        out.extend_from_slice(&le[..2]);
        out
    } else if value <= u64::from(u32::MAX) {
        let mut out = vec![WIDTH_4];
        out.extend_from_slice(&le[..4]);
        out
    } else {
        let mut out = vec![WIDTH_6];
        out.extend_from_slice(&le[..6]);
        out
    }
}

/// Decodes a value written by [`encode_varuint`]. Returns the value and
/// the number of bytes consumed (including the width tag).
///
/// # Errors
///
/// Returns an error if `bytes` is too short or carries an unknown width tag.
pub fn decode_varuint(bytes: &[u8]) -> Result<(u64, usize)> {
    let tag = *bytes
        .first()
        .ok_or_else(|| CoreError::MalformedTransaction("empty varuint".into()))?;
    let width: usize = match tag {
        WIDTH_1 => 1,
        WIDTH_2 => 2,
        WIDTH_4 => 4,
        WIDTH_6 => 6,
        other => {
            return Err(CoreError::MalformedTransaction(format!(
                "unknown varuint width tag {other}"
            )))
        }
    };
    if bytes.len() < 1 + width {
        return Err(CoreError::MalformedTransaction("truncated varuint".into()));
    }
    let mut buf = [0u8; 8];
    buf[..width].copy_from_slice(&bytes[1..1 + width]);
    Ok((u64::from_le_bytes(buf), 1 + width))
}

/// Length-prefixes a byte blob with a varuint length, then the raw bytes.
#[must_use]
pub fn encode_bytes(data: &[u8]) -> Vec<u8> {
    let mut out = encode_varuint(data.len() as u64);
    out.extend_from_slice(data);
    out
}

/// Inverse of [`encode_bytes`].
///
/// # Errors
///
/// Returns an error if the length prefix or payload is truncated.
pub fn decode_bytes(bytes: &[u8]) -> Result<(Vec<u8>, usize)> {
    let (len, prefix_len) = decode_varuint(bytes)?;
    let len = len as usize;
    let end = prefix_len + len;
    if bytes.len() < end {
        return Err(CoreError::MalformedTransaction("truncated byte blob".into()));
    }
    Ok((bytes[prefix_len..end].to_vec(), end))
}
