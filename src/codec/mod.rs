//! Order-preserving sequence number codec.
//!
//! Change numbers are stored as keys whose byte order matches numeric order,
//! so an ordered store can answer "everything after change N" and "highest
//! change" with plain range iteration.
//!
//! Layout (before hex rendering):
//! - `n < 251`: a single byte `n`
//! - otherwise `x = n - 251` with a tag byte `251..=254` followed by 1-4
//!   big-endian bytes of `x`, or tag `255` followed by 8 big-endian bytes
//!
//! The bytes are rendered as lowercase hex, which keeps stored keys printable
//! without disturbing their order.

/// Smallest value that needs a tag byte.
const TAG_BASE: u64 = 251;
/// Tag for the full-width form.
const TAG_WIDE: u8 = 255;

/// Errors decoding a stored key back into a change number.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("Invalid hex in key: {0}")]
    InvalidHex(String),

    #[error("Empty key")]
    Empty,

    #[error("Key length mismatch: tag {tag} expects {expected} bytes, got {actual}")]
    Length {
        tag: u8,
        expected: usize,
        actual: usize,
    },

    #[error("Change number overflows u64")]
    Overflow,
}

/// Encode a change number into its order-preserving key.
pub fn encode(n: u64) -> Vec<u8> {
    hex::encode(pack(n)).into_bytes()
}

/// Decode a key produced by [`encode`].
pub fn decode(key: &[u8]) -> Result<u64, CodecError> {
    let raw = hex::decode(key).map_err(|e| CodecError::InvalidHex(e.to_string()))?;
    unpack(&raw)
}

fn pack(n: u64) -> Vec<u8> {
    if n < TAG_BASE {
        return vec![n as u8];
    }

    let x = n - TAG_BASE;
    let width = match x {
        0..=0xff => 1,
        0x100..=0xffff => 2,
        0x1_0000..=0xff_ffff => 3,
        0x100_0000..=0xffff_ffff => 4,
        _ => 8,
    };

    let mut out = Vec::with_capacity(width + 1);
    out.push(tag_for(width));
    out.extend_from_slice(&x.to_be_bytes()[8 - width..]);
    out
}

fn unpack(raw: &[u8]) -> Result<u64, CodecError> {
    let (&tag, rest) = raw.split_first().ok_or(CodecError::Empty)?;

    if u64::from(tag) < TAG_BASE {
        if !rest.is_empty() {
            return Err(CodecError::Length {
                tag,
                expected: 0,
                actual: rest.len(),
            });
        }
        return Ok(u64::from(tag));
    }

    let width = width_for(tag);
    if rest.len() != width {
        return Err(CodecError::Length {
            tag,
            expected: width,
            actual: rest.len(),
        });
    }

    let x = rest
        .iter()
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
    x.checked_add(TAG_BASE).ok_or(CodecError::Overflow)
}

fn tag_for(width: usize) -> u8 {
    match width {
        8 => TAG_WIDE,
        w => TAG_BASE as u8 + (w as u8 - 1),
    }
}

fn width_for(tag: u8) -> usize {
    match tag {
        TAG_WIDE => 8,
        t => usize::from(t - TAG_BASE as u8) + 1,
    }
}
