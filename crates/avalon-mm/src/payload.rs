//! Caller-side data and strobe representations.

use crate::AvalonError;

/// Data supplied to a write or expected from a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Raw little-endian bytes; the transfer length is exactly `len()`.
    Bytes(Vec<u8>),
    /// Integer value; the transfer covers as many full bus words as the
    /// value's bit length needs, and at least one.
    Int(u128),
}

impl Payload {
    /// Little-endian bytes of the payload for a bus with `word_bytes` lanes.
    #[must_use]
    pub fn to_bytes(&self, word_bytes: usize) -> Vec<u8> {
        match self {
            Self::Bytes(bytes) => bytes.clone(),
            Self::Int(value) => {
                let bits = (u128::BITS - value.leading_zeros()) as usize;
                let words = bits.div_ceil(word_bytes * 8).max(1);
                let mut bytes = value.to_le_bytes().to_vec();
                bytes.resize(words * word_bytes, 0);
                bytes
            }
        }
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}

impl<const N: usize> From<[u8; N]> for Payload {
    fn from(bytes: [u8; N]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}

impl From<u128> for Payload {
    fn from(value: u128) -> Self {
        Self::Int(value)
    }
}

impl From<u64> for Payload {
    fn from(value: u64) -> Self {
        Self::Int(value.into())
    }
}

impl From<u32> for Payload {
    fn from(value: u32) -> Self {
        Self::Int(value.into())
    }
}

/// Byte-enable pattern requested for a write.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Strobe {
    /// Every byte of the payload is written.
    #[default]
    All,
    /// Lane mask applied to every beat; bit `n` enables byte lane `n`.
    Lanes(u128),
    /// One flag per payload byte, across the whole transfer.
    Bytes(Vec<bool>),
}

impl Strobe {
    /// Checks that a per-byte pattern matches the payload length.
    ///
    /// # Errors
    ///
    /// Returns [`AvalonError::StrobeLength`] when a [`Strobe::Bytes`] pattern
    /// does not have exactly one entry per payload byte.
    pub fn validate(&self, payload_len: usize) -> Result<(), AvalonError> {
        match self {
            Self::Bytes(flags) if flags.len() != payload_len => Err(AvalonError::StrobeLength {
                strobe_len: flags.len(),
                payload_len,
            }),
            _ => Ok(()),
        }
    }

    /// Lane mask for the byte at payload offset `offset` travelling in `lane`.
    #[must_use]
    pub fn lane_enabled(&self, offset: usize, lane: usize) -> bool {
        match self {
            Self::All => true,
            Self::Lanes(mask) => u32::try_from(lane)
                .ok()
                .and_then(|lane| mask.checked_shr(lane))
                .is_some_and(|bits| bits & 1 == 1),
            Self::Bytes(flags) => flags.get(offset).copied().unwrap_or(false),
        }
    }
}
