//! Beat splitter: byte-addressed requests to word-addressed bus beats.
//!
//! A request `[A, A+L)` on a bus with `Wb` byte lanes becomes
//! `ceil((A mod Wb + L) / Wb)` beats at consecutive word addresses starting at
//! `A div Wb`. The first and last beat may be partial; their byte-enable masks
//! cover exactly the requested lanes and the word address is never shifted
//! fractionally.

use crate::{lane_mask, AvalonError, Strobe};

/// Placement of one beat within the bus word and the caller payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BeatLayout {
    /// Word address of the beat.
    pub word_address: u64,
    /// Lanes of the word covered by the request.
    pub byte_enable: u128,
    /// First covered lane.
    pub first_lane: usize,
    /// Number of covered lanes.
    pub lanes: usize,
    /// Payload offset of the byte carried in `first_lane`.
    pub payload_offset: usize,
}

impl BeatLayout {
    /// Builds the full bus word for a write beat, with uncovered lanes zero.
    #[must_use]
    pub fn pack(&self, payload: &[u8], word_bytes: usize) -> Vec<u8> {
        let mut word = vec![0; word_bytes];
        let source = &payload[self.payload_offset..self.payload_offset + self.lanes];
        word[self.first_lane..self.first_lane + self.lanes].copy_from_slice(source);
        word
    }

    /// Copies the covered lanes of a returned bus word into `out`.
    ///
    /// Lanes missing from a short `word` leave `out` untouched.
    pub fn unpack(&self, word: &[u8], out: &mut [u8]) {
        for lane in 0..self.lanes {
            if let Some(byte) = word.get(self.first_lane + lane) {
                out[self.payload_offset + lane] = *byte;
            }
        }
    }

    /// Byte-enable mask after applying a write strobe pattern.
    #[must_use]
    pub fn strobed_enable(&self, strobe: &Strobe) -> u128 {
        (0..self.lanes)
            .filter(|lane| strobe.lane_enabled(self.payload_offset + lane, self.first_lane + lane))
            .fold(0, |mask, lane| mask | lane_mask(lane_index(self.first_lane + lane), 1))
    }
}

fn lane_index(lane: usize) -> u32 {
    u32::try_from(lane).unwrap_or(u32::MAX)
}

/// Number of beats needed for `length` bytes starting at `byte_address`.
#[must_use]
pub const fn beat_count(byte_address: u64, length: usize, word_bytes: usize) -> usize {
    let first_lane = (byte_address % word_bytes as u64) as usize;
    first_lane.saturating_add(length).div_ceil(word_bytes)
}

/// Splits a byte-addressed request into ordered bus beats.
///
/// # Errors
///
/// Returns [`AvalonError::ZeroLength`] for an empty request and
/// [`AvalonError::AddressOutOfRange`] when the last word address exceeds
/// `max_word_address`.
pub fn split_beats(
    byte_address: u64,
    length: usize,
    word_bytes: usize,
    max_word_address: u64,
) -> Result<Vec<BeatLayout>, AvalonError> {
    if length == 0 {
        return Err(AvalonError::ZeroLength { byte_address });
    }
    let wide = word_bytes as u64;
    let first_word = byte_address / wide;
    let first_lane = (byte_address % wide) as usize;
    let out_of_range = |word_address| AvalonError::AddressOutOfRange {
        byte_address,
        length,
        word_address,
        address_width: u64::BITS - max_word_address.leading_zeros(),
    };
    let end = first_lane
        .checked_add(length)
        .ok_or_else(|| out_of_range(u64::MAX))?;
    let count = end.div_ceil(word_bytes);

    let last_word = u64::try_from(count - 1)
        .ok()
        .and_then(|extra| first_word.checked_add(extra));
    match last_word {
        Some(last) if last <= max_word_address => {}
        _ => return Err(out_of_range(last_word.unwrap_or(u64::MAX))),
    }

    let beats = (0..count)
        .map(|index| {
            let word_start = index * word_bytes;
            let lane_start = first_lane.saturating_sub(word_start);
            let lane_end = (end - word_start).min(word_bytes);
            let lanes = lane_end - lane_start;
            BeatLayout {
                word_address: first_word + index as u64,
                byte_enable: lane_mask(lane_index(lane_start), lane_index(lanes)),
                first_lane: lane_start,
                lanes,
                payload_offset: word_start + lane_start - first_lane,
            }
        })
        .collect();
    Ok(beats)
}
