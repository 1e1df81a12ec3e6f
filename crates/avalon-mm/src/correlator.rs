//! Response correlator: per-kind FIFOs of accepted beats.

use std::collections::VecDeque;

use crate::{AvalonBus, AvalonError, BeatKind, BeatRef, BusGeometry, ResponseCode, Signal};

/// Manager inputs sampled at one rising edge.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EdgeSample {
    /// `waitrequest`, false when absent.
    pub wait_request: bool,
    /// `readdatavalid`, false when absent.
    pub read_data_valid: bool,
    /// `writeresponsevalid`, false when absent.
    pub write_response_valid: bool,
    /// `readdata`.
    pub read_data: Vec<u8>,
    /// `response`, `OKAY` when absent.
    pub response: ResponseCode,
}

impl EdgeSample {
    /// Samples every manager input.
    #[must_use]
    pub fn capture<B: AvalonBus + ?Sized>(bus: &B, geometry: &BusGeometry) -> Self {
        let read_data = bus.sample(Signal::ReadData);
        Self {
            wait_request: geometry.has_wait_request && bus.sample_bit(Signal::WaitRequest),
            read_data_valid: geometry.has_read_data_valid && bus.sample_bit(Signal::ReadDataValid),
            write_response_valid: geometry.has_write_response_valid
                && bus.sample_bit(Signal::WriteResponseValid),
            read_data,
            response: if geometry.has_response {
                ResponseCode::from_bits(bus.sample_u64(Signal::Response))
            } else {
                ResponseCode::Okay
            },
        }
    }

    /// Response strobe for `kind`.
    #[must_use]
    pub const fn valid(&self, kind: BeatKind) -> bool {
        match kind {
            BeatKind::Read => self.read_data_valid,
            BeatKind::Write => self.write_response_valid,
        }
    }
}

/// Accepted beats awaiting their response, oldest first, one FIFO per kind.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResponseCorrelator {
    reads: VecDeque<BeatRef>,
    writes: VecDeque<BeatRef>,
}

impl ResponseCorrelator {
    /// Creates empty FIFOs.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            reads: VecDeque::new(),
            writes: VecDeque::new(),
        }
    }

    const fn fifo(&self, kind: BeatKind) -> &VecDeque<BeatRef> {
        match kind {
            BeatKind::Read => &self.reads,
            BeatKind::Write => &self.writes,
        }
    }

    fn fifo_mut(&mut self, kind: BeatKind) -> &mut VecDeque<BeatRef> {
        match kind {
            BeatKind::Read => &mut self.reads,
            BeatKind::Write => &mut self.writes,
        }
    }

    /// True when beats of `kind` wait for a response strobe on the bus.
    ///
    /// Without the strobe wire a beat completes at its acceptance edge.
    #[must_use]
    pub const fn tracks(kind: BeatKind, geometry: &BusGeometry) -> bool {
        match kind {
            BeatKind::Read => geometry.has_read_data_valid,
            BeatKind::Write => geometry.has_write_response_valid,
        }
    }

    /// Appends an accepted beat to its kind's FIFO.
    pub fn push(&mut self, kind: BeatKind, beat: BeatRef) {
        self.fifo_mut(kind).push_back(beat);
    }

    /// Beats of `kind` awaiting a response.
    #[must_use]
    pub fn outstanding(&self, kind: BeatKind) -> usize {
        self.fifo(kind).len()
    }

    /// Beats of either kind awaiting a response.
    #[must_use]
    pub fn total(&self) -> usize {
        self.reads.len() + self.writes.len()
    }

    /// Every outstanding beat, reads first, each FIFO oldest first.
    pub fn iter(&self) -> impl Iterator<Item = BeatRef> + '_ {
        self.reads.iter().chain(self.writes.iter()).copied()
    }

    /// Matches the response strobes of one edge to the oldest beats.
    ///
    /// At most one beat of each kind completes per edge.
    ///
    /// # Errors
    ///
    /// Returns [`AvalonError::ProtocolViolation`] when a strobe is asserted
    /// with nothing of that kind outstanding.
    pub fn correlate(
        &mut self,
        sample: &EdgeSample,
        cycle: u64,
    ) -> Result<Vec<(BeatKind, BeatRef)>, AvalonError> {
        let mut matched = Vec::new();
        for kind in [BeatKind::Read, BeatKind::Write] {
            if !sample.valid(kind) {
                continue;
            }
            let beat = self
                .fifo_mut(kind)
                .pop_front()
                .ok_or(AvalonError::ProtocolViolation { kind, cycle })?;
            matched.push((kind, beat));
        }
        Ok(matched)
    }
}
