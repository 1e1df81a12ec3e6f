//! Bus-width transfers and their lifecycle.

use crate::{BeatLayout, ResponseCode, TransactionId};

/// Direction of a beat or transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum BeatKind {
    /// Driven on `read`, answered on `readdatavalid`.
    Read,
    /// Driven on `write`, answered on `writeresponsevalid`.
    Write,
}

impl std::fmt::Display for BeatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Read => "read",
            Self::Write => "write",
        })
    }
}

/// How a beat finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BeatOutcome {
    /// Response arrived with the given code.
    Responded(ResponseCode),
    /// No acceptance or response within the cycle budget.
    TimedOut,
    /// Discarded from the pending queue before it was driven.
    Discarded,
}

impl BeatOutcome {
    /// True for any outcome other than an `OKAY` response.
    #[must_use]
    pub const fn is_error(self) -> bool {
        match self {
            Self::Responded(code) => code.is_error(),
            Self::TimedOut | Self::Discarded => true,
        }
    }
}

/// Lifecycle of a beat.
///
/// `Pending -> Issued -> Completed`, each transition exactly once. Discarded
/// beats go straight from `Pending` to `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BeatStatus {
    /// Queued, or on the wires but not yet accepted.
    Pending,
    /// Accepted by the responder, awaiting its response.
    Issued {
        /// Edges left before the response timeout fires, `None` when disabled.
        remaining: Option<u32>,
    },
    /// Finished.
    Completed(BeatOutcome),
}

/// Stable reference to a beat: owning transaction plus position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BeatRef {
    /// Owning transaction.
    pub transaction: TransactionId,
    /// Index within the transaction's beats, in address order.
    pub index: usize,
}

/// One bus-width transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Beat {
    /// Direction.
    pub kind: BeatKind,
    /// Lane placement and word address.
    pub layout: BeatLayout,
    /// Byte-enable driven with the beat.
    pub byte_enable: u128,
    /// Full bus word driven on `writedata` (writes only).
    pub write_data: Option<Vec<u8>>,
    /// Full bus word sampled from `readdata` (reads, once completed).
    pub read_data: Option<Vec<u8>>,
    /// Error expectation inherited from the owning transaction.
    pub error_expected: bool,
    /// Lifecycle state.
    pub status: BeatStatus,
}

impl Beat {
    /// Creates a pending beat.
    #[must_use]
    pub fn new(
        kind: BeatKind,
        layout: BeatLayout,
        byte_enable: u128,
        write_data: Option<Vec<u8>>,
        error_expected: bool,
    ) -> Self {
        Self {
            kind,
            layout,
            byte_enable,
            write_data,
            read_data: None,
            error_expected,
            status: BeatStatus::Pending,
        }
    }

    /// Word address of the beat.
    #[must_use]
    pub const fn word_address(&self) -> u64 {
        self.layout.word_address
    }

    /// Marks the beat accepted by the responder.
    pub fn issue(&mut self, remaining: Option<u32>) {
        debug_assert_eq!(self.status, BeatStatus::Pending, "beat issued twice");
        self.status = BeatStatus::Issued { remaining };
    }

    /// Marks the beat finished.
    pub fn complete(&mut self, outcome: BeatOutcome) {
        debug_assert!(!self.is_completed(), "beat completed twice");
        self.status = BeatStatus::Completed(outcome);
    }

    /// True once the beat has finished.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self.status, BeatStatus::Completed(_))
    }

    /// Outcome, once completed.
    #[must_use]
    pub const fn outcome(&self) -> Option<BeatOutcome> {
        match self.status {
            BeatStatus::Completed(outcome) => Some(outcome),
            BeatStatus::Pending | BeatStatus::Issued { .. } => None,
        }
    }
}
