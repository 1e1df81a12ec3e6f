//! Avalon-MM manager transaction engine.
//!
//! Turns byte-addressed reads and writes of any length into word-addressed
//! bus beats, drives them against `waitrequest`, matches responses in issue
//! order and reports per-transaction outcomes through an exception-or-flag
//! policy. Simulated time is supplied by the caller through [`Clock`].

/// Signal-level boundary: wires, bus access and clock traits.
pub mod signal;
pub use signal::{
    lane_mask, AvalonBus, BusGeometry, Clock, Signal, SignalBank, MAX_ADDRESS_WIDTH_BITS,
    MAX_DATA_WIDTH_BITS, SIGNAL_COUNT,
};

/// Two-bit response status decoding.
pub mod response;
pub use response::ResponseCode;

/// Error taxonomy and fatal classification.
pub mod error;
pub use error::{AvalonError, ErrorClass};

/// Caller payloads and write strobes.
pub mod payload;
pub use payload::{Payload, Strobe};

/// Byte-range to bus-beat splitting.
pub mod split;
pub use split::{beat_count, split_beats, BeatLayout};

/// Beat model and lifecycle.
pub mod beat;
pub use beat::{Beat, BeatKind, BeatOutcome, BeatRef, BeatStatus};

/// Cycle budgets for acceptance and response waits.
pub mod timeout;
pub use timeout::{TimeoutMonitor, TimeoutPhase};

/// Request arm and pending queue.
pub mod driver;
pub use driver::{ArmEvent, ArmState, IssuePolicy, RequestDriver};

/// Response matching against outstanding beats.
pub mod correlator;
pub use correlator::{EdgeSample, ResponseCorrelator};

/// Caller-level transactions and the reporting policy.
pub mod transaction;
pub use transaction::{
    Completion, PolicyDecision, ReadRequest, Transaction, TransactionHandle, TransactionId,
    WriteRequest,
};

/// Session configuration.
pub mod config;
pub use config::{MasterConfig, DEFAULT_TIMEOUT_CYCLES};

/// Manager session driving one interface.
pub mod master;
pub use master::AvalonMaster;

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
