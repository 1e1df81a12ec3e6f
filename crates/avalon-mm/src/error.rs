use thiserror::Error;

use crate::{BeatKind, ResponseCode, Signal, TimeoutPhase, TransactionId};

/// Error classes used for reporting policy decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ErrorClass {
    /// Invalid configuration or request, rejected before touching the bus.
    Usage,
    /// Response code or error expectation disagreed with the outcome.
    Protocol,
    /// Read data differed from the caller-supplied expectation.
    DataMismatch,
    /// No acceptance or response within the cycle budget.
    Timeout,
    /// Response arrived with nothing outstanding.
    ProtocolViolation,
    /// Transaction lost beats to [`crate::AvalonMaster::clear`].
    Cancelled,
}

impl ErrorClass {
    /// Classes that stop the session regardless of `exception_enabled`.
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::Timeout | Self::ProtocolViolation)
    }
}

/// Every failure reported by the Avalon-MM manager.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AvalonError {
    /// A required wire is not present in the bound signal set.
    #[error("required signal `{signal}` is not present on the bus")]
    MissingSignal {
        /// The absent wire.
        signal: Signal,
    },
    /// A wire has a width the protocol does not allow.
    #[error("signal `{signal}` is {width} bits wide, expected {expected}")]
    SignalWidth {
        /// Offending wire.
        signal: Signal,
        /// Width reported by the bus.
        width: u32,
        /// Human-readable width constraint.
        expected: &'static str,
    },
    /// `writedata`/`readdata` widths are unusable.
    #[error("unsupported data width: writedata {write_bits} bits, readdata {read_bits} bits")]
    DataWidth {
        /// Width of `writedata`.
        write_bits: u32,
        /// Width of `readdata`.
        read_bits: u32,
    },
    /// Request carried no data.
    #[error("transfer length must be non-zero (addr=0x{byte_address:08x})")]
    ZeroLength {
        /// Requested byte address.
        byte_address: u64,
    },
    /// Per-byte strobe pattern does not cover the payload exactly.
    #[error("strobe covers {strobe_len} bytes but the payload has {payload_len}")]
    StrobeLength {
        /// Number of entries in the strobe pattern.
        strobe_len: usize,
        /// Number of payload bytes.
        payload_len: usize,
    },
    /// Last word of the transfer does not fit the `address` wire.
    #[error(
        "address out of range: byte_addr=0x{byte_address:x}, length={length}, \
         word_addr=0x{word_address:x} needs more than {address_width} address bits"
    )]
    AddressOutOfRange {
        /// Requested byte address.
        byte_address: u64,
        /// Requested length in bytes.
        length: usize,
        /// First word address that does not fit, saturated on overflow.
        word_address: u64,
        /// Width of the `address` wire.
        address_width: u32,
    },
    /// A beat completed with a non-OKAY response that was not expected.
    #[error(
        "{kind}: unexpected error response {response} \
         (addr=0x{byte_address:08x}, word=0x{word_address:08x})"
    )]
    ResponseError {
        /// Direction of the failing beat.
        kind: BeatKind,
        /// Byte address of the owning transaction.
        byte_address: u64,
        /// Word address of the first failing beat.
        word_address: u64,
        /// Response code sampled with the beat.
        response: ResponseCode,
    },
    /// An error response was expected but every beat returned OKAY.
    #[error("{kind}: expected error but got OKAY response (addr=0x{byte_address:08x})")]
    ExpectedErrorMissing {
        /// Direction of the transaction.
        kind: BeatKind,
        /// Byte address of the transaction.
        byte_address: u64,
    },
    /// Read data differs from the expectation.
    #[error(
        "read at 0x{byte_address:08x}: expected 0x{} doesn't match returned 0x{}",
        hex_le(.expected),
        hex_le(.actual)
    )]
    DataMismatch {
        /// Byte address of the read.
        byte_address: u64,
        /// Expected bytes, little-endian.
        expected: Vec<u8>,
        /// Returned bytes, little-endian.
        actual: Vec<u8>,
    },
    /// Bus did not accept or answer a beat within the cycle budget.
    #[error(
        "{kind} {phase} timeout after {cycles} cycles \
         (addr=0x{byte_address:08x}, word=0x{word_address:08x})"
    )]
    Timeout {
        /// Direction of the stalled beat.
        kind: BeatKind,
        /// Handshake phase that stalled.
        phase: TimeoutPhase,
        /// Byte address of the owning transaction.
        byte_address: u64,
        /// Word address of the stalled beat.
        word_address: u64,
        /// Edges waited before giving up.
        cycles: u32,
    },
    /// Response strobe asserted with an empty outstanding queue.
    #[error("{kind} response valid with no outstanding {kind} beat at cycle {cycle}")]
    ProtocolViolation {
        /// Direction of the unmatched response.
        kind: BeatKind,
        /// Edge at which the response was observed.
        cycle: u64,
    },
    /// Handle does not name a live or completed transaction.
    #[error("unknown transaction {id}")]
    UnknownTransaction {
        /// The stale identifier.
        id: TransactionId,
    },
    /// Pending beats of the transaction were discarded.
    #[error("transaction {id} was cancelled before all beats were issued")]
    Cancelled {
        /// The cancelled transaction.
        id: TransactionId,
    },
}

impl AvalonError {
    /// Reporting class of this error.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::MissingSignal { .. }
            | Self::SignalWidth { .. }
            | Self::DataWidth { .. }
            | Self::ZeroLength { .. }
            | Self::StrobeLength { .. }
            | Self::AddressOutOfRange { .. }
            | Self::UnknownTransaction { .. } => ErrorClass::Usage,
            Self::ResponseError { .. } | Self::ExpectedErrorMissing { .. } => ErrorClass::Protocol,
            Self::DataMismatch { .. } => ErrorClass::DataMismatch,
            Self::Timeout { .. } => ErrorClass::Timeout,
            Self::ProtocolViolation { .. } => ErrorClass::ProtocolViolation,
            Self::Cancelled { .. } => ErrorClass::Cancelled,
        }
    }

    /// True when the session latches this error and stops advancing.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        self.class().is_fatal()
    }
}

/// Renders little-endian bytes as a big-endian hex integer.
pub(crate) fn hex_le(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "0".to_owned();
    }
    bytes.iter().rev().map(|byte| format!("{byte:02x}")).collect()
}
