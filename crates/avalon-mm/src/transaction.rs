//! Caller-level transactions: request validation, beat ownership, read data
//! reassembly and the exception-vs-flag reporting policy.

use crate::{
    split_beats, AvalonError, Beat, BeatKind, BeatOutcome, BusGeometry, Payload, ResponseCode,
    Strobe,
};

/// Session-unique transaction identifier, increasing in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(u64);

impl TransactionId {
    /// Wraps a raw identifier.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw identifier value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Ticket returned by non-blocking submissions, redeemed with
/// [`crate::AvalonMaster::join`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[must_use = "a handle is the only way to collect the transaction's result"]
pub struct TransactionHandle {
    id: TransactionId,
    kind: BeatKind,
}

impl TransactionHandle {
    pub(crate) const fn new(id: TransactionId, kind: BeatKind) -> Self {
        Self { id, kind }
    }

    /// Identifier of the transaction.
    #[must_use]
    pub const fn id(self) -> TransactionId {
        self.id
    }

    /// Direction of the transaction.
    #[must_use]
    pub const fn kind(self) -> BeatKind {
        self.kind
    }
}

/// Write request addressed in bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    /// Byte address of the first payload byte.
    pub address: u64,
    /// Data to write.
    pub data: Payload,
    /// Byte-enable pattern, all bytes by default.
    pub strobe: Strobe,
    /// The responder is expected to answer with an error.
    pub error_expected: bool,
}

impl WriteRequest {
    /// Writes `data` at byte address `address` with every byte enabled.
    pub fn new(address: u64, data: impl Into<Payload>) -> Self {
        Self {
            address,
            data: data.into(),
            strobe: Strobe::All,
            error_expected: false,
        }
    }

    /// Restricts the written bytes.
    #[must_use]
    pub fn with_strobe(mut self, strobe: Strobe) -> Self {
        self.strobe = strobe;
        self
    }

    /// Expects the responder to reject the write.
    #[must_use]
    pub const fn expect_error(mut self) -> Self {
        self.error_expected = true;
        self
    }
}

/// Read request addressed in bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    /// Byte address of the first byte read.
    pub address: u64,
    /// Bytes to read; one bus word when unset. Ignored when `expected` is set.
    pub length: Option<usize>,
    /// Data the read must return; also fixes the read length.
    pub expected: Option<Payload>,
    /// The responder is expected to answer with an error.
    pub error_expected: bool,
}

impl ReadRequest {
    /// Reads one bus word at byte address `address`.
    #[must_use]
    pub const fn new(address: u64) -> Self {
        Self {
            address,
            length: None,
            expected: None,
            error_expected: false,
        }
    }

    /// Reads `length` bytes.
    #[must_use]
    pub const fn with_length(mut self, length: usize) -> Self {
        self.length = Some(length);
        self
    }

    /// Verifies the returned data against `expected`.
    #[must_use]
    pub fn with_expected(mut self, expected: impl Into<Payload>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    /// Expects the responder to reject the read.
    #[must_use]
    pub const fn expect_error(mut self) -> Self {
        self.error_expected = true;
        self
    }
}

/// One caller-visible read or write and the beats it owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Identifier.
    pub id: TransactionId,
    /// Direction.
    pub kind: BeatKind,
    /// Byte address of the first byte.
    pub byte_address: u64,
    /// Transfer length in bytes.
    pub length: usize,
    /// Child beats in increasing address order.
    pub beats: Vec<Beat>,
    /// The responder is expected to answer with an error.
    pub error_expected: bool,
    /// Data a read must return.
    pub expected_data: Option<Vec<u8>>,
    remaining: usize,
    cancelled: bool,
}

impl Transaction {
    /// Builds a write transaction and its beats.
    ///
    /// # Errors
    ///
    /// Returns [`AvalonError::StrobeLength`], [`AvalonError::ZeroLength`] or
    /// [`AvalonError::AddressOutOfRange`] for requests the bus cannot carry.
    pub fn write(
        id: TransactionId,
        request: &WriteRequest,
        geometry: &BusGeometry,
    ) -> Result<Self, AvalonError> {
        let word_bytes = geometry.word_bytes();
        let payload = request.data.to_bytes(word_bytes);
        request.strobe.validate(payload.len())?;
        let layouts = split_beats(
            request.address,
            payload.len(),
            word_bytes,
            geometry.max_word_address(),
        )?;
        let beats = layouts
            .into_iter()
            .map(|layout| {
                Beat::new(
                    BeatKind::Write,
                    layout,
                    layout.strobed_enable(&request.strobe),
                    Some(layout.pack(&payload, word_bytes)),
                    request.error_expected,
                )
            })
            .collect();
        Ok(Self::with_beats(
            id,
            BeatKind::Write,
            request.address,
            payload.len(),
            beats,
            request.error_expected,
            None,
        ))
    }

    /// Builds a read transaction and its beats.
    ///
    /// # Errors
    ///
    /// Returns [`AvalonError::ZeroLength`] or [`AvalonError::AddressOutOfRange`]
    /// for requests the bus cannot carry.
    pub fn read(
        id: TransactionId,
        request: &ReadRequest,
        geometry: &BusGeometry,
    ) -> Result<Self, AvalonError> {
        let word_bytes = geometry.word_bytes();
        let expected = request
            .expected
            .as_ref()
            .map(|payload| payload.to_bytes(word_bytes));
        let length = expected
            .as_ref()
            .map_or_else(|| request.length.unwrap_or(word_bytes), Vec::len);
        let layouts = split_beats(
            request.address,
            length,
            word_bytes,
            geometry.max_word_address(),
        )?;
        let beats = layouts
            .into_iter()
            .map(|layout| {
                Beat::new(
                    BeatKind::Read,
                    layout,
                    layout.byte_enable,
                    None,
                    request.error_expected,
                )
            })
            .collect();
        Ok(Self::with_beats(
            id,
            BeatKind::Read,
            request.address,
            length,
            beats,
            request.error_expected,
            expected,
        ))
    }

    fn with_beats(
        id: TransactionId,
        kind: BeatKind,
        byte_address: u64,
        length: usize,
        beats: Vec<Beat>,
        error_expected: bool,
        expected_data: Option<Vec<u8>>,
    ) -> Self {
        let remaining = beats.len();
        Self {
            id,
            kind,
            byte_address,
            length,
            beats,
            error_expected,
            expected_data,
            remaining,
            cancelled: false,
        }
    }

    /// Records that one more child beat completed.
    pub(crate) fn note_completed(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
    }

    /// Records that some beats were discarded before issue.
    pub(crate) fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    /// True once every child beat has completed.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.remaining == 0
    }

    /// True when beats were discarded by a queue clear.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// OR of the child beats' error flags.
    #[must_use]
    pub fn aggregate_error(&self) -> bool {
        self.beats
            .iter()
            .any(|beat| beat.outcome().is_some_and(BeatOutcome::is_error))
    }

    /// First beat that returned a non-OKAY response.
    #[must_use]
    pub fn first_error_response(&self) -> Option<(u64, ResponseCode)> {
        self.beats.iter().find_map(|beat| match beat.outcome() {
            Some(BeatOutcome::Responded(code)) if code.is_error() => {
                Some((beat.word_address(), code))
            }
            _ => None,
        })
    }

    /// Read data reassembled in address order; empty for writes.
    #[must_use]
    pub fn result_data(&self) -> Vec<u8> {
        if self.kind == BeatKind::Write {
            return Vec::new();
        }
        let mut data = vec![0; self.length];
        for beat in &self.beats {
            if let Some(word) = &beat.read_data {
                beat.layout.unpack(word, &mut data);
            }
        }
        data
    }

    /// Disagreement between the observed outcome and the caller's
    /// expectations, before the reporting policy is applied.
    #[must_use]
    pub fn expectation_mismatch(&self) -> Option<AvalonError> {
        if self.cancelled {
            return Some(AvalonError::Cancelled { id: self.id });
        }
        let aggregate_error = self.aggregate_error();
        if aggregate_error && !self.error_expected {
            let (word_address, response) = self.first_error_response().unwrap_or((
                self.beats.first().map_or(0, Beat::word_address),
                ResponseCode::Reserved,
            ));
            return Some(AvalonError::ResponseError {
                kind: self.kind,
                byte_address: self.byte_address,
                word_address,
                response,
            });
        }
        if !aggregate_error && self.error_expected {
            return Some(AvalonError::ExpectedErrorMissing {
                kind: self.kind,
                byte_address: self.byte_address,
            });
        }
        if aggregate_error {
            return None;
        }
        let expected = self.expected_data.as_ref()?;
        let actual = self.result_data();
        (actual != *expected).then(|| AvalonError::DataMismatch {
            byte_address: self.byte_address,
            expected: expected.clone(),
            actual,
        })
    }
}

/// What the session does with a completed transaction's outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    /// Outcome matched expectations.
    Accept,
    /// Deliver the error to whoever joins the transaction.
    Raise(AvalonError),
    /// Record the error in `exception_occurred` only.
    Suppress(AvalonError),
}

impl PolicyDecision {
    /// Applies the exception policy to an expectation mismatch.
    ///
    /// Cancellation is always delivered, it is not a bus outcome.
    #[must_use]
    pub fn decide(mismatch: Option<AvalonError>, exception_enabled: bool) -> Self {
        match mismatch {
            None => Self::Accept,
            Some(err @ AvalonError::Cancelled { .. }) => Self::Raise(err),
            Some(err) if exception_enabled => Self::Raise(err),
            Some(err) => Self::Suppress(err),
        }
    }
}

/// Finished transaction waiting to be joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Identifier.
    pub id: TransactionId,
    /// Direction.
    pub kind: BeatKind,
    /// Reassembled read data; empty for writes.
    pub data: Vec<u8>,
    /// Error delivered to the joiner, if the policy raised one.
    pub raised: Option<AvalonError>,
}
