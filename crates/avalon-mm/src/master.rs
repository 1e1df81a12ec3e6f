//! Avalon-MM manager session.
//!
//! [`AvalonMaster::step`] advances the whole engine by one clock edge:
//!
//! 1. wait for the rising edge and sample every manager input,
//! 2. complete the oldest outstanding beat of each kind whose response
//!    strobe is asserted,
//! 3. tick the response timeout of every beat still outstanding,
//! 4. resolve the request arm against `waitrequest`,
//! 5. finalize transactions whose last beat completed,
//! 6. wait one settling delta, then drive the next beat or release the wires.
//!
//! Blocking calls are non-blocking submissions followed by
//! [`AvalonMaster::join`], which steps until the transaction is done.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, error, info, trace, warn};

use crate::error::hex_le;
use crate::{
    ArmEvent, AvalonBus, AvalonError, Beat, BeatKind, BeatOutcome, BeatRef, BeatStatus,
    BusGeometry, Clock, Completion, EdgeSample, MasterConfig, PolicyDecision, ReadRequest,
    RequestDriver, ResponseCorrelator, Signal, TimeoutMonitor, TimeoutPhase, Transaction,
    TransactionHandle, TransactionId, WriteRequest,
};

/// One Avalon-MM manager interface bound to a signal set and a clock.
#[derive(Debug)]
pub struct AvalonMaster<B: AvalonBus, C: Clock<B>> {
    bus: B,
    clock: C,
    geometry: BusGeometry,
    target: String,
    timeouts: TimeoutMonitor,
    driver: RequestDriver,
    correlator: ResponseCorrelator,
    transactions: BTreeMap<TransactionId, Transaction>,
    completed: BTreeMap<TransactionId, Completion>,
    unreported: BTreeSet<TransactionId>,
    next_id: u64,
    cycle: u64,
    exception_enabled: bool,
    exception_occurred: bool,
    fault: Option<AvalonError>,
}

impl<B: AvalonBus, C: Clock<B>> AvalonMaster<B, C> {
    /// Binds a manager to `bus` and `clock` and drives its outputs to zero.
    ///
    /// # Errors
    ///
    /// Returns the [`BusGeometry::probe`] error when the signal set is not a
    /// usable Avalon-MM manager interface.
    pub fn new(mut bus: B, clock: C, config: &MasterConfig) -> Result<Self, AvalonError> {
        let geometry = BusGeometry::probe(&bus)?;
        RequestDriver::reset_wires(&mut bus);

        let master = Self {
            bus,
            clock,
            geometry,
            target: config.log_target(),
            timeouts: TimeoutMonitor::new(config.timeout_cycles),
            driver: RequestDriver::new(config.issue_policy),
            correlator: ResponseCorrelator::new(),
            transactions: BTreeMap::new(),
            completed: BTreeMap::new(),
            unreported: BTreeSet::new(),
            next_id: 0,
            cycle: 0,
            exception_enabled: config.exception_enabled,
            exception_occurred: false,
            fault: None,
        };
        master.log_configuration();
        Ok(master)
    }

    fn log_configuration(&self) {
        let target = self.target.as_str();
        let geometry = &self.geometry;
        info!(target: target, "Avalon-MM configuration:");
        info!(
            target: target,
            "  Address width: {} bits (word addressing)",
            geometry.address_width
        );
        info!(
            target: target,
            "  Data width: {} bits ({} bytes)",
            geometry.data_width,
            geometry.word_bytes()
        );
        info!(target: target, "  ByteEnable width: {} bits", geometry.byte_enable_width());
        match self.timeouts.budget() {
            Some(cycles) => info!(target: target, "  Timeout: {cycles} clock cycles"),
            None => info!(target: target, "  Timeout: disabled"),
        }
        info!(target: target, "  Issue policy: {}", self.driver.policy());
        for signal in Signal::ALL {
            match self.bus.width(signal) {
                Some(width) => info!(target: target, "  {signal} width: {width} bits"),
                None => info!(target: target, "  {signal}: not present"),
            }
        }
    }

    /// Resolved bus geometry.
    #[must_use]
    pub const fn geometry(&self) -> &BusGeometry {
        &self.geometry
    }

    /// Bound signal set.
    #[must_use]
    pub const fn bus(&self) -> &B {
        &self.bus
    }

    /// Bound signal set, mutably.
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Bound clock.
    #[must_use]
    pub const fn clock(&self) -> &C {
        &self.clock
    }

    /// Bound clock, mutably.
    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    /// Releases the signal set and clock.
    #[must_use]
    pub fn into_parts(self) -> (B, C) {
        (self.bus, self.clock)
    }

    /// Clock edges observed so far.
    #[must_use]
    pub const fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Whether unexpected outcomes are raised as errors.
    #[must_use]
    pub const fn exception_enabled(&self) -> bool {
        self.exception_enabled
    }

    /// Changes the exception policy for transactions completing from now on.
    pub fn set_exception_enabled(&mut self, enabled: bool) {
        self.exception_enabled = enabled;
    }

    /// Outcome of the most recent transaction completed with exceptions
    /// suppressed: true when it disagreed with its expectations.
    #[must_use]
    pub const fn exception_occurred(&self) -> bool {
        self.exception_occurred
    }

    /// Latched fatal error, if any.
    #[must_use]
    pub const fn fault(&self) -> Option<&AvalonError> {
        self.fault.as_ref()
    }

    /// Beats not yet accepted, including the one on the wires.
    #[must_use]
    pub fn pending_beats(&self) -> usize {
        self.driver.pending_len() + usize::from(self.driver.driving().is_some())
    }

    /// Accepted beats awaiting their response.
    #[must_use]
    pub fn outstanding_beats(&self) -> usize {
        self.correlator.total()
    }

    /// Finished transactions not yet joined.
    #[must_use]
    pub fn completed_transactions(&self) -> usize {
        self.completed.len()
    }

    /// True when nothing is queued, driven or outstanding.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.driver.is_idle() && self.correlator.total() == 0
    }

    /// Live transaction, until it completes.
    #[must_use]
    pub fn transaction(&self, id: TransactionId) -> Option<&Transaction> {
        self.transactions.get(&id)
    }

    fn check_fault(&self) -> Result<(), AvalonError> {
        self.fault.clone().map_or(Ok(()), Err)
    }

    fn latch(&mut self, err: AvalonError) -> AvalonError {
        error!(target: self.target.as_str(), "{err}");
        self.fault = Some(err.clone());
        err
    }

    fn allocate_id(&mut self) -> TransactionId {
        self.next_id += 1;
        TransactionId::new(self.next_id)
    }

    /// Queues a write and returns immediately.
    ///
    /// # Errors
    ///
    /// Returns request validation errors, or the latched fatal error.
    pub fn write_nowait(
        &mut self,
        request: &WriteRequest,
    ) -> Result<TransactionHandle, AvalonError> {
        self.check_fault()?;
        let id = self.allocate_id();
        let tx = Transaction::write(id, request, &self.geometry)?;
        info!(
            target: self.target.as_str(),
            "Write {id} addr: 0x{:08x} (word: 0x{:08x}) data: 0x{} ({} beats)",
            tx.byte_address,
            tx.beats.first().map_or(0, Beat::word_address),
            hex_le(&request.data.to_bytes(self.geometry.word_bytes())),
            tx.beats.len()
        );
        Ok(self.submit(tx))
    }

    /// Queues a read and returns immediately.
    ///
    /// # Errors
    ///
    /// Returns request validation errors, or the latched fatal error.
    pub fn read_nowait(
        &mut self,
        request: &ReadRequest,
    ) -> Result<TransactionHandle, AvalonError> {
        self.check_fault()?;
        let id = self.allocate_id();
        let tx = Transaction::read(id, request, &self.geometry)?;
        info!(
            target: self.target.as_str(),
            "Read {id} addr: 0x{:08x} (word: 0x{:08x}) length: {} ({} beats)",
            tx.byte_address,
            tx.beats.first().map_or(0, Beat::word_address),
            tx.length,
            tx.beats.len()
        );
        Ok(self.submit(tx))
    }

    fn submit(&mut self, tx: Transaction) -> TransactionHandle {
        let handle = TransactionHandle::new(tx.id, tx.kind);
        for index in 0..tx.beats.len() {
            self.driver.enqueue(BeatRef {
                transaction: tx.id,
                index,
            });
        }
        self.transactions.insert(tx.id, tx);
        self.schedule();
        handle
    }

    /// Writes and steps the bus until every beat has completed.
    ///
    /// # Errors
    ///
    /// Returns request validation errors, raised policy outcomes and fatal
    /// timeouts or protocol violations.
    pub fn write(&mut self, request: &WriteRequest) -> Result<(), AvalonError> {
        let handle = self.write_nowait(request)?;
        self.join(handle).map(drop)
    }

    /// Reads and steps the bus until every beat has completed.
    ///
    /// # Errors
    ///
    /// Returns request validation errors, raised policy outcomes (including
    /// data mismatches) and fatal timeouts or protocol violations.
    pub fn read(&mut self, request: &ReadRequest) -> Result<Vec<u8>, AvalonError> {
        let handle = self.read_nowait(request)?;
        self.join(handle)
    }

    /// Steps until the transaction behind `handle` completes, then returns
    /// its read data (empty for writes) or its raised error.
    ///
    /// # Errors
    ///
    /// Returns the transaction's raised error, [`AvalonError::UnknownTransaction`]
    /// for a handle already joined or drained by [`Self::wait`], or the
    /// latched fatal error.
    pub fn join(&mut self, handle: TransactionHandle) -> Result<Vec<u8>, AvalonError> {
        let id = handle.id();
        loop {
            self.check_fault()?;
            if let Some(completion) = self.completed.remove(&id) {
                self.unreported.remove(&id);
                return completion.raised.map_or(Ok(completion.data), Err);
            }
            if !self.transactions.contains_key(&id) {
                return Err(AvalonError::UnknownTransaction { id });
            }
            self.step()?;
        }
    }

    /// Steps until nothing is queued, driven or outstanding.
    ///
    /// Completed writes are discarded; completed reads stay until joined.
    ///
    /// # Errors
    ///
    /// Returns the first raised error not yet delivered through
    /// [`Self::join`] or an earlier `wait`, or the latched fatal error. The
    /// record of the reported transaction is dropped with it.
    pub fn wait(&mut self) -> Result<(), AvalonError> {
        self.check_fault()?;
        while !self.is_idle() {
            self.step()?;
        }
        let first = self.unreported.iter().find_map(|id| {
            self.completed
                .get(id)
                .and_then(|c| c.raised.clone().map(|err| (*id, err)))
        });
        self.unreported.clear();
        self.completed
            .retain(|_, completion| completion.kind == BeatKind::Read);
        match first {
            Some((id, err)) => {
                self.completed.remove(&id);
                Err(err)
            }
            None => Ok(()),
        }
    }

    /// Discards every queued beat that is not yet on the wires, along with
    /// the records of transactions that already completed.
    ///
    /// Affected transactions complete with [`AvalonError::Cancelled`] once
    /// their accepted beats have drained, and stay joinable. Returns the
    /// number of beats dropped.
    pub fn clear(&mut self) -> usize {
        let records = self.completed.len();
        if records > 0 {
            info!(target: self.target.as_str(), "Cleared {records} completed transactions");
        }
        self.completed.clear();
        self.unreported.clear();

        let discarded = self.driver.discard_pending();
        for beat_ref in &discarded {
            if let Some(tx) = self.transactions.get_mut(&beat_ref.transaction) {
                if let Some(beat) = tx.beats.get_mut(beat_ref.index) {
                    beat.complete(BeatOutcome::Discarded);
                    tx.note_completed();
                    tx.mark_cancelled();
                }
            }
        }
        if !discarded.is_empty() {
            info!(target: self.target.as_str(), "Cleared {} pending beats", discarded.len());
        }
        self.finalize();
        discarded.len()
    }

    /// Advances the engine by one clock edge.
    ///
    /// # Errors
    ///
    /// Returns and latches [`AvalonError::Timeout`] or
    /// [`AvalonError::ProtocolViolation`]; returns the latched error on every
    /// later call.
    pub fn step(&mut self) -> Result<(), AvalonError> {
        self.check_fault()?;
        self.clock.rising_edge(&mut self.bus);
        self.cycle += 1;
        let sample = EdgeSample::capture(&self.bus, &self.geometry);
        if let Err(err) = self.process_edge(&sample) {
            return Err(self.latch(err));
        }
        self.clock.settle(&mut self.bus);
        self.schedule();
        Ok(())
    }

    /// Steps `cycles` edges.
    ///
    /// # Errors
    ///
    /// Stops at the first fatal error, see [`Self::step`].
    pub fn step_cycles(&mut self, cycles: u64) -> Result<(), AvalonError> {
        for _ in 0..cycles {
            self.step()?;
        }
        Ok(())
    }

    fn process_edge(&mut self, sample: &EdgeSample) -> Result<(), AvalonError> {
        for (kind, beat_ref) in self.correlator.correlate(sample, self.cycle)? {
            self.complete_beat(beat_ref, sample);
            debug!(
                target: self.target.as_str(),
                "{kind} {} beat {} response {}",
                beat_ref.transaction,
                beat_ref.index,
                sample.response
            );
        }
        self.tick_outstanding()?;

        match self.driver.observe_edge(sample.wait_request) {
            ArmEvent::Idle => {}
            ArmEvent::Accepted(beat_ref) => self.accept(beat_ref, sample),
            ArmEvent::Stalled { beat, stalled } => {
                trace!(
                    target: self.target.as_str(),
                    "{} beat {} held by waitrequest for {stalled} cycles",
                    beat.transaction,
                    beat.index
                );
                if self.timeouts.stall_expired(stalled) {
                    let cycles = self.timeouts.budget().unwrap_or_default();
                    return Err(self.timeout_error(beat, TimeoutPhase::Acceptance, cycles));
                }
            }
        }

        self.finalize();
        Ok(())
    }

    fn complete_beat(&mut self, beat_ref: BeatRef, sample: &EdgeSample) {
        let Some(tx) = self.transactions.get_mut(&beat_ref.transaction) else {
            return;
        };
        let Some(beat) = tx.beats.get_mut(beat_ref.index) else {
            return;
        };
        if beat.kind == BeatKind::Read {
            beat.read_data = Some(sample.read_data.clone());
        }
        beat.complete(BeatOutcome::Responded(sample.response));
        tx.note_completed();
    }

    fn accept(&mut self, beat_ref: BeatRef, sample: &EdgeSample) {
        let Some(kind) = self
            .transactions
            .get(&beat_ref.transaction)
            .map(|tx| tx.kind)
        else {
            return;
        };
        debug!(
            target: self.target.as_str(),
            "{kind} {} beat {} accepted at cycle {}",
            beat_ref.transaction,
            beat_ref.index,
            self.cycle
        );
        if ResponseCorrelator::tracks(kind, &self.geometry) {
            if let Some(beat) = beat_mut(&mut self.transactions, beat_ref) {
                beat.issue(self.timeouts.arm());
                self.correlator.push(kind, beat_ref);
            }
        } else if let Some(beat) = beat_mut(&mut self.transactions, beat_ref) {
            beat.issue(None);
            self.complete_beat(beat_ref, sample);
        }
    }

    fn tick_outstanding(&mut self) -> Result<(), AvalonError> {
        let mut expired = None;
        for beat_ref in self.correlator.iter() {
            let Some(beat) = beat_mut(&mut self.transactions, beat_ref) else {
                continue;
            };
            if let BeatStatus::Issued { remaining } = &mut beat.status {
                if TimeoutMonitor::tick(remaining) && expired.is_none() {
                    expired = Some(beat_ref);
                }
            }
        }
        let Some(beat_ref) = expired else {
            return Ok(());
        };
        if let Some(beat) = beat_mut(&mut self.transactions, beat_ref) {
            beat.complete(BeatOutcome::TimedOut);
        }
        let cycles = self.timeouts.budget().unwrap_or_default();
        Err(self.timeout_error(beat_ref, TimeoutPhase::Response, cycles))
    }

    fn timeout_error(&self, beat_ref: BeatRef, phase: TimeoutPhase, cycles: u32) -> AvalonError {
        let Some(tx) = self.transactions.get(&beat_ref.transaction) else {
            return AvalonError::UnknownTransaction {
                id: beat_ref.transaction,
            };
        };
        AvalonError::Timeout {
            kind: tx.kind,
            phase,
            byte_address: tx.byte_address,
            word_address: tx
                .beats
                .get(beat_ref.index)
                .map_or(0, Beat::word_address),
            cycles,
        }
    }

    fn finalize(&mut self) {
        let done: Vec<TransactionId> = self
            .transactions
            .iter()
            .filter(|(_, tx)| tx.is_complete())
            .map(|(id, _)| *id)
            .collect();
        for id in done {
            if let Some(tx) = self.transactions.remove(&id) {
                self.finish(&tx);
            }
        }
    }

    fn finish(&mut self, tx: &Transaction) {
        let target = self.target.as_str();
        let data = tx.result_data();
        let decision = PolicyDecision::decide(tx.expectation_mismatch(), self.exception_enabled);
        let raised = match decision {
            PolicyDecision::Accept => {
                if !self.exception_enabled {
                    self.exception_occurred = false;
                }
                match tx.kind {
                    BeatKind::Read => info!(
                        target: target,
                        "Read {} complete addr: 0x{:08x} data: 0x{}",
                        tx.id,
                        tx.byte_address,
                        hex_le(&data)
                    ),
                    BeatKind::Write => debug!(target: target, "Write {} complete", tx.id),
                }
                None
            }
            PolicyDecision::Raise(err) => {
                if tx.is_cancelled() {
                    info!(target: target, "{err}");
                } else {
                    error!(target: target, "{err}");
                    self.unreported.insert(tx.id);
                }
                Some(err)
            }
            PolicyDecision::Suppress(err) => {
                warn!(target: target, "{err}");
                self.exception_occurred = true;
                None
            }
        };
        self.completed.insert(
            tx.id,
            Completion {
                id: tx.id,
                kind: tx.kind,
                data,
                raised,
            },
        );
    }

    fn schedule(&mut self) {
        let outstanding = self.correlator.total();
        if let Some(beat_ref) = self.driver.next_to_drive(outstanding) {
            if let Some(beat) = beat(&self.transactions, beat_ref) {
                debug!(
                    target: self.target.as_str(),
                    "drive {} {} beat {} word: 0x{:08x} byteenable: 0x{:x}",
                    beat.kind,
                    beat_ref.transaction,
                    beat_ref.index,
                    beat.word_address(),
                    beat.byte_enable
                );
                self.driver.drive(&mut self.bus, beat);
            }
        } else {
            self.driver.release(&mut self.bus);
        }
    }
}

fn beat(transactions: &BTreeMap<TransactionId, Transaction>, beat_ref: BeatRef) -> Option<&Beat> {
    transactions
        .get(&beat_ref.transaction)
        .and_then(|tx| tx.beats.get(beat_ref.index))
}

fn beat_mut(
    transactions: &mut BTreeMap<TransactionId, Transaction>,
    beat_ref: BeatRef,
) -> Option<&mut Beat> {
    transactions
        .get_mut(&beat_ref.transaction)
        .and_then(|tx| tx.beats.get_mut(beat_ref.index))
}
