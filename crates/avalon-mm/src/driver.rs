//! Request driver: the single request arm that puts beats on the wires.
//!
//! Avalon-MM shares `address` and `byteenable` between reads and writes, so
//! the driver owns one arm and asserts at most one control line per cycle.
//! Pending beats are served in submission order regardless of kind.

use std::collections::VecDeque;

use crate::{AvalonBus, Beat, BeatKind, BeatRef, Signal};

/// When the next pending beat may be driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum IssuePolicy {
    /// Control line deasserts for one cycle after every accepted beat.
    #[default]
    Gapped,
    /// Next beat is driven right after the previous one is accepted.
    Pipelined,
    /// Next beat is driven only once no issued beat is awaiting a response.
    Serialized,
}

impl std::fmt::Display for IssuePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Gapped => "gapped",
            Self::Pipelined => "pipelined",
            Self::Serialized => "serialized",
        })
    }
}

/// State of the request arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ArmState {
    /// No request on the wires.
    #[default]
    Idle,
    /// A beat is on the wires waiting for acceptance.
    Driving {
        /// Beat being driven.
        beat: BeatRef,
        /// Edges it has been held by `waitrequest`.
        stalled: u32,
    },
}

/// What the arm observed on a clock edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArmEvent {
    /// Nothing was being driven.
    Idle,
    /// The driven beat was accepted.
    Accepted(BeatRef),
    /// The driven beat is still held by `waitrequest`.
    Stalled {
        /// Beat being held.
        beat: BeatRef,
        /// Edges held so far.
        stalled: u32,
    },
}

/// Pending queue plus the request arm.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestDriver {
    policy: IssuePolicy,
    pending: VecDeque<BeatRef>,
    arm: ArmState,
    cooldown: bool,
    asserted: bool,
}

impl RequestDriver {
    /// Creates an idle driver.
    #[must_use]
    pub const fn new(policy: IssuePolicy) -> Self {
        Self {
            policy,
            pending: VecDeque::new(),
            arm: ArmState::Idle,
            cooldown: false,
            asserted: false,
        }
    }

    /// Active issue policy.
    #[must_use]
    pub const fn policy(&self) -> IssuePolicy {
        self.policy
    }

    /// Current arm state.
    #[must_use]
    pub const fn arm(&self) -> ArmState {
        self.arm
    }

    /// Beat currently on the wires.
    #[must_use]
    pub const fn driving(&self) -> Option<BeatRef> {
        match self.arm {
            ArmState::Driving { beat, .. } => Some(beat),
            ArmState::Idle => None,
        }
    }

    /// Number of beats queued behind the arm.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// True when nothing is queued or being driven.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.arm == ArmState::Idle
    }

    /// Queues a beat behind everything already pending.
    pub fn enqueue(&mut self, beat: BeatRef) {
        self.pending.push_back(beat);
    }

    /// Removes every queued beat; the beat on the wires stays.
    pub fn discard_pending(&mut self) -> Vec<BeatRef> {
        self.pending.drain(..).collect()
    }

    /// Updates the arm with the `waitrequest` value sampled at an edge.
    pub fn observe_edge(&mut self, wait_request: bool) -> ArmEvent {
        match self.arm {
            ArmState::Idle => {
                self.cooldown = false;
                ArmEvent::Idle
            }
            ArmState::Driving { beat, stalled } if wait_request => {
                let stalled = stalled.saturating_add(1);
                self.arm = ArmState::Driving { beat, stalled };
                ArmEvent::Stalled { beat, stalled }
            }
            ArmState::Driving { beat, .. } => {
                self.arm = ArmState::Idle;
                self.cooldown = self.policy == IssuePolicy::Gapped;
                ArmEvent::Accepted(beat)
            }
        }
    }

    /// Takes the next beat to drive, if the arm is free and the policy allows.
    ///
    /// `outstanding` is the number of accepted beats still awaiting a response.
    pub fn next_to_drive(&mut self, outstanding: usize) -> Option<BeatRef> {
        if self.arm != ArmState::Idle || self.cooldown {
            return None;
        }
        if self.policy == IssuePolicy::Serialized && outstanding > 0 {
            return None;
        }
        let beat = self.pending.pop_front()?;
        self.arm = ArmState::Driving { beat, stalled: 0 };
        Some(beat)
    }

    /// Drives a beat's request wires.
    pub fn drive<B: AvalonBus + ?Sized>(&mut self, bus: &mut B, beat: &Beat) {
        bus.drive_u64(Signal::Address, beat.word_address());
        bus.drive(Signal::ByteEnable, &beat.byte_enable.to_le_bytes());
        bus.drive(Signal::WriteData, beat.write_data.as_deref().unwrap_or_default());
        bus.drive_u64(Signal::Read, u64::from(beat.kind == BeatKind::Read));
        bus.drive_u64(Signal::Write, u64::from(beat.kind == BeatKind::Write));
        self.asserted = true;
    }

    /// Zeroes the request wires if a beat was left on them.
    pub fn release<B: AvalonBus + ?Sized>(&mut self, bus: &mut B) {
        if self.asserted && self.arm == ArmState::Idle {
            Self::reset_wires(bus);
            self.asserted = false;
        }
    }

    /// Drives every manager output to zero.
    pub fn reset_wires<B: AvalonBus + ?Sized>(bus: &mut B) {
        for signal in [
            Signal::Read,
            Signal::Write,
            Signal::Address,
            Signal::WriteData,
            Signal::ByteEnable,
        ] {
            bus.drive(signal, &[]);
        }
    }
}
