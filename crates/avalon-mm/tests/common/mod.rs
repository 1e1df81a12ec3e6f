//! Ideal echo responder shared by the integration suites.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::ops::RangeInclusive;

use avalon_mm::{
    AvalonBus, AvalonMaster, BeatKind, Clock, MasterConfig, ResponseCode, Signal, SignalBank,
};

/// One request the responder accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    pub cycle: u64,
    pub kind: BeatKind,
    pub word_address: u64,
    pub byte_enable: u128,
    pub write_data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Scheduled {
    due: u64,
    data: Vec<u8>,
    response: ResponseCode,
}

/// Byte-addressed memory behind an Avalon-MM responder.
///
/// Requests are evaluated at the rising edge from the values held during
/// the cycle that just ended; outputs for the next cycle change in `settle`.
/// A response with latency `n` is sampled by the manager `n` edges after the
/// accepting edge.
#[derive(Debug, Clone)]
pub struct EchoResponder {
    word_bytes: usize,
    pub memory: BTreeMap<u64, u8>,
    pub read_latency: u64,
    pub write_latency: u64,
    /// Edges each request is held by `waitrequest` before acceptance.
    pub stall_cycles: u32,
    /// Word addresses answered with `SLVERR`.
    pub error_words: Vec<RangeInclusive<u64>>,
    /// Accept requests but never answer.
    pub silent: bool,
    pub accepted: Vec<Accepted>,
    /// Edges at which `read` and `write` were both high.
    pub overlaps: Vec<u64>,
    cycle: u64,
    held: u32,
    reads: VecDeque<Scheduled>,
    writes: VecDeque<Scheduled>,
}

impl EchoResponder {
    pub fn new(data_width: u32) -> Self {
        Self {
            word_bytes: (data_width / 8) as usize,
            memory: BTreeMap::new(),
            read_latency: 1,
            write_latency: 1,
            stall_cycles: 0,
            error_words: Vec::new(),
            silent: false,
            accepted: Vec::new(),
            overlaps: Vec::new(),
            cycle: 0,
            held: 0,
            reads: VecDeque::new(),
            writes: VecDeque::new(),
        }
    }

    pub fn with_latency(mut self, read: u64, write: u64) -> Self {
        self.read_latency = read.max(1);
        self.write_latency = write.max(1);
        self
    }

    pub fn with_stall(mut self, cycles: u32) -> Self {
        self.stall_cycles = cycles;
        self
    }

    pub fn with_error_words(mut self, words: RangeInclusive<u64>) -> Self {
        self.error_words.push(words);
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Presents the initial `waitrequest` before the manager drives anything.
    pub fn prime(&self, bus: &mut SignalBank) {
        bus.drive_u64(Signal::WaitRequest, u64::from(self.stall_cycles > 0));
    }

    pub fn peek(&self, byte_address: u64, length: usize) -> Vec<u8> {
        (0..length as u64)
            .map(|offset| {
                self.memory
                    .get(&(byte_address + offset))
                    .copied()
                    .unwrap_or(0)
            })
            .collect()
    }

    pub fn poke(&mut self, byte_address: u64, bytes: &[u8]) {
        for (offset, byte) in bytes.iter().enumerate() {
            self.memory.insert(byte_address + offset as u64, *byte);
        }
    }

    /// Edges at which a request was accepted.
    pub fn request_cycles(&self) -> Vec<u64> {
        self.accepted.iter().map(|beat| beat.cycle).collect()
    }

    fn is_error_word(&self, word_address: u64) -> bool {
        self.error_words
            .iter()
            .any(|range| range.contains(&word_address))
    }

    /// Without a response strobe the answer is combinational: it is already
    /// on the wires when the manager samples the accepting edge.
    fn accept(&mut self, bus: &mut SignalBank, kind: BeatKind) {
        let word_address = bus.sample_u64(Signal::Address);
        let byte_enable = bus
            .sample(Signal::ByteEnable)
            .iter()
            .rev()
            .fold(0_u128, |acc, byte| (acc << 8) | u128::from(*byte));
        let write_data = bus.sample(Signal::WriteData);
        let base = word_address * self.word_bytes as u64;
        let response = if self.is_error_word(word_address) {
            ResponseCode::SlaveError
        } else {
            ResponseCode::Okay
        };

        let data = match kind {
            BeatKind::Write => {
                if response == ResponseCode::Okay {
                    for (lane, byte) in write_data.iter().enumerate() {
                        if byte_enable >> lane & 1 == 1 {
                            self.memory.insert(base + lane as u64, *byte);
                        }
                    }
                }
                Vec::new()
            }
            BeatKind::Read if response == ResponseCode::Okay => self.peek(base, self.word_bytes),
            BeatKind::Read => vec![0; self.word_bytes],
        };

        self.accepted.push(Accepted {
            cycle: self.cycle,
            kind,
            word_address,
            byte_enable,
            write_data,
        });
        if self.silent {
            return;
        }
        let strobe = match kind {
            BeatKind::Read => Signal::ReadDataValid,
            BeatKind::Write => Signal::WriteResponseValid,
        };
        if bus.width(strobe).is_none() {
            if kind == BeatKind::Read {
                bus.drive(Signal::ReadData, &data);
            }
            bus.drive_u64(Signal::Response, u64::from(response.bits()));
            return;
        }
        let (queue, latency) = match kind {
            BeatKind::Read => (&mut self.reads, self.read_latency),
            BeatKind::Write => (&mut self.writes, self.write_latency),
        };
        queue.push_back(Scheduled {
            due: self.cycle + latency,
            data,
            response,
        });
    }
}

impl Clock<SignalBank> for EchoResponder {
    fn rising_edge(&mut self, bus: &mut SignalBank) {
        self.cycle += 1;
        let read = bus.sample_bit(Signal::Read);
        let write = bus.sample_bit(Signal::Write);
        if read && write {
            self.overlaps.push(self.cycle);
        }
        if !(read || write) {
            return;
        }
        if bus.sample_bit(Signal::WaitRequest) {
            self.held += 1;
            return;
        }
        self.held = 0;
        self.accept(bus, if write { BeatKind::Write } else { BeatKind::Read });
    }

    fn settle(&mut self, bus: &mut SignalBank) {
        bus.drive_u64(Signal::ReadDataValid, 0);
        bus.drive_u64(Signal::WriteResponseValid, 0);
        bus.drive_u64(Signal::Response, 0);

        let next = self.cycle + 1;
        let mut response = ResponseCode::Okay;
        if self.writes.front().is_some_and(|s| s.due <= next) {
            if let Some(scheduled) = self.writes.pop_front() {
                response = scheduled.response;
                bus.drive_u64(Signal::WriteResponseValid, 1);
            }
        }
        if self.reads.front().is_some_and(|s| s.due <= next) {
            if let Some(scheduled) = self.reads.pop_front() {
                if scheduled.response.is_error() {
                    response = scheduled.response;
                }
                bus.drive(Signal::ReadData, &scheduled.data);
                bus.drive_u64(Signal::ReadDataValid, 1);
            }
        }
        bus.drive_u64(Signal::Response, u64::from(response.bits()));
        bus.drive_u64(
            Signal::WaitRequest,
            u64::from(self.held < self.stall_cycles),
        );
    }
}

pub type Harness = AvalonMaster<SignalBank, EchoResponder>;

/// Master on a full ten-wire bus with the given responder.
pub fn harness(config: &MasterConfig, responder: EchoResponder) -> Harness {
    harness_on(SignalBank::new(32, 32), config, responder)
}

pub fn harness_on(
    mut bank: SignalBank,
    config: &MasterConfig,
    responder: EchoResponder,
) -> Harness {
    responder.prime(&mut bank);
    AvalonMaster::new(bank, responder, config).expect("valid bus")
}
