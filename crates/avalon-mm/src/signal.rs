//! Signal-level boundary between the transaction engine and the simulator.
//!
//! The engine never advances simulated time itself. It asks a [`Clock`] for
//! the next rising edge and a settling delta, and reads/writes wires through
//! an [`AvalonBus`]. Values cross this boundary as little-endian byte slices
//! so data wires of any width up to 1024 bits fit the same interface.

use crate::AvalonError;

/// Number of wires in an Avalon-MM manager interface.
pub const SIGNAL_COUNT: usize = 10;

/// Maximum supported width of `writedata`/`readdata`.
pub const MAX_DATA_WIDTH_BITS: u32 = 1024;

/// Maximum supported width of `address`.
pub const MAX_ADDRESS_WIDTH_BITS: u32 = 64;

/// Avalon-MM manager interface wires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Signal {
    /// Read request strobe (manager output).
    Read,
    /// Write request strobe (manager output).
    Write,
    /// Back-pressure, 1 holds the current request (manager input).
    WaitRequest,
    /// Word address (manager output).
    Address,
    /// Write payload for the current beat (manager output).
    WriteData,
    /// Per-byte lane mask (manager output).
    ByteEnable,
    /// Read response strobe (manager input).
    ReadDataValid,
    /// Write response strobe (manager input).
    WriteResponseValid,
    /// Read response payload (manager input).
    ReadData,
    /// Two-bit response status (manager input).
    Response,
}

impl Signal {
    /// All wires in canonical order.
    pub const ALL: [Self; SIGNAL_COUNT] = [
        Self::Read,
        Self::Write,
        Self::WaitRequest,
        Self::Address,
        Self::WriteData,
        Self::ByteEnable,
        Self::ReadDataValid,
        Self::WriteResponseValid,
        Self::ReadData,
        Self::Response,
    ];

    /// HDL port name of the wire.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::WaitRequest => "waitrequest",
            Self::Address => "address",
            Self::WriteData => "writedata",
            Self::ByteEnable => "byteenable",
            Self::ReadDataValid => "readdatavalid",
            Self::WriteResponseValid => "writeresponsevalid",
            Self::ReadData => "readdata",
            Self::Response => "response",
        }
    }

    /// True for wires the manager drives.
    #[must_use]
    pub const fn is_output(self) -> bool {
        matches!(
            self,
            Self::Read | Self::Write | Self::Address | Self::WriteData | Self::ByteEnable
        )
    }

    /// Optional wires may be absent from the signal set.
    #[must_use]
    pub const fn is_optional(self) -> bool {
        matches!(
            self,
            Self::WaitRequest | Self::ReadDataValid | Self::WriteResponseValid | Self::Response
        )
    }

    const fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Named collection of Avalon-MM wires bound to a design under test.
pub trait AvalonBus {
    /// Width of `signal` in bits, `None` when the wire is not present.
    fn width(&self, signal: Signal) -> Option<u32>;

    /// Drives `signal` with a little-endian value, truncated to its width.
    ///
    /// Driving an absent wire is a no-op.
    fn drive(&mut self, signal: Signal, value: &[u8]);

    /// Samples the current little-endian value of `signal`.
    ///
    /// Absent wires read as zero.
    fn sample(&self, signal: Signal) -> Vec<u8>;

    /// Drives a value that fits in 64 bits.
    fn drive_u64(&mut self, signal: Signal, value: u64) {
        self.drive(signal, &value.to_le_bytes());
    }

    /// Samples the low 64 bits of `signal`.
    fn sample_u64(&self, signal: Signal) -> u64 {
        self.sample(signal)
            .iter()
            .take(8)
            .rev()
            .fold(0, |acc, byte| (acc << 8) | u64::from(*byte))
    }

    /// Samples a single-bit wire.
    fn sample_bit(&self, signal: Signal) -> bool {
        self.sample_u64(signal) & 1 == 1
    }
}

/// Clock-edge wait primitive supplied by the simulation framework.
///
/// `rising_edge` returns at the edge, while inputs still show the values
/// they held during the cycle that just ended. `settle` advances one delta so
/// that logic triggered by the edge has updated before the manager drives
/// its next request.
pub trait Clock<B: AvalonBus> {
    /// Blocks until the next rising edge.
    fn rising_edge(&mut self, bus: &mut B);

    /// Advances one settling delta after the edge.
    fn settle(&mut self, bus: &mut B) {
        let _ = bus;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Wire {
    width: u32,
    value: Vec<u8>,
}

impl Wire {
    fn new(width: u32) -> Self {
        Self {
            width,
            value: vec![0; byte_len(width)],
        }
    }

    fn store(&mut self, value: &[u8]) {
        let len = self.value.len();
        self.value.fill(0);
        for (slot, byte) in self.value.iter_mut().zip(value) {
            *slot = *byte;
        }
        let spare_bits = u32::try_from(len * 8).unwrap_or(u32::MAX) - self.width;
        if spare_bits > 0 {
            if let Some(last) = self.value.last_mut() {
                *last &= u8::MAX >> spare_bits;
            }
        }
    }
}

/// Mask with `count` lanes set starting at lane `first`.
#[must_use]
pub const fn lane_mask(first: u32, count: u32) -> u128 {
    let ones = match u128::MAX.checked_shr(128_u32.saturating_sub(count)) {
        Some(ones) if count > 0 => ones,
        _ => 0,
    };
    match ones.checked_shl(first) {
        Some(mask) => mask,
        None => 0,
    }
}

const fn byte_len(width: u32) -> usize {
    width.div_ceil(8) as usize
}

/// In-memory signal set: every wire is a plain stored value.
///
/// Useful as the bus half of a simulator bridge that copies values to and
/// from real HDL handles around each edge, and as the wire model of
/// software-only responders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalBank {
    wires: [Option<Wire>; SIGNAL_COUNT],
}

impl SignalBank {
    /// Creates a full ten-wire signal set for the given geometry.
    #[must_use]
    pub fn new(address_width: u32, data_width: u32) -> Self {
        let wires = Signal::ALL.map(|signal| {
            let width = match signal {
                Signal::Address => address_width,
                Signal::WriteData | Signal::ReadData => data_width,
                Signal::ByteEnable => data_width / 8,
                Signal::Response => 2,
                _ => 1,
            };
            Some(Wire::new(width))
        });
        Self { wires }
    }

    /// Removes a wire from the set.
    #[must_use]
    pub fn without(mut self, signal: Signal) -> Self {
        self.wires[signal.index()] = None;
        self
    }

    /// Overrides the width of a wire, adding it when absent.
    #[must_use]
    pub fn with_width(mut self, signal: Signal, width: u32) -> Self {
        self.wires[signal.index()] = Some(Wire::new(width));
        self
    }
}

impl AvalonBus for SignalBank {
    fn width(&self, signal: Signal) -> Option<u32> {
        self.wires[signal.index()].as_ref().map(|wire| wire.width)
    }

    fn drive(&mut self, signal: Signal, value: &[u8]) {
        if let Some(wire) = self.wires[signal.index()].as_mut() {
            wire.store(value);
        }
    }

    fn sample(&self, signal: Signal) -> Vec<u8> {
        self.wires[signal.index()]
            .as_ref()
            .map_or_else(Vec::new, |wire| wire.value.clone())
    }
}

/// Widths and optional-wire presence resolved from a bound signal set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusGeometry {
    /// Width of `address`; addresses count bus words.
    pub address_width: u32,
    /// Width of `writedata`/`readdata` in bits.
    pub data_width: u32,
    /// `waitrequest` is present.
    pub has_wait_request: bool,
    /// `readdatavalid` is present.
    pub has_read_data_valid: bool,
    /// `writeresponsevalid` is present.
    pub has_write_response_valid: bool,
    /// `response` is present.
    pub has_response: bool,
}

impl BusGeometry {
    /// Resolves and validates the geometry of `bus`.
    ///
    /// # Errors
    ///
    /// Returns [`AvalonError::MissingSignal`] when a required wire is absent,
    /// [`AvalonError::SignalWidth`] for illegal control/address/strobe widths,
    /// and [`AvalonError::DataWidth`] when the data wires differ or are not a
    /// power of two between 8 and 1024 bits.
    pub fn probe<B: AvalonBus + ?Sized>(bus: &B) -> Result<Self, AvalonError> {
        for signal in Signal::ALL {
            if !signal.is_optional() && bus.width(signal).is_none() {
                return Err(AvalonError::MissingSignal { signal });
            }
        }
        let width = |signal: Signal| bus.width(signal).unwrap_or(0);

        for signal in [
            Signal::Read,
            Signal::Write,
            Signal::WaitRequest,
            Signal::ReadDataValid,
            Signal::WriteResponseValid,
        ] {
            if let Some(bits) = bus.width(signal) {
                if bits != 1 {
                    return Err(AvalonError::SignalWidth {
                        signal,
                        width: bits,
                        expected: "1",
                    });
                }
            }
        }
        if let Some(bits) = bus.width(Signal::Response) {
            if bits != 2 {
                return Err(AvalonError::SignalWidth {
                    signal: Signal::Response,
                    width: bits,
                    expected: "2",
                });
            }
        }

        let write_bits = width(Signal::WriteData);
        let read_bits = width(Signal::ReadData);
        if write_bits != read_bits
            || !write_bits.is_power_of_two()
            || !(8..=MAX_DATA_WIDTH_BITS).contains(&write_bits)
        {
            return Err(AvalonError::DataWidth {
                write_bits,
                read_bits,
            });
        }
        let strobe_bits = width(Signal::ByteEnable);
        if strobe_bits != write_bits / 8 {
            return Err(AvalonError::SignalWidth {
                signal: Signal::ByteEnable,
                width: strobe_bits,
                expected: "data width / 8",
            });
        }
        let address_width = width(Signal::Address);
        if !(1..=MAX_ADDRESS_WIDTH_BITS).contains(&address_width) {
            return Err(AvalonError::SignalWidth {
                signal: Signal::Address,
                width: address_width,
                expected: "1..=64",
            });
        }

        Ok(Self {
            address_width,
            data_width: write_bits,
            has_wait_request: bus.width(Signal::WaitRequest).is_some(),
            has_read_data_valid: bus.width(Signal::ReadDataValid).is_some(),
            has_write_response_valid: bus.width(Signal::WriteResponseValid).is_some(),
            has_response: bus.width(Signal::Response).is_some(),
        })
    }

    /// Bytes per bus word.
    #[must_use]
    pub const fn word_bytes(&self) -> usize {
        (self.data_width / 8) as usize
    }

    /// Number of byte lanes, equal to the `byteenable` width.
    #[must_use]
    pub const fn byte_enable_width(&self) -> u32 {
        self.data_width / 8
    }

    /// Highest word address the `address` wire can carry.
    #[must_use]
    pub const fn max_word_address(&self) -> u64 {
        match u64::MAX.checked_shr(MAX_ADDRESS_WIDTH_BITS.saturating_sub(self.address_width)) {
            Some(max) => max,
            None => 0,
        }
    }

    /// All lanes enabled.
    #[must_use]
    pub const fn full_byte_enable(&self) -> u128 {
        lane_mask(0, self.byte_enable_width())
    }
}

#[cfg(test)]
mod tests {
    use super::{AvalonBus, BusGeometry, Signal, SignalBank};
    use crate::AvalonError;

    #[test]
    fn bank_truncates_driven_values_to_width() {
        let mut bank = SignalBank::new(12, 32);
        bank.drive_u64(Signal::Address, 0xFFFF_FFFF);
        assert_eq!(bank.sample_u64(Signal::Address), 0x0FFF);

        bank.drive(Signal::WriteData, &[0x11, 0x22, 0x33, 0x44, 0x55]);
        assert_eq!(bank.sample(Signal::WriteData), vec![0x11, 0x22, 0x33, 0x44]);

        bank.drive_u64(Signal::Read, 0b10);
        assert!(!bank.sample_bit(Signal::Read));
    }

    #[test]
    fn absent_wires_read_zero_and_ignore_drives() {
        let mut bank = SignalBank::new(16, 32).without(Signal::WaitRequest);
        bank.drive_u64(Signal::WaitRequest, 1);
        assert_eq!(bank.width(Signal::WaitRequest), None);
        assert!(!bank.sample_bit(Signal::WaitRequest));
    }

    #[test]
    fn probe_resolves_geometry() {
        let bank = SignalBank::new(30, 64).without(Signal::WriteResponseValid);
        let geometry = BusGeometry::probe(&bank).expect("valid geometry");
        assert_eq!(geometry.address_width, 30);
        assert_eq!(geometry.data_width, 64);
        assert_eq!(geometry.word_bytes(), 8);
        assert_eq!(geometry.byte_enable_width(), 8);
        assert_eq!(geometry.full_byte_enable(), 0xFF);
        assert_eq!(geometry.max_word_address(), (1 << 30) - 1);
        assert!(geometry.has_wait_request);
        assert!(!geometry.has_write_response_valid);
    }

    #[test]
    fn probe_rejects_missing_required_wire() {
        let bank = SignalBank::new(16, 32).without(Signal::ByteEnable);
        assert_eq!(
            BusGeometry::probe(&bank),
            Err(AvalonError::MissingSignal {
                signal: Signal::ByteEnable
            })
        );
    }

    #[test]
    fn probe_rejects_bad_widths() {
        let odd = SignalBank::new(16, 24);
        assert!(matches!(
            BusGeometry::probe(&odd),
            Err(AvalonError::DataWidth { write_bits: 24, .. })
        ));

        let mismatched = SignalBank::new(16, 32).with_width(Signal::ReadData, 64);
        assert!(matches!(
            BusGeometry::probe(&mismatched),
            Err(AvalonError::DataWidth {
                write_bits: 32,
                read_bits: 64
            })
        ));

        let wide_strobe = SignalBank::new(16, 32).with_width(Signal::ByteEnable, 8);
        assert!(matches!(
            BusGeometry::probe(&wide_strobe),
            Err(AvalonError::SignalWidth {
                signal: Signal::ByteEnable,
                ..
            })
        ));

        let wide_read = SignalBank::new(16, 32).with_width(Signal::Read, 2);
        assert!(matches!(
            BusGeometry::probe(&wide_read),
            Err(AvalonError::SignalWidth {
                signal: Signal::Read,
                ..
            })
        ));
    }

    #[test]
    fn full_width_bus_geometry_is_representable() {
        let bank = SignalBank::new(64, 1024);
        let geometry = BusGeometry::probe(&bank).expect("1024-bit bus");
        assert_eq!(geometry.full_byte_enable(), u128::MAX);
        assert_eq!(geometry.max_word_address(), u64::MAX);
    }
}
