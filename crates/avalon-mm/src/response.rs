//! Avalon-MM `response` wire decoding.

/// Two-bit response status returned with `readdatavalid`/`writeresponsevalid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum ResponseCode {
    /// Access completed successfully.
    #[default]
    Okay = 0b00,
    /// Encoding reserved by the protocol.
    Reserved = 0b01,
    /// Responder rejected or failed the access (`SLVERR`).
    SlaveError = 0b10,
    /// No responder decoded the address (`DECODEERROR`).
    DecodeError = 0b11,
}

impl ResponseCode {
    /// Decodes the low two bits of a sampled `response` value.
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        match bits & 0b11 {
            0b00 => Self::Okay,
            0b01 => Self::Reserved,
            0b10 => Self::SlaveError,
            _ => Self::DecodeError,
        }
    }

    /// Raw two-bit wire encoding.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self as u8
    }

    /// Anything other than `OKAY` counts as an error, reserved codes included.
    #[must_use]
    pub const fn is_error(self) -> bool {
        !matches!(self, Self::Okay)
    }
}

impl std::fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Okay => "OKAY",
            Self::Reserved => "RESERVED",
            Self::SlaveError => "SLVERR",
            Self::DecodeError => "DECODEERROR",
        };
        write!(f, "{name} (0x{:x})", self.bits())
    }
}
