//! Invoke-id-and-priority fields.
//!
//! The short form is one byte carried in every confirmed xDLMS service:
//! bits 0-3 hold the invoke id used to pair responses with requests, bit 6
//! marks the service as confirmed and bit 7 requests high priority. The
//! long form is four bytes and is used by the DataNotification push
//! service.

use nom::{IResult, number::complete::u8 as nom_u8};

/// One-byte invoke-id-and-priority.
///
/// The invoke id would allow several outstanding requests, but this engine
/// keeps exactly one request in flight; the field is carried for future
/// pipelining.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct InvokeIdAndPriority {
    /// Invoke id, 0-15
    pub invoke_id: u8,
    /// Whether the service is confirmed. Mostly it is.
    pub confirmed: bool,
    /// High-priority flag; a meter without priority management treats it as
    /// normal priority.
    pub high_priority: bool,
}

impl InvokeIdAndPriority {
    pub const LENGTH: usize = 1;

    pub const fn new(invoke_id: u8, confirmed: bool, high_priority: bool) -> Self {
        Self { invoke_id: invoke_id & 0x0F, confirmed, high_priority }
    }

    pub const fn to_byte(self) -> u8 {
        let mut byte = self.invoke_id & 0x0F;
        if self.confirmed {
            byte |= 0b0100_0000;
        }
        if self.high_priority {
            byte |= 0b1000_0000;
        }
        byte
    }

    pub const fn from_byte(byte: u8) -> Self {
        Self {
            invoke_id: byte & 0x0F,
            confirmed: byte & 0b0100_0000 != 0,
            high_priority: byte & 0b1000_0000 != 0,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, byte) = nom_u8(input)?;
        Ok((input, Self::from_byte(byte)))
    }
}

impl Default for InvokeIdAndPriority {
    /// Invoke id 1, confirmed, high priority: byte 0xC1.
    fn default() -> Self {
        Self::new(1, true, true)
    }
}

/// Four-byte long-invoke-id-and-priority of the DataNotification service.
///
/// Bits 0-23 hold the long invoke id; the top byte packs priority (bit 31),
/// service class (bit 30), break-on-error (bit 29) and self-descriptive
/// (bit 28) flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct LongInvokeIdAndPriority {
    pub long_invoke_id: u32,
    pub prioritized: bool,
    pub confirmed: bool,
    pub break_on_error: bool,
    pub self_descriptive: bool,
}

impl LongInvokeIdAndPriority {
    pub const LENGTH: usize = 4;

    pub const fn new(long_invoke_id: u32) -> Self {
        Self {
            long_invoke_id: long_invoke_id & 0x00FF_FFFF,
            prioritized: false,
            confirmed: false,
            break_on_error: false,
            self_descriptive: false,
        }
    }

    pub fn encode(&self) -> [u8; 4] {
        let mut status = 0u8;
        if self.prioritized {
            status |= 0b1000_0000;
        }
        if self.confirmed {
            status |= 0b0100_0000;
        }
        if self.break_on_error {
            status |= 0b0010_0000;
        }
        if self.self_descriptive {
            status |= 0b0001_0000;
        }
        let id = self.long_invoke_id.to_be_bytes();
        [status, id[1], id[2], id[3]]
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, status) = nom_u8(input)?;
        let (input, high) = nom_u8(input)?;
        let (input, mid) = nom_u8(input)?;
        let (input, low) = nom_u8(input)?;
        Ok((
            input,
            Self {
                long_invoke_id: u32::from_be_bytes([0, high, mid, low]),
                prioritized: status & 0b1000_0000 != 0,
                confirmed: status & 0b0100_0000 != 0,
                break_on_error: status & 0b0010_0000 != 0,
                self_descriptive: status & 0b0001_0000 != 0,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_byte() {
        // invoke id 1, confirmed, high priority
        assert_eq!(InvokeIdAndPriority::default().to_byte(), 0xC1);
    }

    #[test]
    fn test_byte_roundtrip() {
        for byte in [0x00, 0x01, 0x41, 0x81, 0xC1, 0xCF] {
            assert_eq!(InvokeIdAndPriority::from_byte(byte).to_byte(), byte);
        }
    }

    #[test]
    fn test_invoke_id_masked_to_four_bits() {
        let iip = InvokeIdAndPriority::new(0x1F, false, false);
        assert_eq!(iip.invoke_id, 0x0F);
    }

    #[test]
    fn test_from_byte_fields() {
        let iip = InvokeIdAndPriority::from_byte(0x42);
        assert_eq!(iip.invoke_id, 2);
        assert!(iip.confirmed);
        assert!(!iip.high_priority);
    }

    #[test]
    fn test_long_invoke_id_roundtrip() {
        let long = LongInvokeIdAndPriority {
            long_invoke_id: 0x00123456,
            prioritized: true,
            confirmed: true,
            break_on_error: false,
            self_descriptive: true,
        };
        let encoded = long.encode();
        assert_eq!(encoded[0], 0b1101_0000);
        let (rest, parsed) = LongInvokeIdAndPriority::parse(&encoded).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, long);
    }

    #[test]
    fn test_long_invoke_id_is_24_bits() {
        let long = LongInvokeIdAndPriority::new(0xFFFF_FFFF);
        assert_eq!(long.long_invoke_id, 0x00FF_FFFF);
    }
}
