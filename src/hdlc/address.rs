//! HDLC address encoding.
//!
//! A client address is always one byte. A server address addresses a
//! logical device and optionally a physical device on a multi-drop line,
//! giving 1, 2 or 4 bytes on the wire. Every 7-bit group is shifted left
//! one bit; the LSB of the final byte is set to mark the end of the
//! address.

use alloc::vec::Vec;

use crate::error::Error;

const ONE_BYTE_MAX: u16 = 0x7F;
const TWO_BYTE_MAX: u16 = 0x3FFF;

/// Which side of the link an address belongs to. Client addresses have the
/// one-byte form, server addresses the split logical/physical form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    Client,
    Server,
}

/// An HDLC station address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HdlcAddress {
    pub logical: u16,
    pub physical: Option<u16>,
    pub kind: AddressKind,
}

impl HdlcAddress {
    /// A one-byte client address. Client logical addresses are 0-127 and
    /// never carry a physical part.
    pub fn client(logical: u16) -> Result<Self, Error> {
        if logical > ONE_BYTE_MAX {
            return Err(Error::Malformed(alloc::format!(
                "client address {logical} exceeds the one byte upper bound"
            )));
        }
        Ok(Self { logical, physical: None, kind: AddressKind::Client })
    }

    /// A server address with a logical and optional physical part, each
    /// 0-0x3FFF.
    pub fn server(logical: u16, physical: Option<u16>) -> Result<Self, Error> {
        if logical > TWO_BYTE_MAX {
            return Err(Error::Malformed(alloc::format!(
                "server logical address {logical} exceeds the two byte upper bound"
            )));
        }
        if let Some(physical) = physical {
            if physical > TWO_BYTE_MAX {
                return Err(Error::Malformed(alloc::format!(
                    "server physical address {physical} exceeds the two byte upper bound"
                )));
            }
        }
        Ok(Self { logical, physical, kind: AddressKind::Server })
    }

    /// The number of bytes this address occupies on the wire.
    pub fn length(&self) -> usize {
        match self.kind {
            AddressKind::Client => 1,
            AddressKind::Server => {
                let wide = self.logical > ONE_BYTE_MAX
                    || self.physical.is_some_and(|physical| physical > ONE_BYTE_MAX);
                match (self.physical.is_some(), wide) {
                    (false, false) => 1,
                    (false, true) => 2,
                    (true, false) => 2,
                    (true, true) => 4,
                }
            }
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.length());
        match (self.kind, self.physical) {
            (AddressKind::Client, _) => {
                out.push(((self.logical as u8) << 1) | 0x01);
            }
            (AddressKind::Server, None) => {
                if self.logical > ONE_BYTE_MAX {
                    let (higher, lower) = split_address(self.logical);
                    out.push(higher);
                    out.push(lower | 0x01);
                } else {
                    out.push(((self.logical as u8) << 1) | 0x01);
                }
            }
            (AddressKind::Server, Some(physical)) => {
                if self.logical > ONE_BYTE_MAX || physical > ONE_BYTE_MAX {
                    let (logical_higher, logical_lower) = split_address(self.logical);
                    let (physical_higher, physical_lower) = split_address(physical);
                    out.push(logical_higher);
                    out.push(logical_lower);
                    out.push(physical_higher);
                    out.push(physical_lower | 0x01);
                } else {
                    out.push((self.logical as u8) << 1);
                    out.push(((physical as u8) << 1) | 0x01);
                }
            }
        }
        out
    }
}

/// Splits a 14-bit address into the shifted upper and lower wire bytes.
fn split_address(address: u16) -> (u8, u8) {
    let lower = ((address & 0x007F) << 1) as u8;
    let higher = ((address & 0x3F80) >> 6) as u8;
    (higher, lower)
}

/// An address as found in a received frame: the values plus how many bytes
/// it covered. The frame bytes do not say which side sent it, so there is
/// no [`AddressKind`] here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedAddress {
    pub logical: u16,
    pub physical: Option<u16>,
    pub length: usize,
}

/// Scans the destination and source addresses out of a raw frame,
/// starting at the byte after the format field (offset 3 including the
/// opening flag).
pub fn find_addresses(frame_bytes: &[u8]) -> Result<(ParsedAddress, ParsedAddress), Error> {
    let (destination, consumed) = parse_address_at(frame_bytes, 3)?;
    let (source, _) = parse_address_at(frame_bytes, 3 + consumed)?;
    Ok((destination, source))
}

fn parse_address_at(frame_bytes: &[u8], offset: usize) -> Result<(ParsedAddress, usize), Error> {
    let mut bytes = [0u8; 4];
    let mut length = None;
    for index in 0..4 {
        let byte = *frame_bytes
            .get(offset + index)
            .ok_or_else(|| Error::Malformed(alloc::format!("frame too short for address")))?;
        bytes[index] = byte;
        if byte & 0x01 != 0 {
            length = Some(index + 1);
            break;
        }
    }
    // The end marker must show up within 1, 2 or 4 bytes.
    let address = match length {
        Some(1) => ParsedAddress { logical: (bytes[0] >> 1) as u16, physical: None, length: 1 },
        Some(2) => ParsedAddress {
            logical: (bytes[0] >> 1) as u16,
            physical: Some((bytes[1] >> 1) as u16),
            length: 2,
        },
        Some(4) => ParsedAddress {
            logical: merge_two_byte(bytes[0], bytes[1]),
            physical: Some(merge_two_byte(bytes[2], bytes[3])),
            length: 4,
        },
        _ => {
            return Err(Error::Malformed(alloc::format!(
                "HDLC address has no end marker within 4 bytes"
            )));
        }
    };
    Ok((address, address.length))
}

fn merge_two_byte(upper: u8, lower: u8) -> u16 {
    (((upper >> 1) as u16) << 7) | ((lower >> 1) as u16)
}
