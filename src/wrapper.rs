//! The IP wrapper for DLMS over TCP/UDP.
//!
//! Every xDLMS payload is prefixed by eight bytes: version, source and
//! destination wrapper ports, and the payload length. The wrapper ports
//! provide addressing beyond the TCP/UDP port since one physical device
//! can host several logical devices. No LLC header is used on this
//! transport.

use alloc::vec::Vec;

use nom::{
    IResult,
    error::{Error as NomError, ErrorKind},
    number::streaming::be_u16,
};

use crate::data::ByteBuffer;

/// The only wrapper version in use.
pub const WRAPPER_VERSION: u16 = 1;

/// The eight-byte wrapper header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrapperHeader {
    pub source_wport: u16,
    pub destination_wport: u16,
    pub length: u16,
}

impl WrapperHeader {
    pub const LENGTH: usize = 8;

    pub const fn new(source_wport: u16, destination_wport: u16, length: u16) -> Self {
        Self { source_wport, destination_wport, length }
    }

    pub fn encode(&self) -> [u8; Self::LENGTH] {
        let mut out = [0u8; Self::LENGTH];
        out[0..2].copy_from_slice(&WRAPPER_VERSION.to_be_bytes());
        out[2..4].copy_from_slice(&self.source_wport.to_be_bytes());
        out[4..6].copy_from_slice(&self.destination_wport.to_be_bytes());
        out[6..8].copy_from_slice(&self.length.to_be_bytes());
        out
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, version) = be_u16(input)?;
        if version != WRAPPER_VERSION {
            return Err(nom::Err::Error(NomError::new(input, ErrorKind::Verify)));
        }
        let (input, source_wport) = be_u16(input)?;
        let (input, destination_wport) = be_u16(input)?;
        let (input, length) = be_u16(input)?;
        Ok((input, Self { source_wport, destination_wport, length }))
    }

    /// Wraps a payload: header then data.
    pub fn wrap(source_wport: u16, destination_wport: u16, data: &[u8]) -> Vec<u8> {
        let header = Self::new(source_wport, destination_wport, data.len() as u16);
        let mut out = Vec::with_capacity(Self::LENGTH + data.len());
        out.push_bytes(&header.encode());
        out.push_bytes(data);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_encoding() {
        let header = WrapperHeader::new(16, 1, 0x001A);
        assert_eq!(header.encode(), [0x00, 0x01, 0x00, 0x10, 0x00, 0x01, 0x00, 0x1A]);
    }

    #[test]
    fn test_header_roundtrip() {
        let header = WrapperHeader::new(1, 17, 999);
        let encoded = header.encode();
        let (rest, parsed) = WrapperHeader::parse(&encoded).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_wrong_version_is_rejected() {
        let bytes = [0x00, 0x02, 0x00, 0x10, 0x00, 0x01, 0x00, 0x1A];
        assert!(WrapperHeader::parse(&bytes).is_err());
    }

    #[test]
    fn test_short_header_is_incomplete() {
        assert!(matches!(
            WrapperHeader::parse(&[0x00, 0x01, 0x00]),
            Err(nom::Err::Incomplete(_))
        ));
    }

    #[test]
    fn test_wrap() {
        let wrapped = WrapperHeader::wrap(16, 1, &[0xC0, 0x01, 0xC1]);
        assert_eq!(&wrapped[..8], &[0x00, 0x01, 0x00, 0x10, 0x00, 0x01, 0x00, 0x03]);
        assert_eq!(&wrapped[8..], &[0xC0, 0x01, 0xC1]);
    }
}
