//! A-XDR length codec (IEC 61334-6).
//!
//! A-XDR trims APDU sizes by leaving out whatever both peers already know.
//! The only self-describing part is the variable-length integer used as a
//! length (or element count) prefix:
//!
//! - high bit clear: the length is the remaining 7 bits of that byte,
//! - high bit set: the remaining 7 bits give the number of following bytes
//!   that carry the big-endian length.
//!
//! Optional values are preceded by a presence byte (`0x00` absent, `0x01`
//! value follows); defaulted values use the same byte to select the baked-in
//! default. The per-APDU parsers in this crate spell those rules out with
//! the helpers below instead of a runtime schema interpreter.

use alloc::vec::Vec;

use nom::{
    IResult,
    bytes::streaming::take,
    error::{Error, ErrorKind},
    number::streaming::u8,
};

/// Appends an A-XDR encoded length to `buffer`.
pub fn encode_length(buffer: &mut Vec<u8>, length: usize) {
    if length < 0x80 {
        buffer.push(length as u8);
    } else if length <= 0xFF {
        buffer.push(0x81);
        buffer.push(length as u8);
    } else if length <= 0xFFFF {
        buffer.push(0x82);
        buffer.extend_from_slice(&(length as u16).to_be_bytes());
    } else {
        buffer.push(0x84);
        buffer.extend_from_slice(&(length as u32).to_be_bytes());
    }
}

/// Parses an A-XDR length prefix.
pub fn parse_length(input: &[u8]) -> IResult<&[u8], usize> {
    let (input, first) = u8(input)?;
    if first & 0x80 == 0 {
        return Ok((input, first as usize));
    }
    let count = (first & 0x7F) as usize;
    if count == 0 || count > 4 {
        return Err(nom::Err::Error(Error::new(input, ErrorKind::LengthValue)));
    }
    let (input, length_bytes) = take(count)(input)?;
    let mut length = 0usize;
    for byte in length_bytes {
        length = (length << 8) | *byte as usize;
    }
    Ok((input, length))
}

/// Parses a length-prefixed octet string.
pub fn parse_octet_string(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, length) = parse_length(input)?;
    take(length)(input)
}

/// Appends a length-prefixed octet string.
pub fn encode_octet_string(buffer: &mut Vec<u8>, data: &[u8]) {
    encode_length(buffer, data.len());
    buffer.extend_from_slice(data);
}

/// Parses the presence byte of an optional value. `0x00` means absent,
/// `0x01` means a value follows; anything else is malformed.
pub fn parse_presence(input: &[u8]) -> IResult<&[u8], bool> {
    let (input, byte) = u8(input)?;
    match byte {
        0x00 => Ok((input, false)),
        0x01 => Ok((input, true)),
        _ => Err(nom::Err::Error(Error::new(input, ErrorKind::Tag))),
    }
}
