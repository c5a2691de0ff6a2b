//! General global/dedicated ciphering APDUs (tags 219 and 220).
//!
//! Either wrapper carries a complete ciphered xDLMS APDU together with the
//! sender system title and the security header (security-control byte and
//! invocation counter). Tag 219 selects the global unicast key, tag 220
//! the dedicated session key.
//!
//! Wire format: tag, octet-string(system-title), octet-string(security
//! control byte, invocation counter, ciphered text).

use alloc::vec::Vec;
use core::fmt;

use nom::{
    IResult, Parser,
    bytes::streaming::{tag, take},
    combinator::fail,
    multi::fill,
    number::streaming::{be_u32, u8 as nom_u8},
};

use crate::axdr;
use crate::data::ByteBuffer;
use crate::security_control::SecurityControl;

/// Which key a ciphered APDU was protected with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherKey {
    Global,
    Dedicated,
}

/// A general-glo-ciphering (219) or general-ded-ciphering (220) APDU.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneralGlobalCipher {
    /// Which key the ciphered text is protected with, selecting the tag.
    pub key: CipherKey,
    /// System title of the sender (8 octets).
    pub system_title: [u8; 8],
    pub security_control: SecurityControl,
    pub invocation_counter: u32,
    /// Ciphertext followed by the 12-byte GCM tag.
    pub ciphered_text: Vec<u8>,
}

impl GeneralGlobalCipher {
    pub const TAG: u8 = 219;
    pub const DEDICATED_TAG: u8 = 220;

    pub fn new(
        key: CipherKey,
        system_title: [u8; 8],
        security_control: SecurityControl,
        invocation_counter: u32,
        ciphered_text: Vec<u8>,
    ) -> Self {
        Self { key, system_title, security_control, invocation_counter, ciphered_text }
    }

    pub fn tag_byte(&self) -> u8 {
        match self.key {
            CipherKey::Global => Self::TAG,
            CipherKey::Dedicated => Self::DEDICATED_TAG,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push_u8(self.tag_byte());
        axdr::encode_octet_string(&mut out, &self.system_title);
        axdr::encode_length(&mut out, 1 + 4 + self.ciphered_text.len());
        out.push_u8(self.security_control.to_byte());
        out.push_u32(self.invocation_counter);
        out.push_bytes(&self.ciphered_text);
        out
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, apdu_tag) = nom_u8(input)?;
        let key = match apdu_tag {
            Self::TAG => CipherKey::Global,
            Self::DEDICATED_TAG => CipherKey::Dedicated,
            _ => return fail().parse(input),
        };
        Self::parse_body(input, key)
    }

    fn parse_body(input: &[u8], key: CipherKey) -> IResult<&[u8], Self> {
        // System title is an octet string of exactly 8 bytes.
        let (input, _) = tag(&[8u8][..]).parse(input)?;
        let mut system_title = [0u8; 8];
        let (input, _) = fill(nom_u8, &mut system_title).parse(input)?;

        let (input, payload_len) = axdr::parse_length(input)?;
        if payload_len < 5 {
            return fail().parse(input);
        }

        // Green Book 9.2.7.2.4.1: security header then ciphered text.
        let (input, security_control) = SecurityControl::parse(input)?;
        let (input, invocation_counter) = be_u32(input)?;
        let (input, ciphered_text) = take(payload_len - 5)(input)?;

        Ok((
            input,
            Self {
                key,
                system_title,
                security_control,
                invocation_counter,
                ciphered_text: ciphered_text.to_vec(),
            },
        ))
    }
}

impl fmt::Display for GeneralGlobalCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GeneralGlobalCipher({:?}, ic={}, {} bytes)",
            self.key,
            self.invocation_counter,
            self.ciphered_text.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        #[rustfmt::skip]
        let input = [
            0xDB,                                           // general-glo-ciphering
            0x08,                                           // system title length
            0x4B, 0x46, 0x4D, 0x10, 0x20, 0x01, 0x12, 0xA9, // system title
            0x0A,                                           // payload length
            0x30,                                           // security control
            0x00, 0x00, 0x00, 0x01,                         // invocation counter
            0xAA, 0xBB, 0xCC, 0xDD, 0xEE,                   // ciphered text
        ];

        let (remaining, apdu) = GeneralGlobalCipher::parse(&input).unwrap();
        assert!(remaining.is_empty());
        assert_eq!(apdu.key, CipherKey::Global);
        assert_eq!(apdu.system_title, [0x4B, 0x46, 0x4D, 0x10, 0x20, 0x01, 0x12, 0xA9]);
        assert!(apdu.security_control.authentication());
        assert!(apdu.security_control.encryption());
        assert_eq!(apdu.invocation_counter, 1);
        assert_eq!(apdu.ciphered_text, alloc::vec![0xAA, 0xBB, 0xCC, 0xDD, 0xEE]);
    }

    #[test]
    fn test_dedicated_tag() {
        let apdu = GeneralGlobalCipher::new(
            CipherKey::Dedicated,
            [1, 2, 3, 4, 5, 6, 7, 8],
            SecurityControl::with_protection(0, true, true),
            7,
            alloc::vec![0x11; 20],
        );
        let encoded = apdu.encode();
        assert_eq!(encoded[0], 0xDC);
        let (rest, parsed) = GeneralGlobalCipher::parse(&encoded).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, apdu);
    }

    #[test]
    fn test_roundtrip_long_payload() {
        // Payloads above 127 bytes switch to the multi-byte length form.
        let apdu = GeneralGlobalCipher::new(
            CipherKey::Global,
            [0xAA; 8],
            SecurityControl::with_protection(0, true, true),
            0xFFFF_FFFF,
            alloc::vec![0x5A; 300],
        );
        let encoded = apdu.encode();
        let (rest, parsed) = GeneralGlobalCipher::parse(&encoded).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, apdu);
    }

    #[test]
    fn test_parse_with_remaining_input() {
        #[rustfmt::skip]
        let input = [
            0xDB,
            0x08,
            0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08,
            0x06,
            0x10,
            0x00, 0x00, 0x00, 0x01,
            0xAA,
            0xFF, 0xFF, // trailing bytes stay in the input
        ];
        let (remaining, apdu) = GeneralGlobalCipher::parse(&input).unwrap();
        assert_eq!(remaining, &[0xFF, 0xFF]);
        assert_eq!(apdu.ciphered_text, alloc::vec![0xAA]);
    }

    #[test]
    fn test_too_short_payload_is_rejected() {
        let input = [0xDB, 0x08, 0, 0, 0, 0, 0, 0, 0, 0, 0x04, 0x30, 0x00, 0x00, 0x00];
        assert!(GeneralGlobalCipher::parse(&input).is_err());
    }

    #[test]
    fn test_wrong_system_title_length_is_rejected() {
        let input = [0xDB, 0x07, 0, 0, 0, 0, 0, 0, 0, 0x05, 0x30, 0, 0, 0, 1];
        assert!(GeneralGlobalCipher::parse(&input).is_err());
    }
}
