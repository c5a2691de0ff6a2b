//! RLRE APDU (A-Release Response)
//!
//! Confirms the release of the association. On a ciphered association the
//! user-information carries a cleartext InitiateResponse.

use alloc::vec::Vec;
use core::fmt;

use nom::{
    IResult,
    error::{Error as NomError, ErrorKind},
};

use super::ResponseUserInformation;
use super::ber::{
    TagClass, TagType, encode_application, encode_context_specific, encode_octet_string,
    parse_field, parse_length, parse_octet_string, parse_tag,
};
use crate::enumerations::ReleaseResponseReason;

/// RLRE APDU (A-Release Response) - Tag 0x63
#[derive(Debug, Clone, PartialEq)]
pub struct RlreApdu {
    /// Reason given by the meter - optional
    pub reason: Option<ReleaseResponseReason>,
    /// InitiateResponse on ciphered associations - optional
    pub user_information: Option<ResponseUserInformation>,
}

impl RlreApdu {
    pub fn new(reason: ReleaseResponseReason) -> Self {
        Self { reason: Some(reason), user_information: None }
    }

    /// Encode to BER with APPLICATION tag 3 (0x63).
    pub fn encode(&self) -> Vec<u8> {
        let mut content = Vec::new();

        if let Some(reason) = self.reason {
            content.extend(encode_context_specific(0, TagType::Primitive, &[reason as u8]));
        }

        if let Some(ref user_info) = self.user_information {
            let octets = encode_octet_string(&user_info.encode());
            content.extend(encode_context_specific(30, TagType::Constructed, &octets));
        }

        encode_application(3, TagType::Constructed, &content)
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, (class, tag_type, tag_number)) = parse_tag(input)?;
        if class != TagClass::Application || tag_type != TagType::Constructed || tag_number != 3 {
            return Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag)));
        }

        let (input, length) = parse_length(input)?;
        let (remaining, mut content) = nom::bytes::streaming::take(length)(input)?;

        let mut reason = None;
        let mut user_information = None;

        while !content.is_empty() {
            let (rest, (field_tag, field)) = parse_field(content)?;
            content = rest;

            match field_tag {
                0x80 => {
                    let value =
                        *field.first().ok_or(nom::Err::Error(NomError::new(field, ErrorKind::Eof)))?;
                    reason = Some(ReleaseResponseReason::try_from(value).map_err(|_| {
                        nom::Err::Error(NomError::new(field, ErrorKind::Tag))
                    })?);
                }
                0xBE => {
                    let (_, octets) = parse_octet_string(field)?;
                    let (_, info) = ResponseUserInformation::parse(octets)?;
                    user_information = Some(info);
                }
                _ => {}
            }
        }

        Ok((remaining, Self { reason, user_information }))
    }
}

impl fmt::Display for RlreApdu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RLRE(reason={:?})", self.reason)
    }
}
