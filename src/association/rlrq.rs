//! RLRQ APDU (A-Release Request)
//!
//! Sent by the client to gracefully release the application association.
//! On a ciphered association the user-information field must carry a
//! ciphered InitiateRequest.
//!
//! Reference: DLMS Green Book Ed. 12, Section 11 and Table 146

use alloc::vec::Vec;
use core::fmt;

use nom::{
    IResult,
    error::{Error as NomError, ErrorKind},
};

use super::RequestUserInformation;
use super::ber::{
    TagClass, TagType, encode_application, encode_context_specific, encode_octet_string,
    parse_field, parse_length, parse_octet_string, parse_tag,
};
use crate::enumerations::ReleaseRequestReason;

/// RLRQ APDU (A-Release Request) - Tag 0x62
#[derive(Debug, Clone, PartialEq)]
pub struct RlrqApdu {
    /// Reason for the release - optional
    pub reason: Option<ReleaseRequestReason>,
    /// InitiateRequest, ciphered on protected associations - optional
    pub user_information: Option<RequestUserInformation>,
}

impl RlrqApdu {
    /// A normal release without user information.
    pub fn new() -> Self {
        Self { reason: Some(ReleaseRequestReason::Normal), user_information: None }
    }

    pub fn with_reason(reason: ReleaseRequestReason) -> Self {
        Self { reason: Some(reason), user_information: None }
    }

    /// Encode to BER with APPLICATION tag 2 (0x62).
    pub fn encode(&self) -> Vec<u8> {
        let mut content = Vec::new();

        // 80: reason, context-specific primitive 0
        if let Some(reason) = self.reason {
            content.extend(encode_context_specific(0, TagType::Primitive, &[reason as u8]));
        }

        // BE: user-information, octet string holding the xDLMS APDU
        if let Some(ref user_info) = self.user_information {
            let octets = encode_octet_string(&user_info.encode());
            content.extend(encode_context_specific(30, TagType::Constructed, &octets));
        }

        encode_application(2, TagType::Constructed, &content)
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, (class, tag_type, tag_number)) = parse_tag(input)?;
        if class != TagClass::Application || tag_type != TagType::Constructed || tag_number != 2 {
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
                    reason = Some(ReleaseRequestReason::try_from(value).map_err(|_| {
                        nom::Err::Error(NomError::new(field, ErrorKind::Tag))
                    })?);
                }
                0xBE => {
                    let (_, octets) = parse_octet_string(field)?;
                    let (_, info) = RequestUserInformation::parse(octets)?;
                    user_information = Some(info);
                }
                _ => {}
            }
        }

        Ok((remaining, Self { reason, user_information }))
    }
}

impl Default for RlrqApdu {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RlrqApdu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RLRQ(reason={:?})", self.reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::association::initiate::{GlobalCipherInitiateRequest, InitiateRequest};
    use crate::security_control::SecurityControl;

    #[test]
    fn test_encode_normal_release() {
        let rlrq = RlrqApdu::new();
        assert_eq!(rlrq.encode(), alloc::vec![0x62, 0x03, 0x80, 0x01, 0x00]);
    }

    #[test]
    fn test_parse_normal_release() {
        let (rest, rlrq) = RlrqApdu::parse(&[0x62, 0x03, 0x80, 0x01, 0x00]).unwrap();
        assert!(rest.is_empty());
        assert_eq!(rlrq.reason, Some(ReleaseRequestReason::Normal));
        assert!(rlrq.user_information.is_none());
    }

    #[test]
    fn test_parse_empty_rlrq() {
        let (rest, rlrq) = RlrqApdu::parse(&[0x62, 0x00]).unwrap();
        assert!(rest.is_empty());
        assert_eq!(rlrq.reason, None);
    }

    #[test]
    fn test_roundtrip_with_cleartext_user_information() {
        let rlrq = RlrqApdu {
            reason: Some(ReleaseRequestReason::Urgent),
            user_information: Some(RequestUserInformation::Initiate(InitiateRequest::new_ln(
                0xFFFF,
            ))),
        };
        let encoded = rlrq.encode();
        let (rest, parsed) = RlrqApdu::parse(&encoded).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, rlrq);
    }

    #[test]
    fn test_roundtrip_with_ciphered_user_information() {
        let rlrq = RlrqApdu {
            reason: Some(ReleaseRequestReason::Normal),
            user_information: Some(RequestUserInformation::Ciphered(
                GlobalCipherInitiateRequest {
                    security_control: SecurityControl::with_protection(0, true, true),
                    invocation_counter: 99,
                    ciphered_text: alloc::vec![0xAB; 26],
                },
            )),
        };
        let encoded = rlrq.encode();
        let (rest, parsed) = RlrqApdu::parse(&encoded).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, rlrq);
    }

    #[test]
    fn test_rejects_wrong_tag() {
        assert!(RlrqApdu::parse(&[0x63, 0x00]).is_err());
    }
}
