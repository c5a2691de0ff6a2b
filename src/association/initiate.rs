//! xDLMS InitiateRequest and InitiateResponse APDUs
//!
//! These APDUs travel in the user-information field of AARQ/AARE (and of
//! RLRQ/RLRE on ciphered associations). Their encoding is A-XDR except for
//! the conformance block, which is a BER bit string with the two-byte tag
//! `5F 1F` (APPLICATION 31) embedded in the middle of the A-XDR stream.
//!
//! On protected associations the cleartext Initiate APDU is replaced by a
//! global-cipher variant carrying the security header and ciphertext.
//!
//! Reference: DLMS Green Book Ed. 12, Section 11.2 and Tables 134-135

use alloc::vec::Vec;
use core::fmt;

use nom::{
    IResult, Parser,
    bytes::streaming::{tag, take},
    error::{Error as NomError, ErrorKind},
    number::streaming::{be_u16, be_u32, u8 as nom_u8},
};

use super::Conformance;
use crate::axdr;
use crate::data::ByteBuffer;
use crate::security_control::SecurityControl;

/// Default DLMS version number (version 6)
pub const DLMS_VERSION: u8 = 6;

/// VAA name closing every LN InitiateResponse
pub const VAA_NAME_LN: u16 = 0x0007;

/// BER tag of the conformance block: APPLICATION 31, two-byte form.
const CONFORMANCE_TAG: [u8; 2] = [0x5F, 0x1F];

fn parse_conformance(input: &[u8]) -> IResult<&[u8], Conformance> {
    let (input, _) = tag(&CONFORMANCE_TAG[..]).parse(input)?;
    let (input, length) = nom_u8(input)?;
    if length != 4 {
        return Err(nom::Err::Error(NomError::new(input, ErrorKind::LengthValue)));
    }
    // One unused-bits byte, then the three data bytes.
    let (input, _unused_bits) = nom_u8(input)?;
    let (input, bytes) = take(3usize)(input)?;
    Ok((input, Conformance::from_bytes([bytes[0], bytes[1], bytes[2]])))
}

fn encode_conformance(buffer: &mut Vec<u8>, conformance: Conformance) {
    buffer.push_bytes(&CONFORMANCE_TAG);
    buffer.push_u8(0x04);
    buffer.push_u8(0x00); // no unused bits
    buffer.push_bytes(&conformance.to_bytes());
}

/// xDLMS InitiateRequest APDU (tag 1)
///
/// Proposes the association parameters: conformance, PDU size, DLMS version
/// and optionally a dedicated key for dedicated ciphering.
#[derive(Debug, Clone, PartialEq)]
pub struct InitiateRequest {
    /// Key for dedicated ciphering of this association, wrapped for
    /// transport inside the (then mandatory) ciphered AARQ.
    pub dedicated_key: Option<Vec<u8>>,
    /// Whether the server may respond. True in practice.
    pub response_allowed: bool,
    pub proposed_quality_of_service: Option<u8>,
    pub proposed_dlms_version_number: u8,
    pub proposed_conformance: Conformance,
    pub client_max_receive_pdu_size: u16,
}

impl InitiateRequest {
    pub const TAG: u8 = 1;

    pub fn new(conformance: Conformance, max_pdu_size: u16) -> Self {
        Self {
            dedicated_key: None,
            response_allowed: true,
            proposed_quality_of_service: None,
            proposed_dlms_version_number: DLMS_VERSION,
            proposed_conformance: conformance,
            client_max_receive_pdu_size: max_pdu_size,
        }
    }

    /// InitiateRequest with the default LN client conformance.
    pub fn new_ln(max_pdu_size: u16) -> Self {
        Self::new(Conformance::DEFAULT_CLIENT, max_pdu_size)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push_u8(Self::TAG);

        // dedicated-key: OPTIONAL OCTET STRING
        match &self.dedicated_key {
            Some(key) => {
                buf.push_u8(0x01);
                axdr::encode_octet_string(&mut buf, key);
            }
            None => buf.push_u8(0x00),
        }

        // response-allowed: BOOLEAN DEFAULT TRUE
        if self.response_allowed {
            buf.push_u8(0x00);
        } else {
            buf.push_u8(0x01);
            buf.push_u8(0x00);
        }

        // proposed-quality-of-service: OPTIONAL Integer8
        match self.proposed_quality_of_service {
            Some(qos) => {
                buf.push_u8(0x01);
                buf.push_u8(qos);
            }
            None => buf.push_u8(0x00),
        }

        buf.push_u8(self.proposed_dlms_version_number);
        encode_conformance(&mut buf, self.proposed_conformance);
        buf.push_u16(self.client_max_receive_pdu_size);
        buf
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, _) = tag(&[Self::TAG][..]).parse(input)?;

        let (input, has_dedicated_key) = axdr::parse_presence(input)?;
        let (input, dedicated_key) = if has_dedicated_key {
            let (input, key) = axdr::parse_octet_string(input)?;
            (input, Some(key.to_vec()))
        } else {
            (input, None)
        };

        let (input, response_allowed_given) = axdr::parse_presence(input)?;
        let (input, response_allowed) = if response_allowed_given {
            let (input, value) = nom_u8(input)?;
            (input, value != 0)
        } else {
            (input, true)
        };

        let (input, has_qos) = axdr::parse_presence(input)?;
        let (input, proposed_quality_of_service) = if has_qos {
            let (input, qos) = nom_u8(input)?;
            (input, Some(qos))
        } else {
            (input, None)
        };

        let (input, proposed_dlms_version_number) = nom_u8(input)?;
        let (input, proposed_conformance) = parse_conformance(input)?;
        let (input, client_max_receive_pdu_size) = be_u16(input)?;

        Ok((
            input,
            Self {
                dedicated_key,
                response_allowed,
                proposed_quality_of_service,
                proposed_dlms_version_number,
                proposed_conformance,
                client_max_receive_pdu_size,
            },
        ))
    }
}

impl fmt::Display for InitiateRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InitiateRequest(v{}, conf=0x{:06X}, max_pdu={})",
            self.proposed_dlms_version_number,
            self.proposed_conformance.bits(),
            self.client_max_receive_pdu_size
        )
    }
}

/// xDLMS InitiateResponse APDU (tag 8)
///
/// Carries the parameters the meter actually granted. The trailing VAA name
/// is fixed at `00 07` for LN referencing.
#[derive(Debug, Clone, PartialEq)]
pub struct InitiateResponse {
    pub negotiated_quality_of_service: Option<u8>,
    pub negotiated_dlms_version_number: u8,
    pub negotiated_conformance: Conformance,
    pub server_max_receive_pdu_size: u16,
}

impl InitiateResponse {
    pub const TAG: u8 = 8;

    pub fn new(conformance: Conformance, max_pdu_size: u16) -> Self {
        Self {
            negotiated_quality_of_service: None,
            negotiated_dlms_version_number: DLMS_VERSION,
            negotiated_conformance: conformance,
            server_max_receive_pdu_size: max_pdu_size,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push_u8(Self::TAG);

        match self.negotiated_quality_of_service {
            Some(qos) => {
                buf.push_u8(0x01);
                buf.push_u8(qos);
            }
            None => buf.push_u8(0x00),
        }

        buf.push_u8(self.negotiated_dlms_version_number);
        encode_conformance(&mut buf, self.negotiated_conformance);
        buf.push_u16(self.server_max_receive_pdu_size);
        buf.push_u16(VAA_NAME_LN);
        buf
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, _) = tag(&[Self::TAG][..]).parse(input)?;

        let (input, has_qos) = axdr::parse_presence(input)?;
        let (input, negotiated_quality_of_service) = if has_qos {
            let (input, qos) = nom_u8(input)?;
            (input, Some(qos))
        } else {
            (input, None)
        };

        let (input, negotiated_dlms_version_number) = nom_u8(input)?;
        let (input, negotiated_conformance) = parse_conformance(input)?;
        let (input, server_max_receive_pdu_size) = be_u16(input)?;

        let (input, vaa_name) = be_u16(input)?;
        if vaa_name != VAA_NAME_LN {
            return Err(nom::Err::Error(NomError::new(input, ErrorKind::Verify)));
        }

        Ok((
            input,
            Self {
                negotiated_quality_of_service,
                negotiated_dlms_version_number,
                negotiated_conformance,
                server_max_receive_pdu_size,
            },
        ))
    }
}

impl fmt::Display for InitiateResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InitiateResponse(v{}, conf=0x{:06X}, max_pdu={})",
            self.negotiated_dlms_version_number,
            self.negotiated_conformance.bits(),
            self.server_max_receive_pdu_size
        )
    }
}

/// Ciphered InitiateRequest (tag 33): security control, invocation counter
/// and the AES-GCM output of the cleartext InitiateRequest.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalCipherInitiateRequest {
    pub security_control: SecurityControl,
    pub invocation_counter: u32,
    pub ciphered_text: Vec<u8>,
}

/// Ciphered InitiateResponse (tag 40), mirror of
/// [`GlobalCipherInitiateRequest`].
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalCipherInitiateResponse {
    pub security_control: SecurityControl,
    pub invocation_counter: u32,
    pub ciphered_text: Vec<u8>,
}

macro_rules! global_cipher_initiate {
    ($name:ident, $tag:expr) => {
        impl $name {
            pub const TAG: u8 = $tag;

            pub fn encode(&self) -> Vec<u8> {
                let mut buf = Vec::new();
                buf.push_u8(Self::TAG);
                axdr::encode_length(&mut buf, 1 + 4 + self.ciphered_text.len());
                buf.push_u8(self.security_control.to_byte());
                buf.push_u32(self.invocation_counter);
                buf.push_bytes(&self.ciphered_text);
                buf
            }

            pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
                let (input, _) = tag(&[Self::TAG][..]).parse(input)?;
                let (input, length) = axdr::parse_length(input)?;
                if length < 5 {
                    return Err(nom::Err::Error(NomError::new(input, ErrorKind::LengthValue)));
                }
                let (input, security_control) = SecurityControl::parse(input)?;
                let (input, invocation_counter) = be_u32(input)?;
                let (input, ciphered_text) = take(length - 5)(input)?;
                Ok((
                    input,
                    Self { security_control, invocation_counter, ciphered_text: ciphered_text.to_vec() },
                ))
            }
        }
    };
}

global_cipher_initiate!(GlobalCipherInitiateRequest, 33);
global_cipher_initiate!(GlobalCipherInitiateResponse, 40);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initiate_request_default_ln_bytes() {
        // User-information content of the Green Book minimal AARQ example.
        let expected: [u8; 14] = [
            0x01, 0x00, 0x00, 0x00, 0x06, 0x5F, 0x1F, 0x04, 0x00, 0x00, 0x1E, 0x1D, 0xFF, 0xFF,
        ];
        let request = InitiateRequest::new_ln(0xFFFF);
        assert_eq!(request.encode(), expected);

        let (rest, parsed) = InitiateRequest::parse(&expected).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_initiate_request_roundtrip_with_dedicated_key() {
        let mut request = InitiateRequest::new_ln(0x0400);
        request.dedicated_key = Some(alloc::vec![0xAA; 16]);

        let encoded = request.encode();
        assert_eq!(encoded[1], 0x01); // dedicated key present
        assert_eq!(encoded[2], 16); // key length

        let (rest, parsed) = InitiateRequest::parse(&encoded).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_initiate_request_response_not_allowed() {
        let mut request = InitiateRequest::new_ln(0xFFFF);
        request.response_allowed = false;
        let encoded = request.encode();
        let (_, parsed) = InitiateRequest::parse(&encoded).unwrap();
        assert!(!parsed.response_allowed);
    }

    #[test]
    fn test_initiate_response_green_book_bytes() {
        // User-information content of the accepted AARE example:
        // negotiated conformance 00 50 1F, max pdu 500.
        let bytes: [u8; 14] = [
            0x08, 0x00, 0x06, 0x5F, 0x1F, 0x04, 0x00, 0x00, 0x50, 0x1F, 0x01, 0xF4, 0x00, 0x07,
        ];
        let (rest, response) = InitiateResponse::parse(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(response.negotiated_dlms_version_number, 6);
        assert_eq!(response.server_max_receive_pdu_size, 500);
        assert!(response.negotiated_conformance.contains(Conformance::GET));
        assert!(response.negotiated_conformance.contains(Conformance::PRIORITY_MANAGEMENT));

        assert_eq!(response.encode(), bytes);
    }

    #[test]
    fn test_initiate_response_rejects_wrong_vaa_name() {
        let bytes: [u8; 14] = [
            0x08, 0x00, 0x06, 0x5F, 0x1F, 0x04, 0x00, 0x00, 0x50, 0x1F, 0x01, 0xF4, 0x00, 0x01,
        ];
        assert!(InitiateResponse::parse(&bytes).is_err());
    }

    #[test]
    fn test_global_cipher_initiate_request_parse() {
        // Taken from the ciphered AARQ example: tag 33, length 0x30, then
        // SC=0x30, IC=0x01234567 and 43 bytes of ciphertext.
        let mut bytes = alloc::vec![0x21, 0x30, 0x30, 0x01, 0x23, 0x45, 0x67];
        bytes.extend_from_slice(&[0xAB; 43]);

        let (rest, parsed) = GlobalCipherInitiateRequest::parse(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed.security_control.to_byte(), 0x30);
        assert_eq!(parsed.invocation_counter, 0x01234567);
        assert_eq!(parsed.ciphered_text.len(), 43);
        assert_eq!(parsed.encode(), bytes);
    }

    #[test]
    fn test_global_cipher_initiate_response_roundtrip() {
        let response = GlobalCipherInitiateResponse {
            security_control: SecurityControl::with_protection(0, true, true),
            invocation_counter: 0x11223344,
            ciphered_text: alloc::vec![1, 2, 3, 4, 5],
        };
        let encoded = response.encode();
        assert_eq!(encoded[0], 40);
        let (rest, parsed) = GlobalCipherInitiateResponse::parse(&encoded).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, response);
    }
}
