//! Association layer - the ACSE APDUs establishing and releasing a session.
//!
//! The association handshake works in two BER-encoded envelopes:
//! 1. The client sends an AARQ (tag 0x60) proposing application context,
//!    authentication mechanism and - inside its user-information field -
//!    the A-XDR encoded xDLMS InitiateRequest with conformance and PDU size.
//! 2. The meter answers with an AARE (tag 0x61) carrying the association
//!    result, diagnostics and the negotiated InitiateResponse.
//!
//! RLRQ (0x62) / RLRE (0x63) release the association again. On protected
//! connections the Initiate APDUs inside user-information are replaced by
//! their global-cipher variants.
//!
//! Reference: DLMS Green Book Ed. 12, Section 11

pub use self::{
    aare::AareApdu,
    aarq::AarqApdu,
    conformance::Conformance,
    enums::{
        AcseDiagnostics, AcseServiceUserDiagnostics, ApplicationContextName, AuthenticationValue,
    },
    initiate::{
        DLMS_VERSION, GlobalCipherInitiateRequest, GlobalCipherInitiateResponse, InitiateRequest,
        InitiateResponse, VAA_NAME_LN,
    },
    rlre::RlreApdu,
    rlrq::RlrqApdu,
};

mod aare;
mod aarq;
pub(crate) mod ber;
mod conformance;
mod enums;
mod initiate;
mod rlre;
mod rlrq;

use alloc::vec::Vec;

use nom::{
    IResult,
    error::{Error as NomError, ErrorKind},
};

use crate::confirmed_service_error::ConfirmedServiceError;

/// ASN.1 BER tag for AARQ APDU
pub const AARQ_TAG: u8 = 0x60;

/// ASN.1 BER tag for AARE APDU
pub const AARE_TAG: u8 = 0x61;

/// ASN.1 BER tag for RLRQ APDU
pub const RLRQ_TAG: u8 = 0x62;

/// ASN.1 BER tag for RLRE APDU
pub const RLRE_TAG: u8 = 0x63;

/// The xDLMS APDU inside the user-information field of an AARQ or RLRQ:
/// a cleartext InitiateRequest or its global-cipher form.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestUserInformation {
    Initiate(InitiateRequest),
    Ciphered(GlobalCipherInitiateRequest),
}

impl RequestUserInformation {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Initiate(request) => request.encode(),
            Self::Ciphered(request) => request.encode(),
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        match input.first() {
            Some(&InitiateRequest::TAG) => {
                let (input, request) = InitiateRequest::parse(input)?;
                Ok((input, Self::Initiate(request)))
            }
            Some(&GlobalCipherInitiateRequest::TAG) => {
                let (input, request) = GlobalCipherInitiateRequest::parse(input)?;
                Ok((input, Self::Ciphered(request)))
            }
            _ => Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag))),
        }
    }
}

/// The xDLMS APDU inside the user-information field of an AARE or RLRE:
/// an InitiateResponse (cleartext or ciphered), or a ConfirmedServiceError
/// when the meter did not accept the proposed xDLMS context.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseUserInformation {
    Initiate(InitiateResponse),
    Ciphered(GlobalCipherInitiateResponse),
    Error(ConfirmedServiceError),
}

impl ResponseUserInformation {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Initiate(response) => response.encode(),
            Self::Ciphered(response) => response.encode(),
            Self::Error(error) => error.encode(),
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        match input.first() {
            Some(&InitiateResponse::TAG) => {
                let (input, response) = InitiateResponse::parse(input)?;
                Ok((input, Self::Initiate(response)))
            }
            Some(&GlobalCipherInitiateResponse::TAG) => {
                let (input, response) = GlobalCipherInitiateResponse::parse(input)?;
                Ok((input, Self::Ciphered(response)))
            }
            Some(&ConfirmedServiceError::TAG) => {
                let (input, error) = ConfirmedServiceError::parse(input)?;
                Ok((input, Self::Error(error)))
            }
            _ => Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags() {
        assert_eq!(AARQ_TAG, 0x60);
        assert_eq!(AARE_TAG, 0x61);
        assert_eq!(RLRQ_TAG, 0x62);
        assert_eq!(RLRE_TAG, 0x63);
    }

    #[test]
    fn test_request_user_information_dispatch() {
        let request = InitiateRequest::new_ln(0xFFFF);
        let bytes = request.encode();
        let (_, parsed) = RequestUserInformation::parse(&bytes).unwrap();
        assert_eq!(parsed, RequestUserInformation::Initiate(request));

        assert!(RequestUserInformation::parse(&[0x08, 0x00]).is_err());
    }

    #[test]
    fn test_response_user_information_dispatch() {
        let response = InitiateResponse::new(Conformance::DEFAULT_CLIENT, 500);
        let bytes = response.encode();
        let (_, parsed) = ResponseUserInformation::parse(&bytes).unwrap();
        assert_eq!(parsed, ResponseUserInformation::Initiate(response));

        assert!(ResponseUserInformation::parse(&[0x01, 0x00]).is_err());
    }

    /// Full association handshake: the client encodes an AARQ, the meter
    /// side parses it, answers with an AARE and the client reads back the
    /// negotiated parameters.
    #[test]
    fn test_association_handshake_accepted() {
        let client_aarq = AarqApdu::new_simple_ln(RequestUserInformation::Initiate(
            InitiateRequest::new_ln(0xFFFF),
        ));
        let aarq_bytes = client_aarq.encode();

        let (_, parsed_aarq) = AarqApdu::parse(&aarq_bytes).unwrap();
        let proposed = match parsed_aarq.user_information.unwrap() {
            RequestUserInformation::Initiate(request) => request,
            other => panic!("unexpected user information {other:?}"),
        };

        // The meter grants a subset and a smaller PDU.
        let negotiated = proposed.proposed_conformance & (Conformance::GET | Conformance::SET);
        let aare = AareApdu::new_accepted(
            ApplicationContextName::LogicalNameReferencing,
            ResponseUserInformation::Initiate(InitiateResponse::new(negotiated, 0x0400)),
        );
        let aare_bytes = aare.encode();

        let (_, parsed_aare) = AareApdu::parse(&aare_bytes).unwrap();
        assert!(parsed_aare.is_accepted());
        let ResponseUserInformation::Initiate(response) = parsed_aare.user_information.unwrap()
        else {
            panic!("expected InitiateResponse");
        };
        assert!(response.negotiated_conformance.contains(Conformance::GET));
        assert!(!response.negotiated_conformance.contains(Conformance::ACTION));
        assert_eq!(response.server_max_receive_pdu_size, 0x0400);
    }
}
