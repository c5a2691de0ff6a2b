//! The APDU factory: one enum over every message the engine speaks, with a
//! single parse function dispatching on the tag byte.
//!
//! The DLMS connection feeds complete application payloads through
//! [`Apdu::from_bytes`]; exhaustive matching on the enum replaces any
//! per-type registry and makes unhandled tags a compile-time concern.

use alloc::vec::Vec;
use core::fmt;

use crate::action::{ActionRequest, ActionResponse};
use crate::association::{
    AARE_TAG, AARQ_TAG, AareApdu, AarqApdu, GlobalCipherInitiateRequest,
    GlobalCipherInitiateResponse, InitiateRequest, InitiateResponse, RLRE_TAG, RLRQ_TAG, RlreApdu,
    RlrqApdu,
};
use crate::confirmed_service_error::ConfirmedServiceError;
use crate::data_notification::DataNotification;
use crate::error::{Error, map_nom};
use crate::exception_response::ExceptionResponse;
use crate::general_ciphering::GeneralCiphering;
use crate::general_glo_ciphering::GeneralGlobalCipher;
use crate::get::{GetRequest, GetResponse};
use crate::set::{SetRequest, SetResponse};

/// Any APDU the client can send or receive.
#[derive(Debug, Clone, PartialEq)]
pub enum Apdu {
    InitiateRequest(InitiateRequest),
    InitiateResponse(InitiateResponse),
    ConfirmedServiceError(ConfirmedServiceError),
    DataNotification(DataNotification),
    GlobalCipherInitiateRequest(GlobalCipherInitiateRequest),
    GlobalCipherInitiateResponse(GlobalCipherInitiateResponse),
    GetRequest(GetRequest),
    SetRequest(SetRequest),
    ActionRequest(ActionRequest),
    GetResponse(GetResponse),
    SetResponse(SetResponse),
    ActionResponse(ActionResponse),
    ExceptionResponse(ExceptionResponse),
    GeneralGlobalCipher(GeneralGlobalCipher),
    GeneralCiphering(GeneralCiphering),
    Aarq(AarqApdu),
    Aare(AareApdu),
    Rlrq(RlrqApdu),
    Rlre(RlreApdu),
}

impl Apdu {
    /// The tag byte this APDU serializes with.
    pub fn tag(&self) -> u8 {
        match self {
            Self::InitiateRequest(_) => InitiateRequest::TAG,
            Self::InitiateResponse(_) => InitiateResponse::TAG,
            Self::ConfirmedServiceError(_) => ConfirmedServiceError::TAG,
            Self::DataNotification(_) => DataNotification::TAG,
            Self::GlobalCipherInitiateRequest(_) => GlobalCipherInitiateRequest::TAG,
            Self::GlobalCipherInitiateResponse(_) => GlobalCipherInitiateResponse::TAG,
            Self::GetRequest(_) => GetRequest::TAG,
            Self::SetRequest(_) => SetRequest::TAG,
            Self::ActionRequest(_) => ActionRequest::TAG,
            Self::GetResponse(_) => GetResponse::TAG,
            Self::SetResponse(_) => SetResponse::TAG,
            Self::ActionResponse(_) => ActionResponse::TAG,
            Self::ExceptionResponse(_) => ExceptionResponse::TAG,
            Self::GeneralGlobalCipher(apdu) => apdu.tag_byte(),
            Self::GeneralCiphering(_) => GeneralCiphering::TAG,
            Self::Aarq(_) => AARQ_TAG,
            Self::Aare(_) => AARE_TAG,
            Self::Rlrq(_) => RLRQ_TAG,
            Self::Rlre(_) => RLRE_TAG,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::InitiateRequest(apdu) => apdu.encode(),
            Self::InitiateResponse(apdu) => apdu.encode(),
            Self::ConfirmedServiceError(apdu) => apdu.encode(),
            Self::DataNotification(apdu) => apdu.encode(),
            Self::GlobalCipherInitiateRequest(apdu) => apdu.encode(),
            Self::GlobalCipherInitiateResponse(apdu) => apdu.encode(),
            Self::GetRequest(apdu) => apdu.encode(),
            Self::SetRequest(apdu) => apdu.encode(),
            Self::ActionRequest(apdu) => apdu.encode(),
            Self::GetResponse(apdu) => apdu.encode(),
            Self::SetResponse(apdu) => apdu.encode(),
            Self::ActionResponse(apdu) => apdu.encode(),
            Self::ExceptionResponse(apdu) => apdu.encode(),
            Self::GeneralGlobalCipher(apdu) => apdu.encode(),
            Self::GeneralCiphering(apdu) => apdu.encode(),
            Self::Aarq(apdu) => apdu.encode(),
            Self::Aare(apdu) => apdu.encode(),
            Self::Rlrq(apdu) => apdu.encode(),
            Self::Rlre(apdu) => apdu.encode(),
        }
    }

    /// Parses one complete APDU, dispatching on the first byte.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let tag = *bytes.first().ok_or(Error::Incomplete)?;
        let (_, apdu) = match tag {
            InitiateRequest::TAG => InitiateRequest::parse(bytes)
                .map(|(rest, apdu)| (rest, Self::InitiateRequest(apdu)))
                .map_err(map_nom("initiate-request"))?,
            InitiateResponse::TAG => InitiateResponse::parse(bytes)
                .map(|(rest, apdu)| (rest, Self::InitiateResponse(apdu)))
                .map_err(map_nom("initiate-response"))?,
            ConfirmedServiceError::TAG => ConfirmedServiceError::parse(bytes)
                .map(|(rest, apdu)| (rest, Self::ConfirmedServiceError(apdu)))
                .map_err(map_nom("confirmed-service-error"))?,
            DataNotification::TAG => DataNotification::parse(bytes)
                .map(|(rest, apdu)| (rest, Self::DataNotification(apdu)))
                .map_err(map_nom("data-notification"))?,
            GlobalCipherInitiateRequest::TAG => GlobalCipherInitiateRequest::parse(bytes)
                .map(|(rest, apdu)| (rest, Self::GlobalCipherInitiateRequest(apdu)))
                .map_err(map_nom("glo-initiate-request"))?,
            GlobalCipherInitiateResponse::TAG => GlobalCipherInitiateResponse::parse(bytes)
                .map(|(rest, apdu)| (rest, Self::GlobalCipherInitiateResponse(apdu)))
                .map_err(map_nom("glo-initiate-response"))?,
            GetRequest::TAG => GetRequest::parse(bytes)
                .map(|(rest, apdu)| (rest, Self::GetRequest(apdu)))
                .map_err(map_nom("get-request"))?,
            SetRequest::TAG => SetRequest::parse(bytes)
                .map(|(rest, apdu)| (rest, Self::SetRequest(apdu)))
                .map_err(map_nom("set-request"))?,
            ActionRequest::TAG => ActionRequest::parse(bytes)
                .map(|(rest, apdu)| (rest, Self::ActionRequest(apdu)))
                .map_err(map_nom("action-request"))?,
            GetResponse::TAG => GetResponse::parse(bytes)
                .map(|(rest, apdu)| (rest, Self::GetResponse(apdu)))
                .map_err(map_nom("get-response"))?,
            SetResponse::TAG => SetResponse::parse(bytes)
                .map(|(rest, apdu)| (rest, Self::SetResponse(apdu)))
                .map_err(map_nom("set-response"))?,
            ActionResponse::TAG => ActionResponse::parse(bytes)
                .map(|(rest, apdu)| (rest, Self::ActionResponse(apdu)))
                .map_err(map_nom("action-response"))?,
            ExceptionResponse::TAG => ExceptionResponse::parse(bytes)
                .map(|(rest, apdu)| (rest, Self::ExceptionResponse(apdu)))
                .map_err(map_nom("exception-response"))?,
            GeneralGlobalCipher::TAG | GeneralGlobalCipher::DEDICATED_TAG => {
                GeneralGlobalCipher::parse(bytes)
                    .map(|(rest, apdu)| (rest, Self::GeneralGlobalCipher(apdu)))
                    .map_err(map_nom("general-glo-ciphering"))?
            }
            GeneralCiphering::TAG => GeneralCiphering::parse(bytes)
                .map(|(rest, apdu)| (rest, Self::GeneralCiphering(apdu)))
                .map_err(map_nom("general-ciphering"))?,
            AARQ_TAG => AarqApdu::parse(bytes)
                .map(|(rest, apdu)| (rest, Self::Aarq(apdu)))
                .map_err(map_nom("aarq"))?,
            AARE_TAG => AareApdu::parse(bytes)
                .map(|(rest, apdu)| (rest, Self::Aare(apdu)))
                .map_err(map_nom("aare"))?,
            RLRQ_TAG => RlrqApdu::parse(bytes)
                .map(|(rest, apdu)| (rest, Self::Rlrq(apdu)))
                .map_err(map_nom("rlrq"))?,
            RLRE_TAG => RlreApdu::parse(bytes)
                .map(|(rest, apdu)| (rest, Self::Rlre(apdu)))
                .map_err(map_nom("rlre"))?,
            tag => return Err(Error::UnknownApdu(tag)),
        };
        Ok(apdu)
    }
}

impl fmt::Display for Apdu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitiateRequest(_) => write!(f, "InitiateRequest"),
            Self::InitiateResponse(_) => write!(f, "InitiateResponse"),
            Self::ConfirmedServiceError(apdu) => write!(f, "{apdu}"),
            Self::DataNotification(apdu) => write!(f, "{apdu}"),
            Self::GlobalCipherInitiateRequest(_) => write!(f, "GlobalCipherInitiateRequest"),
            Self::GlobalCipherInitiateResponse(_) => write!(f, "GlobalCipherInitiateResponse"),
            Self::GetRequest(_) => write!(f, "GetRequest"),
            Self::SetRequest(_) => write!(f, "SetRequest"),
            Self::ActionRequest(_) => write!(f, "ActionRequest"),
            Self::GetResponse(_) => write!(f, "GetResponse"),
            Self::SetResponse(_) => write!(f, "SetResponse"),
            Self::ActionResponse(_) => write!(f, "ActionResponse"),
            Self::ExceptionResponse(apdu) => write!(f, "{apdu}"),
            Self::GeneralGlobalCipher(apdu) => write!(f, "{apdu}"),
            Self::GeneralCiphering(apdu) => write!(f, "{apdu}"),
            Self::Aarq(apdu) => write!(f, "{apdu}"),
            Self::Aare(apdu) => write!(f, "{apdu}"),
            Self::Rlrq(apdu) => write!(f, "{apdu}"),
            Self::Rlre(apdu) => write!(f, "{apdu}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::hex;

    #[test]
    fn test_dispatch_get_request() {
        let apdu = Apdu::from_bytes(&hex("C001C1000100002B0100FF0200")).unwrap();
        assert!(matches!(apdu, Apdu::GetRequest(GetRequest::Normal(_))));
        assert_eq!(apdu.tag(), 192);
    }

    #[test]
    fn test_dispatch_get_response() {
        let apdu = Apdu::from_bytes(&hex("C401C1000600001391")).unwrap();
        assert!(matches!(apdu, Apdu::GetResponse(GetResponse::Normal(_))));
    }

    #[test]
    fn test_dispatch_aare() {
        let apdu = Apdu::from_bytes(&hex(
            "6129A109060760857405080101A203020100A305A103020100BE10040E0800065F1F04000050\
             1F01F40007",
        ))
        .unwrap();
        assert!(matches!(apdu, Apdu::Aare(_)));
    }

    #[test]
    fn test_dispatch_exception_response() {
        let apdu = Apdu::from_bytes(&hex("D80101")).unwrap();
        assert!(matches!(apdu, Apdu::ExceptionResponse(_)));
    }

    #[test]
    fn test_unknown_tag() {
        assert!(matches!(Apdu::from_bytes(&[0x7B, 0x00]), Err(Error::UnknownApdu(0x7B))));
    }

    #[test]
    fn test_empty_buffer_needs_data() {
        assert!(matches!(Apdu::from_bytes(&[]), Err(Error::Incomplete)));
    }

    #[test]
    fn test_encode_decode_identity_on_vectors() {
        // decode(encode(apdu)) == apdu and encode(decode(bytes)) == bytes
        // for one vector of each framing family.
        for vector in [
            "C001C1000100002B0100FF0200",
            "C401C1000600001391",
            "C501C100",
            "C701C10000",
            "D80101",
            "601DA109060760857405080101BE10040E01000000065F1F0400001E1DFFFF",
            "6203800100",
        ] {
            let bytes = hex(vector);
            let apdu = Apdu::from_bytes(&bytes).unwrap();
            assert_eq!(apdu.encode(), bytes, "vector {vector}");
        }
    }
}
