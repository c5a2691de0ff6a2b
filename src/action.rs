//! ACTION service APDUs.
//!
//! The ACTION service invokes methods on COSEM objects. Only the Normal
//! request variant exists on the client side; responses come back plain,
//! with data or with an error. The HLS reply-to-challenge handshake rides
//! on this service.
//!
//! # APDU Tags
//! - ACTION-Request: 0xC3 (195)
//! - ACTION-Response: 0xC7 (199)

use alloc::vec::Vec;

use nom::{
    IResult,
    error::{Error as NomError, ErrorKind},
    number::complete::u8 as nom_u8,
};

use crate::axdr;
use crate::cosem::CosemMethod;
use crate::data::{ByteBuffer, Data};
use crate::enumerations::{ActionResult, DataAccessResult};
use crate::get::parse_data_access_result;
use crate::invoke_id::InvokeIdAndPriority;

/// ACTION service request types.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ActionRequest {
    /// ACTION-Request-Normal (choice 0x01)
    Normal(ActionRequestNormal),
}

/// Invoke a single method, optionally with parameters.
///
/// ```text
/// C3 01 C1 000F 0000280000FF 01 01 ...
/// │  │  │  │    │            │  └── parameters presence + data
/// │  │  │  │    │            └───── method id
/// │  │  │  │    └────────────────── OBIS code
/// │  │  │  └─────────────────────── class id
/// │  │  └────────────────────────── invoke-id-and-priority
/// │  └───────────────────────────── choice: Normal
/// └──────────────────────────────── tag: ACTION-Request
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ActionRequestNormal {
    pub invoke_id_and_priority: InvokeIdAndPriority,
    pub cosem_method: CosemMethod,
    pub parameters: Option<Data>,
}

impl ActionRequestNormal {
    pub fn new(cosem_method: CosemMethod, parameters: Option<Data>) -> Self {
        Self { invoke_id_and_priority: InvokeIdAndPriority::default(), cosem_method, parameters }
    }
}

impl ActionRequest {
    pub const TAG: u8 = 195;

    pub fn invoke_id_and_priority(&self) -> InvokeIdAndPriority {
        match self {
            Self::Normal(request) => request.invoke_id_and_priority,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push_u8(Self::TAG);
        match self {
            Self::Normal(request) => {
                out.push_u8(0x01);
                out.push_u8(request.invoke_id_and_priority.to_byte());
                out.push_bytes(&request.cosem_method.encode());
                match &request.parameters {
                    Some(parameters) => {
                        out.push_u8(0x01);
                        out.push_bytes(&parameters.encode());
                    }
                    None => out.push_u8(0x00),
                }
            }
        }
        out
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, tag) = nom_u8(input)?;
        if tag != Self::TAG {
            return Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag)));
        }
        let (input, request_type) = nom_u8(input)?;
        if request_type != 0x01 {
            // NextPblock/WithList/pblock variants are server-side concerns.
            return Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag)));
        }
        let (input, invoke_id_and_priority) = InvokeIdAndPriority::parse(input)?;
        let (input, cosem_method) = CosemMethod::parse(input)?;
        let (input, has_parameters) = axdr::parse_presence(input)?;
        let (input, parameters) = if has_parameters {
            let (input, parameters) = Data::parse(input)?;
            (input, Some(parameters))
        } else {
            (input, None)
        };

        Ok((
            input,
            Self::Normal(ActionRequestNormal { invoke_id_and_priority, cosem_method, parameters }),
        ))
    }
}

/// ACTION service response types.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ActionResponse {
    /// Status only
    Normal(ActionResponseNormal),
    /// Status plus returned data
    NormalWithData(ActionResponseNormalWithData),
    /// Status plus a data access error for the return value
    NormalWithError(ActionResponseNormalWithError),
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ActionResponseNormal {
    pub invoke_id_and_priority: InvokeIdAndPriority,
    pub status: ActionResult,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ActionResponseNormalWithData {
    pub invoke_id_and_priority: InvokeIdAndPriority,
    pub status: ActionResult,
    pub data: Data,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ActionResponseNormalWithError {
    pub invoke_id_and_priority: InvokeIdAndPriority,
    pub status: ActionResult,
    pub error: DataAccessResult,
}

impl ActionResponse {
    pub const TAG: u8 = 199;

    pub fn invoke_id_and_priority(&self) -> InvokeIdAndPriority {
        match self {
            Self::Normal(response) => response.invoke_id_and_priority,
            Self::NormalWithData(response) => response.invoke_id_and_priority,
            Self::NormalWithError(response) => response.invoke_id_and_priority,
        }
    }

    pub fn status(&self) -> ActionResult {
        match self {
            Self::Normal(response) => response.status,
            Self::NormalWithData(response) => response.status,
            Self::NormalWithError(response) => response.status,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push_u8(Self::TAG);
        out.push_u8(0x01); // action-response-normal
        match self {
            Self::Normal(response) => {
                out.push_u8(response.invoke_id_and_priority.to_byte());
                out.push_u8(response.status as u8);
                out.push_u8(0x00); // no return parameters
            }
            Self::NormalWithData(response) => {
                out.push_u8(response.invoke_id_and_priority.to_byte());
                out.push_u8(response.status as u8);
                out.push_u8(0x01); // return parameters follow
                out.push_u8(0x00); // choice: data
                out.push_bytes(&response.data.encode());
            }
            Self::NormalWithError(response) => {
                out.push_u8(response.invoke_id_and_priority.to_byte());
                out.push_u8(response.status as u8);
                out.push_u8(0x01);
                out.push_u8(0x01); // choice: data-access-result
                out.push_u8(response.error as u8);
            }
        }
        out
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, tag) = nom_u8(input)?;
        if tag != Self::TAG {
            return Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag)));
        }
        let (input, response_type) = nom_u8(input)?;
        if response_type != 0x01 {
            return Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag)));
        }
        let (input, invoke_id_and_priority) = InvokeIdAndPriority::parse(input)?;
        let (input, status) = nom_u8(input)?;
        let status = ActionResult::try_from(status)
            .map_err(|_| nom::Err::Error(NomError::new(input, ErrorKind::Tag)))?;

        let (input, has_parameters) = axdr::parse_presence(input)?;
        if !has_parameters {
            return Ok((input, Self::Normal(ActionResponseNormal { invoke_id_and_priority, status })));
        }

        let (input, choice) = nom_u8(input)?;
        match choice {
            0x00 => {
                let (input, data) = Data::parse(input)?;
                Ok((
                    input,
                    Self::NormalWithData(ActionResponseNormalWithData {
                        invoke_id_and_priority,
                        status,
                        data,
                    }),
                ))
            }
            0x01 => {
                let (input, error) = parse_data_access_result(input)?;
                Ok((
                    input,
                    Self::NormalWithError(ActionResponseNormalWithError {
                        invoke_id_and_priority,
                        status,
                        error,
                    }),
                ))
            }
            _ => Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag))),
        }
    }
}
