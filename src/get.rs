//! GET service APDUs.
//!
//! The GET service reads attributes from COSEM objects. Responses that do
//! not fit in one APDU arrive as numbered blocks which the client
//! acknowledges with GET-Request-Next until the last block; the raw block
//! payloads concatenate into one self-describing data value.
//!
//! # APDU Tags
//! - GET-Request: 0xC0 (192)
//! - GET-Response: 0xC4 (196)
//!
//! Reference: DLMS Green Book Ed. 12, Tables 69-70 and 95

use alloc::vec::Vec;

use nom::{
    IResult,
    bytes::complete::take,
    error::{Error as NomError, ErrorKind},
    number::complete::{be_u32, u8 as nom_u8},
};

use crate::axdr;
use crate::cosem::{CosemAttribute, CosemAttributeWithSelection};
use crate::data::{ByteBuffer, Data};
use crate::enumerations::DataAccessResult;
use crate::error::{Error, map_nom};
use crate::invoke_id::InvokeIdAndPriority;
use crate::selective_access::AccessDescriptor;

/// GET service request types (choice byte after the tag).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum GetRequest {
    /// GET-Request-Normal (choice 0x01)
    Normal(GetRequestNormal),
    /// GET-Request-Next (choice 0x02), acknowledges a received block
    Next(GetRequestNext),
    /// GET-Request-With-List (choice 0x03)
    WithList(GetRequestWithList),
}

/// Read a single COSEM attribute.
///
/// ```text
/// C0 01 C1 0001 00002B0100FF 02 00
/// │  │  │  │    │            │  └── access-selection presence
/// │  │  │  │    │            └───── attribute id
/// │  │  │  │    └────────────────── OBIS code
/// │  │  │  └─────────────────────── class id
/// │  │  └────────────────────────── invoke-id-and-priority
/// │  └───────────────────────────── choice: Normal
/// └──────────────────────────────── tag: GET-Request
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct GetRequestNormal {
    pub invoke_id_and_priority: InvokeIdAndPriority,
    pub cosem_attribute: CosemAttribute,
    pub access_selection: Option<AccessDescriptor>,
}

impl GetRequestNormal {
    pub fn new(cosem_attribute: CosemAttribute) -> Self {
        Self {
            invoke_id_and_priority: InvokeIdAndPriority::default(),
            cosem_attribute,
            access_selection: None,
        }
    }
}

/// Request the next data block of a long GET response.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct GetRequestNext {
    pub invoke_id_and_priority: InvokeIdAndPriority,
    pub block_number: u32,
}

/// Read several attributes in one request.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct GetRequestWithList {
    pub invoke_id_and_priority: InvokeIdAndPriority,
    pub cosem_attributes: Vec<CosemAttributeWithSelection>,
}

impl GetRequest {
    pub const TAG: u8 = 192;

    pub fn invoke_id_and_priority(&self) -> InvokeIdAndPriority {
        match self {
            Self::Normal(request) => request.invoke_id_and_priority,
            Self::Next(request) => request.invoke_id_and_priority,
            Self::WithList(request) => request.invoke_id_and_priority,
        }
    }

    /// Does any part of the request use selective access?
    pub fn uses_selective_access(&self) -> bool {
        match self {
            Self::Normal(request) => request.access_selection.is_some(),
            Self::Next(_) => false,
            Self::WithList(request) => {
                request.cosem_attributes.iter().any(|item| item.access_selection.is_some())
            }
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push_u8(Self::TAG);
        match self {
            Self::Normal(request) => {
                out.push_u8(0x01);
                out.push_u8(request.invoke_id_and_priority.to_byte());
                out.push_bytes(&request.cosem_attribute.encode());
                match &request.access_selection {
                    Some(selection) => {
                        out.push_u8(0x01);
                        out.push_bytes(&selection.encode());
                    }
                    None => out.push_u8(0x00),
                }
            }
            Self::Next(request) => {
                out.push_u8(0x02);
                out.push_u8(request.invoke_id_and_priority.to_byte());
                out.push_u32(request.block_number);
            }
            Self::WithList(request) => {
                out.push_u8(0x03);
                out.push_u8(request.invoke_id_and_priority.to_byte());
                axdr::encode_length(&mut out, request.cosem_attributes.len());
                for item in &request.cosem_attributes {
                    out.push_bytes(&item.encode());
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
        let (input, invoke_id_and_priority) = InvokeIdAndPriority::parse(input)?;

        match request_type {
            0x01 => {
                let (input, cosem_attribute) = CosemAttribute::parse(input)?;
                let (input, has_selection) = axdr::parse_presence(input)?;
                let (input, access_selection) = if has_selection {
                    let (input, selection) = AccessDescriptor::parse(input)?;
                    (input, Some(selection))
                } else {
                    (input, None)
                };
                Ok((
                    input,
                    Self::Normal(GetRequestNormal {
                        invoke_id_and_priority,
                        cosem_attribute,
                        access_selection,
                    }),
                ))
            }
            0x02 => {
                let (input, block_number) = be_u32(input)?;
                Ok((input, Self::Next(GetRequestNext { invoke_id_and_priority, block_number })))
            }
            0x03 => {
                let (mut input, count) = axdr::parse_length(input)?;
                let mut cosem_attributes = Vec::with_capacity(count);
                for _ in 0..count {
                    let (rest, item) = CosemAttributeWithSelection::parse(input)?;
                    cosem_attributes.push(item);
                    input = rest;
                }
                Ok((
                    input,
                    Self::WithList(GetRequestWithList { invoke_id_and_priority, cosem_attributes }),
                ))
            }
            _ => Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag))),
        }
    }
}

/// One element of a GET-Response-With-List.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum GetDataResult {
    Data(Data),
    Error(DataAccessResult),
}

/// GET service response types.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum GetResponse {
    /// Successful GET-Response-Normal carrying the raw data bytes
    Normal(GetResponseNormal),
    /// GET-Response-Normal carrying a data access error
    NormalWithError(GetResponseNormalWithError),
    /// Intermediate block of a long response
    WithBlock(GetResponseWithBlock),
    /// Final block of a long response
    LastBlock(GetResponseLastBlock),
    /// Final block signalling an error
    LastBlockWithError(GetResponseLastBlockWithError),
    /// Response to GET-Request-With-List
    WithList(GetResponseWithList),
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct GetResponseNormal {
    pub invoke_id_and_priority: InvokeIdAndPriority,
    /// The self-describing data value, kept raw
    pub data: Vec<u8>,
}

impl GetResponseNormal {
    /// Parses the carried bytes as a DLMS data value.
    pub fn value(&self) -> Result<Data, Error> {
        let (_, data) = Data::parse(&self.data).map_err(map_nom("get-response data"))?;
        Ok(data)
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct GetResponseNormalWithError {
    pub invoke_id_and_priority: InvokeIdAndPriority,
    pub error: DataAccessResult,
}

/// The block payload is an A-XDR length-prefixed octet string of partial
/// data, not a self-describing data value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct GetResponseWithBlock {
    pub invoke_id_and_priority: InvokeIdAndPriority,
    pub block_number: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct GetResponseLastBlock {
    pub invoke_id_and_priority: InvokeIdAndPriority,
    pub block_number: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct GetResponseLastBlockWithError {
    pub invoke_id_and_priority: InvokeIdAndPriority,
    pub block_number: u32,
    pub error: DataAccessResult,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct GetResponseWithList {
    pub invoke_id_and_priority: InvokeIdAndPriority,
    pub results: Vec<GetDataResult>,
}

impl GetResponse {
    pub const TAG: u8 = 196;

    pub fn invoke_id_and_priority(&self) -> InvokeIdAndPriority {
        match self {
            Self::Normal(response) => response.invoke_id_and_priority,
            Self::NormalWithError(response) => response.invoke_id_and_priority,
            Self::WithBlock(response) => response.invoke_id_and_priority,
            Self::LastBlock(response) => response.invoke_id_and_priority,
            Self::LastBlockWithError(response) => response.invoke_id_and_priority,
            Self::WithList(response) => response.invoke_id_and_priority,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push_u8(Self::TAG);
        match self {
            Self::Normal(response) => {
                out.push_u8(0x01);
                out.push_u8(response.invoke_id_and_priority.to_byte());
                out.push_u8(0x00); // choice: data
                out.push_bytes(&response.data);
            }
            Self::NormalWithError(response) => {
                out.push_u8(0x01);
                out.push_u8(response.invoke_id_and_priority.to_byte());
                out.push_u8(0x01); // choice: data-access-result
                out.push_u8(response.error as u8);
            }
            Self::WithBlock(response) => {
                out.push_u8(0x02);
                out.push_u8(response.invoke_id_and_priority.to_byte());
                out.push_u8(0x00); // last-block: false
                out.push_u32(response.block_number);
                out.push_u8(0x00); // choice: raw-data
                axdr::encode_octet_string(&mut out, &response.data);
            }
            Self::LastBlock(response) => {
                out.push_u8(0x02);
                out.push_u8(response.invoke_id_and_priority.to_byte());
                out.push_u8(0x01); // last-block: true
                out.push_u32(response.block_number);
                out.push_u8(0x00);
                axdr::encode_octet_string(&mut out, &response.data);
            }
            Self::LastBlockWithError(response) => {
                out.push_u8(0x02);
                out.push_u8(response.invoke_id_and_priority.to_byte());
                out.push_u8(0x01);
                out.push_u32(response.block_number);
                out.push_u8(0x01); // choice: data-access-result
                out.push_u8(response.error as u8);
            }
            Self::WithList(response) => {
                out.push_u8(0x03);
                out.push_u8(response.invoke_id_and_priority.to_byte());
                axdr::encode_length(&mut out, response.results.len());
                for result in &response.results {
                    match result {
                        GetDataResult::Data(data) => {
                            out.push_u8(0x00);
                            out.push_bytes(&data.encode());
                        }
                        GetDataResult::Error(error) => {
                            out.push_u8(0x01);
                            out.push_u8(*error as u8);
                        }
                    }
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
        let (input, response_type) = nom_u8(input)?;
        let (input, invoke_id_and_priority) = InvokeIdAndPriority::parse(input)?;

        match response_type {
            0x01 => {
                let (input, choice) = nom_u8(input)?;
                match choice {
                    0x00 => {
                        // The remaining bytes are the data value.
                        let data = input.to_vec();
                        let (input, _) = take(input.len())(input)?;
                        Ok((input, Self::Normal(GetResponseNormal { invoke_id_and_priority, data })))
                    }
                    0x01 => {
                        let (input, error) = parse_data_access_result(input)?;
                        Ok((
                            input,
                            Self::NormalWithError(GetResponseNormalWithError {
                                invoke_id_and_priority,
                                error,
                            }),
                        ))
                    }
                    _ => Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag))),
                }
            }
            0x02 => {
                let (input, last_block) = nom_u8(input)?;
                let (input, block_number) = be_u32(input)?;
                let (input, choice) = nom_u8(input)?;
                match (choice, last_block != 0) {
                    (0x00, is_last) => {
                        let (input, length) = axdr::parse_length(input)?;
                        if length != input.len() {
                            // The octet string must cover the rest of the APDU.
                            return Err(nom::Err::Error(NomError::new(
                                input,
                                ErrorKind::LengthValue,
                            )));
                        }
                        let (input, data) = take(length)(input)?;
                        let data = data.to_vec();
                        if is_last {
                            Ok((
                                input,
                                Self::LastBlock(GetResponseLastBlock {
                                    invoke_id_and_priority,
                                    block_number,
                                    data,
                                }),
                            ))
                        } else {
                            Ok((
                                input,
                                Self::WithBlock(GetResponseWithBlock {
                                    invoke_id_and_priority,
                                    block_number,
                                    data,
                                }),
                            ))
                        }
                    }
                    (0x01, true) => {
                        let (input, error) = parse_data_access_result(input)?;
                        Ok((
                            input,
                            Self::LastBlockWithError(GetResponseLastBlockWithError {
                                invoke_id_and_priority,
                                block_number,
                                error,
                            }),
                        ))
                    }
                    // An error can only be signalled on the last block.
                    (0x01, false) => Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag))),
                    _ => Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag))),
                }
            }
            0x03 => {
                let (mut input, count) = axdr::parse_length(input)?;
                let mut results = Vec::with_capacity(count);
                for _ in 0..count {
                    let (rest, choice) = nom_u8(input)?;
                    match choice {
                        0x00 => {
                            let (rest, data) = Data::parse(rest)?;
                            results.push(GetDataResult::Data(data));
                            input = rest;
                        }
                        0x01 => {
                            let (rest, error) = parse_data_access_result(rest)?;
                            results.push(GetDataResult::Error(error));
                            input = rest;
                        }
                        _ => {
                            return Err(nom::Err::Error(NomError::new(rest, ErrorKind::Tag)));
                        }
                    }
                }
                Ok((input, Self::WithList(GetResponseWithList { invoke_id_and_priority, results })))
            }
            _ => Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag))),
        }
    }
}

pub(crate) fn parse_data_access_result(input: &[u8]) -> IResult<&[u8], DataAccessResult> {
    let (input, value) = nom_u8(input)?;
    let result = DataAccessResult::try_from(value)
        .map_err(|_| nom::Err::Error(NomError::new(input, ErrorKind::Tag)))?;
    Ok((input, result))
}
