//! SET service APDUs.
//!
//! The SET service writes attribute values. Values too large for one APDU
//! go out as DataBlock-SA blocks (WithFirstBlock/WithBlock); the wire
//! formats are implemented here while sequencing them is left to the
//! caller.
//!
//! # APDU Tags
//! - SET-Request: 0xC1 (193)
//! - SET-Response: 0xC5 (197)
//!
//! Reference: DLMS Green Book Ed. 12, SET service ASN.1

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
use crate::get::parse_data_access_result;
use crate::invoke_id::InvokeIdAndPriority;
use crate::selective_access::AccessDescriptor;

/// DataBlock-SA: the block unit shared by SET and ACTION block transfer.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DataBlockSa {
    pub last_block: bool,
    pub block_number: u32,
    pub raw_data: Vec<u8>,
}

impl DataBlockSa {
    fn encode_into(&self, out: &mut Vec<u8>) {
        out.push_u8(if self.last_block { 0x01 } else { 0x00 });
        out.push_u32(self.block_number);
        axdr::encode_octet_string(out, &self.raw_data);
    }

    fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, last_block) = nom_u8(input)?;
        let (input, block_number) = be_u32(input)?;
        let (input, length) = axdr::parse_length(input)?;
        let (input, raw_data) = take(length)(input)?;
        Ok((
            input,
            Self { last_block: last_block != 0, block_number, raw_data: raw_data.to_vec() },
        ))
    }
}

/// SET service request types.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum SetRequest {
    /// SET-Request-Normal (choice 0x01)
    Normal(SetRequestNormal),
    /// SET-Request-With-First-Datablock (choice 0x02)
    WithFirstBlock(SetRequestWithFirstBlock),
    /// SET-Request-With-Datablock (choice 0x03)
    WithBlock(SetRequestWithBlock),
    /// SET-Request-With-List (choice 0x04)
    WithList(SetRequestWithList),
    /// SET-Request-With-List-And-First-Datablock (choice 0x05)
    WithListFirstBlock(SetRequestWithListFirstBlock),
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SetRequestNormal {
    pub invoke_id_and_priority: InvokeIdAndPriority,
    pub cosem_attribute: CosemAttribute,
    pub access_selection: Option<AccessDescriptor>,
    /// The self-describing value to write, kept raw
    pub data: Vec<u8>,
}

impl SetRequestNormal {
    pub fn new(cosem_attribute: CosemAttribute, value: &Data) -> Self {
        Self {
            invoke_id_and_priority: InvokeIdAndPriority::default(),
            cosem_attribute,
            access_selection: None,
            data: value.encode(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SetRequestWithFirstBlock {
    pub invoke_id_and_priority: InvokeIdAndPriority,
    pub cosem_attribute: CosemAttribute,
    pub access_selection: Option<AccessDescriptor>,
    pub block: DataBlockSa,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SetRequestWithBlock {
    pub invoke_id_and_priority: InvokeIdAndPriority,
    pub block: DataBlockSa,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SetRequestWithList {
    pub invoke_id_and_priority: InvokeIdAndPriority,
    pub cosem_attributes: Vec<CosemAttributeWithSelection>,
    pub values: Vec<Data>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SetRequestWithListFirstBlock {
    pub invoke_id_and_priority: InvokeIdAndPriority,
    pub cosem_attributes: Vec<CosemAttributeWithSelection>,
    pub block: DataBlockSa,
}

impl SetRequest {
    pub const TAG: u8 = 193;

    pub fn invoke_id_and_priority(&self) -> InvokeIdAndPriority {
        match self {
            Self::Normal(request) => request.invoke_id_and_priority,
            Self::WithFirstBlock(request) => request.invoke_id_and_priority,
            Self::WithBlock(request) => request.invoke_id_and_priority,
            Self::WithList(request) => request.invoke_id_and_priority,
            Self::WithListFirstBlock(request) => request.invoke_id_and_priority,
        }
    }

    /// Does any part of the request use selective access?
    pub fn uses_selective_access(&self) -> bool {
        match self {
            Self::Normal(request) => request.access_selection.is_some(),
            Self::WithFirstBlock(request) => request.access_selection.is_some(),
            Self::WithBlock(_) => false,
            Self::WithList(request) => {
                request.cosem_attributes.iter().any(|item| item.access_selection.is_some())
            }
            Self::WithListFirstBlock(request) => {
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
                encode_access_selection(&mut out, &request.access_selection);
                out.push_bytes(&request.data);
            }
            Self::WithFirstBlock(request) => {
                out.push_u8(0x02);
                out.push_u8(request.invoke_id_and_priority.to_byte());
                out.push_bytes(&request.cosem_attribute.encode());
                encode_access_selection(&mut out, &request.access_selection);
                request.block.encode_into(&mut out);
            }
            Self::WithBlock(request) => {
                out.push_u8(0x03);
                out.push_u8(request.invoke_id_and_priority.to_byte());
                request.block.encode_into(&mut out);
            }
            Self::WithList(request) => {
                out.push_u8(0x04);
                out.push_u8(request.invoke_id_and_priority.to_byte());
                axdr::encode_length(&mut out, request.cosem_attributes.len());
                for item in &request.cosem_attributes {
                    out.push_bytes(&item.encode());
                }
                axdr::encode_length(&mut out, request.values.len());
                for value in &request.values {
                    out.push_bytes(&value.encode());
                }
            }
            Self::WithListFirstBlock(request) => {
                out.push_u8(0x05);
                out.push_u8(request.invoke_id_and_priority.to_byte());
                axdr::encode_length(&mut out, request.cosem_attributes.len());
                for item in &request.cosem_attributes {
                    out.push_bytes(&item.encode());
                }
                request.block.encode_into(&mut out);
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
                let (input, access_selection) = parse_access_selection(input)?;
                let data = input.to_vec();
                let (input, _) = take(input.len())(input)?;
                Ok((
                    input,
                    Self::Normal(SetRequestNormal {
                        invoke_id_and_priority,
                        cosem_attribute,
                        access_selection,
                        data,
                    }),
                ))
            }
            0x02 => {
                let (input, cosem_attribute) = CosemAttribute::parse(input)?;
                let (input, access_selection) = parse_access_selection(input)?;
                let (input, block) = DataBlockSa::parse(input)?;
                Ok((
                    input,
                    Self::WithFirstBlock(SetRequestWithFirstBlock {
                        invoke_id_and_priority,
                        cosem_attribute,
                        access_selection,
                        block,
                    }),
                ))
            }
            0x03 => {
                let (input, block) = DataBlockSa::parse(input)?;
                Ok((input, Self::WithBlock(SetRequestWithBlock { invoke_id_and_priority, block })))
            }
            0x04 => {
                let (mut input, count) = axdr::parse_length(input)?;
                let mut cosem_attributes = Vec::with_capacity(count);
                for _ in 0..count {
                    let (rest, item) = CosemAttributeWithSelection::parse(input)?;
                    cosem_attributes.push(item);
                    input = rest;
                }
                let (mut input, value_count) = axdr::parse_length(input)?;
                let mut values = Vec::with_capacity(value_count);
                for _ in 0..value_count {
                    let (rest, value) = Data::parse(input)?;
                    values.push(value);
                    input = rest;
                }
                Ok((
                    input,
                    Self::WithList(SetRequestWithList {
                        invoke_id_and_priority,
                        cosem_attributes,
                        values,
                    }),
                ))
            }
            0x05 => {
                let (mut input, count) = axdr::parse_length(input)?;
                let mut cosem_attributes = Vec::with_capacity(count);
                for _ in 0..count {
                    let (rest, item) = CosemAttributeWithSelection::parse(input)?;
                    cosem_attributes.push(item);
                    input = rest;
                }
                let (input, block) = DataBlockSa::parse(input)?;
                Ok((
                    input,
                    Self::WithListFirstBlock(SetRequestWithListFirstBlock {
                        invoke_id_and_priority,
                        cosem_attributes,
                        block,
                    }),
                ))
            }
            _ => Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag))),
        }
    }
}

fn encode_access_selection(out: &mut Vec<u8>, access_selection: &Option<AccessDescriptor>) {
    match access_selection {
        Some(selection) => {
            out.push_u8(0x01);
            out.push_bytes(&selection.encode());
        }
        None => out.push_u8(0x00),
    }
}

fn parse_access_selection(input: &[u8]) -> IResult<&[u8], Option<AccessDescriptor>> {
    let (input, present) = axdr::parse_presence(input)?;
    if present {
        let (input, selection) = AccessDescriptor::parse(input)?;
        Ok((input, Some(selection)))
    } else {
        Ok((input, None))
    }
}

/// SET service response types.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum SetResponse {
    /// SET-Response-Normal (choice 0x01)
    Normal(SetResponseNormal),
    /// SET-Response-Datablock (choice 0x02), acknowledges one block
    WithBlock(SetResponseWithBlock),
    /// SET-Response-Last-Datablock (choice 0x03)
    LastBlock(SetResponseLastBlock),
    /// SET-Response-Last-Datablock-With-List (choice 0x04)
    LastBlockWithList(SetResponseLastBlockWithList),
    /// SET-Response-With-List (choice 0x05)
    WithList(SetResponseWithList),
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SetResponseNormal {
    pub invoke_id_and_priority: InvokeIdAndPriority,
    pub result: DataAccessResult,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SetResponseWithBlock {
    pub invoke_id_and_priority: InvokeIdAndPriority,
    pub block_number: u32,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SetResponseLastBlock {
    pub invoke_id_and_priority: InvokeIdAndPriority,
    pub result: DataAccessResult,
    pub block_number: u32,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SetResponseLastBlockWithList {
    pub invoke_id_and_priority: InvokeIdAndPriority,
    pub results: Vec<DataAccessResult>,
    pub block_number: u32,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SetResponseWithList {
    pub invoke_id_and_priority: InvokeIdAndPriority,
    pub results: Vec<DataAccessResult>,
}

impl SetResponse {
    pub const TAG: u8 = 197;

    pub fn invoke_id_and_priority(&self) -> InvokeIdAndPriority {
        match self {
            Self::Normal(response) => response.invoke_id_and_priority,
            Self::WithBlock(response) => response.invoke_id_and_priority,
            Self::LastBlock(response) => response.invoke_id_and_priority,
            Self::LastBlockWithList(response) => response.invoke_id_and_priority,
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
                out.push_u8(response.result as u8);
            }
            Self::WithBlock(response) => {
                out.push_u8(0x02);
                out.push_u8(response.invoke_id_and_priority.to_byte());
                out.push_u32(response.block_number);
            }
            Self::LastBlock(response) => {
                out.push_u8(0x03);
                out.push_u8(response.invoke_id_and_priority.to_byte());
                out.push_u8(response.result as u8);
                out.push_u32(response.block_number);
            }
            Self::LastBlockWithList(response) => {
                out.push_u8(0x04);
                out.push_u8(response.invoke_id_and_priority.to_byte());
                axdr::encode_length(&mut out, response.results.len());
                for result in &response.results {
                    out.push_u8(*result as u8);
                }
                out.push_u32(response.block_number);
            }
            Self::WithList(response) => {
                out.push_u8(0x05);
                out.push_u8(response.invoke_id_and_priority.to_byte());
                axdr::encode_length(&mut out, response.results.len());
                for result in &response.results {
                    out.push_u8(*result as u8);
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
                let (input, result) = parse_data_access_result(input)?;
                Ok((input, Self::Normal(SetResponseNormal { invoke_id_and_priority, result })))
            }
            0x02 => {
                let (input, block_number) = be_u32(input)?;
                Ok((
                    input,
                    Self::WithBlock(SetResponseWithBlock { invoke_id_and_priority, block_number }),
                ))
            }
            0x03 => {
                let (input, result) = parse_data_access_result(input)?;
                let (input, block_number) = be_u32(input)?;
                Ok((
                    input,
                    Self::LastBlock(SetResponseLastBlock {
                        invoke_id_and_priority,
                        result,
                        block_number,
                    }),
                ))
            }
            0x04 => {
                let (mut input, count) = axdr::parse_length(input)?;
                let mut results = Vec::with_capacity(count);
                for _ in 0..count {
                    let (rest, result) = parse_data_access_result(input)?;
                    results.push(result);
                    input = rest;
                }
                let (input, block_number) = be_u32(input)?;
                Ok((
                    input,
                    Self::LastBlockWithList(SetResponseLastBlockWithList {
                        invoke_id_and_priority,
                        results,
                        block_number,
                    }),
                ))
            }
            0x05 => {
                let (mut input, count) = axdr::parse_length(input)?;
                let mut results = Vec::with_capacity(count);
                for _ in 0..count {
                    let (rest, result) = parse_data_access_result(input)?;
                    results.push(result);
                    input = rest;
                }
                Ok((input, Self::WithList(SetResponseWithList { invoke_id_and_priority, results })))
            }
            _ => Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obis_code::ObisCode;
    use crate::test_support::hex;

    fn clock_attribute() -> CosemAttribute {
        CosemAttribute::new(8, ObisCode::new(0, 0, 1, 0, 0, 255), 2)
    }

    #[test]
    fn test_set_request_normal_encoding() {
        let request =
            SetRequest::Normal(SetRequestNormal::new(clock_attribute(), &Data::Unsigned(0x2A)));
        assert_eq!(request.encode(), hex("C101C1 0008 0000010000FF 02 00 112A"));
    }

    #[test]
    fn test_set_request_normal_roundtrip() {
        let request =
            SetRequest::Normal(SetRequestNormal::new(clock_attribute(), &Data::Long(-5)));
        let encoded = request.encode();
        let (rest, parsed) = SetRequest::parse(&encoded).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_set_request_with_first_block_roundtrip() {
        let request = SetRequest::WithFirstBlock(SetRequestWithFirstBlock {
            invoke_id_and_priority: InvokeIdAndPriority::default(),
            cosem_attribute: clock_attribute(),
            access_selection: None,
            block: DataBlockSa {
                last_block: false,
                block_number: 1,
                raw_data: alloc::vec![0x09; 32],
            },
        });
        let encoded = request.encode();
        let (rest, parsed) = SetRequest::parse(&encoded).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_set_request_with_block_roundtrip() {
        let request = SetRequest::WithBlock(SetRequestWithBlock {
            invoke_id_and_priority: InvokeIdAndPriority::default(),
            block: DataBlockSa { last_block: true, block_number: 2, raw_data: alloc::vec![0x55; 7] },
        });
        let encoded = request.encode();
        let (rest, parsed) = SetRequest::parse(&encoded).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_set_request_with_list_roundtrip() {
        let request = SetRequest::WithList(SetRequestWithList {
            invoke_id_and_priority: InvokeIdAndPriority::default(),
            cosem_attributes: alloc::vec![CosemAttributeWithSelection {
                attribute: clock_attribute(),
                access_selection: None,
            }],
            values: alloc::vec![Data::Bool(true)],
        });
        let encoded = request.encode();
        let (rest, parsed) = SetRequest::parse(&encoded).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_set_request_with_list_first_block_roundtrip() {
        let request = SetRequest::WithListFirstBlock(SetRequestWithListFirstBlock {
            invoke_id_and_priority: InvokeIdAndPriority::default(),
            cosem_attributes: alloc::vec![CosemAttributeWithSelection {
                attribute: clock_attribute(),
                access_selection: None,
            }],
            block: DataBlockSa { last_block: false, block_number: 1, raw_data: alloc::vec![1, 2] },
        });
        let encoded = request.encode();
        let (rest, parsed) = SetRequest::parse(&encoded).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_set_response_normal_roundtrip() {
        let bytes = hex("C501C100");
        let (rest, parsed) = SetResponse::parse(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(
            parsed,
            SetResponse::Normal(SetResponseNormal {
                invoke_id_and_priority: InvokeIdAndPriority::default(),
                result: DataAccessResult::Success,
            })
        );
        assert_eq!(parsed.encode(), bytes);
    }

    #[test]
    fn test_set_response_variants_roundtrip() {
        let responses = [
            SetResponse::WithBlock(SetResponseWithBlock {
                invoke_id_and_priority: InvokeIdAndPriority::default(),
                block_number: 1,
            }),
            SetResponse::LastBlock(SetResponseLastBlock {
                invoke_id_and_priority: InvokeIdAndPriority::default(),
                result: DataAccessResult::Success,
                block_number: 3,
            }),
            SetResponse::LastBlockWithList(SetResponseLastBlockWithList {
                invoke_id_and_priority: InvokeIdAndPriority::default(),
                results: alloc::vec![DataAccessResult::Success, DataAccessResult::TypeUnmatched],
                block_number: 4,
            }),
            SetResponse::WithList(SetResponseWithList {
                invoke_id_and_priority: InvokeIdAndPriority::default(),
                results: alloc::vec![DataAccessResult::Success],
            }),
        ];
        for response in responses {
            let encoded = response.encode();
            let (rest, parsed) = SetResponse::parse(&encoded).unwrap();
            assert!(rest.is_empty());
            assert_eq!(parsed, response);
        }
    }

    #[test]
    fn test_unknown_choice_is_rejected() {
        assert!(SetRequest::parse(&hex("C106C1")).is_err());
        assert!(SetResponse::parse(&hex("C506C1")).is_err());
    }
}
