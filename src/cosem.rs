//! COSEM object identifiers.
//!
//! A COSEM attribute or method is addressed by (interface class, OBIS
//! instance, index). The wire form is fixed at 9 bytes: two for the class,
//! six for the OBIS code, one for the attribute/method index.

use alloc::vec::Vec;
use core::fmt;

use nom::{
    IResult,
    number::complete::{be_u16, i8},
};

use crate::data::{ByteBuffer, Data};
use crate::enumerations::interface_class;
use crate::obis_code::ObisCode;
use crate::selective_access::AccessDescriptor;

/// Identifies one readable/writable attribute of a COSEM object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CosemAttribute {
    pub interface: u16,
    pub instance: ObisCode,
    pub attribute: i8,
}

impl CosemAttribute {
    /// Serialized length: class (2) + OBIS (6) + attribute (1).
    pub const LENGTH: usize = 9;

    pub const fn new(interface: u16, instance: ObisCode, attribute: i8) -> Self {
        Self { interface, instance, attribute }
    }

    /// The client invocation-counter data object, `0-0:43.1.0*255`
    /// attribute 2.
    pub const fn invocation_counter() -> Self {
        Self::new(interface_class::DATA, ObisCode::new(0, 0, 43, 1, 0, 255), 2)
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, interface) = be_u16(input)?;
        let (input, instance) = ObisCode::parse(input)?;
        let (input, attribute) = i8(input)?;
        Ok((input, Self { interface, instance, attribute }))
    }

    pub fn encode(&self) -> [u8; Self::LENGTH] {
        let mut out = [0u8; Self::LENGTH];
        out[..2].copy_from_slice(&self.interface.to_be_bytes());
        out[2..8].copy_from_slice(&self.instance.encode());
        out[8] = self.attribute as u8;
        out
    }
}

impl fmt::Display for CosemAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.interface, self.instance, self.attribute)
    }
}

/// Identifies one invokable method of a COSEM object. Same shape as
/// [`CosemAttribute`] but the last byte names a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CosemMethod {
    pub interface: u16,
    pub instance: ObisCode,
    pub method: i8,
}

impl CosemMethod {
    pub const LENGTH: usize = 9;

    pub const fn new(interface: u16, instance: ObisCode, method: i8) -> Self {
        Self { interface, instance, method }
    }

    /// Method 1 (`reply_to_HLS_authentication`) of the current Association-LN
    /// object, `0-0:40.0.0*255`.
    pub const fn reply_to_hls() -> Self {
        Self::new(interface_class::ASSOCIATION_LN, ObisCode::new(0, 0, 40, 0, 0, 255), 1)
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, interface) = be_u16(input)?;
        let (input, instance) = ObisCode::parse(input)?;
        let (input, method) = i8(input)?;
        Ok((input, Self { interface, instance, method }))
    }

    pub fn encode(&self) -> [u8; Self::LENGTH] {
        let mut out = [0u8; Self::LENGTH];
        out[..2].copy_from_slice(&self.interface.to_be_bytes());
        out[2..8].copy_from_slice(&self.instance.encode());
        out[8] = self.method as u8;
        out
    }
}

impl fmt::Display for CosemMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:m{}", self.interface, self.instance, self.method)
    }
}

/// A COSEM attribute plus an optional selective-access descriptor, as used
/// in with-list requests.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CosemAttributeWithSelection {
    pub attribute: CosemAttribute,
    pub access_selection: Option<AccessDescriptor>,
}

impl CosemAttributeWithSelection {
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, attribute) = CosemAttribute::parse(input)?;
        let (input, has_selection) = crate::axdr::parse_presence(input)?;
        if has_selection {
            let (input, access_selection) = AccessDescriptor::parse(input)?;
            Ok((input, Self { attribute, access_selection: Some(access_selection) }))
        } else {
            Ok((input, Self { attribute, access_selection: None }))
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push_bytes(&self.attribute.encode());
        match &self.access_selection {
            Some(selection) => {
                out.push_u8(0x01);
                out.push_bytes(&selection.encode());
            }
            None => out.push_u8(0x00),
        }
        out
    }
}

/// One column definition of a Profile Generic buffer. A data index of 0
/// references the whole attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CaptureObject {
    pub cosem_attribute: CosemAttribute,
    pub data_index: u16,
}

impl CaptureObject {
    pub const fn new(cosem_attribute: CosemAttribute, data_index: u16) -> Self {
        Self { cosem_attribute, data_index }
    }

    /// The capture object as the DLMS structure used inside selective-access
    /// descriptors: { class-id, logical-name, attribute-index, data-index }.
    pub fn to_data(&self) -> Data {
        Data::Structure(alloc::vec![
            Data::LongUnsigned(self.cosem_attribute.interface),
            Data::OctetString(self.cosem_attribute.instance.encode().to_vec()),
            Data::Integer(self.cosem_attribute.attribute),
            Data::LongUnsigned(self.data_index),
        ])
    }

    /// Rebuilds a capture object from its [`CaptureObject::to_data`] form.
    pub fn from_data(data: &Data) -> Option<Self> {
        let Data::Structure(elements) = data else {
            return None;
        };
        match elements.as_slice() {
            [
                Data::LongUnsigned(interface),
                Data::OctetString(instance),
                Data::Integer(attribute),
                Data::LongUnsigned(data_index),
            ] => {
                let instance: [u8; 6] = instance.as_slice().try_into().ok()?;
                let (_, instance) = ObisCode::parse(&instance).ok()?;
                Some(Self {
                    cosem_attribute: CosemAttribute::new(*interface, instance, *attribute),
                    data_index: *data_index,
                })
            }
            _ => None,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        self.to_data().encode()
    }
}
