//! Selective-access descriptors.
//!
//! A GET or SET on a Profile Generic buffer may restrict the returned rows
//! either by time (range descriptor, selector 1) or by entry number (entry
//! descriptor, selector 2). Reference: Blue Book 4.3.6.

use alloc::vec::Vec;

use nom::{
    IResult,
    error::{Error as NomError, ErrorKind},
    number::complete::u8,
};

use crate::cosem::CaptureObject;
use crate::data::{ByteBuffer, Data, DateTime};

/// Restricts a profile buffer read to rows whose restricting column (almost
/// always the clock) lies within `[from_value, to_value]`. An empty
/// `selected_values` array selects all columns.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RangeDescriptor {
    pub restricting_object: CaptureObject,
    pub from_value: DateTime,
    pub to_value: DateTime,
    pub selected_values: Vec<CaptureObject>,
}

impl RangeDescriptor {
    pub const ACCESS_SELECTOR: u8 = 1;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push_u8(Self::ACCESS_SELECTOR);
        // structure of 4: restricting object, from, to, selected columns
        out.push_bytes(&[0x02, 0x04]);
        out.push_bytes(&self.restricting_object.encode());
        out.push_bytes(&Data::OctetString(self.from_value.encode()).encode());
        out.push_bytes(&Data::OctetString(self.to_value.encode()).encode());
        out.push_bytes(
            &Data::Array(self.selected_values.iter().map(CaptureObject::to_data).collect())
                .encode(),
        );
        out
    }

    /// Parses the descriptor starting at the access selector byte.
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, selector) = u8(input)?;
        if selector != Self::ACCESS_SELECTOR {
            return Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag)));
        }
        let (input, body) = Data::parse(input)?;
        let Data::Structure(elements) = body else {
            return Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag)));
        };
        let [restricting, from_value, to_value, selected] = elements.as_slice() else {
            return Err(nom::Err::Error(NomError::new(input, ErrorKind::Count)));
        };

        let restricting_object = CaptureObject::from_data(restricting)
            .ok_or(nom::Err::Error(NomError::new(input, ErrorKind::Tag)))?;
        let from_value = parse_datetime_octets(from_value)
            .ok_or(nom::Err::Error(NomError::new(input, ErrorKind::Tag)))?;
        let to_value = parse_datetime_octets(to_value)
            .ok_or(nom::Err::Error(NomError::new(input, ErrorKind::Tag)))?;

        let Data::Array(columns) = selected else {
            return Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag)));
        };
        let mut selected_values = Vec::with_capacity(columns.len());
        for column in columns {
            let capture = CaptureObject::from_data(column)
                .ok_or(nom::Err::Error(NomError::new(input, ErrorKind::Tag)))?;
            selected_values.push(capture);
        }

        Ok((input, Self { restricting_object, from_value, to_value, selected_values }))
    }
}

fn parse_datetime_octets(data: &Data) -> Option<DateTime> {
    let Data::OctetString(bytes) = data else {
        return None;
    };
    let (rest, dt) = DateTime::parse(bytes).ok()?;
    rest.is_empty().then_some(dt)
}

/// Restricts a profile buffer read by entry numbers. Numbering starts at 1;
/// zero in a `to` field requests the highest possible value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct EntryDescriptor {
    pub from_entry: u32,
    pub to_entry: u32,
    pub from_selected_value: u16,
    pub to_selected_value: u16,
}

impl EntryDescriptor {
    pub const ACCESS_SELECTOR: u8 = 2;

    /// Selects entries `from..=to` with all columns.
    pub fn range(from_entry: u32, to_entry: u32) -> Self {
        Self { from_entry, to_entry, from_selected_value: 1, to_selected_value: 0 }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push_u8(Self::ACCESS_SELECTOR);
        out.push_bytes(
            &Data::Structure(alloc::vec![
                Data::DoubleLongUnsigned(self.from_entry),
                Data::DoubleLongUnsigned(self.to_entry),
                Data::LongUnsigned(self.from_selected_value),
                Data::LongUnsigned(self.to_selected_value),
            ])
            .encode(),
        );
        out
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, selector) = u8(input)?;
        if selector != Self::ACCESS_SELECTOR {
            return Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag)));
        }
        let (input, body) = Data::parse(input)?;
        let Data::Structure(elements) = body else {
            return Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag)));
        };
        match elements.as_slice() {
            [
                Data::DoubleLongUnsigned(from_entry),
                Data::DoubleLongUnsigned(to_entry),
                Data::LongUnsigned(from_selected_value),
                Data::LongUnsigned(to_selected_value),
            ] => Ok((
                input,
                Self {
                    from_entry: *from_entry,
                    to_entry: *to_entry,
                    from_selected_value: *from_selected_value,
                    to_selected_value: *to_selected_value,
                },
            )),
            _ => Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag))),
        }
    }
}

/// Either kind of selective-access descriptor, discriminated by the access
/// selector byte.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum AccessDescriptor {
    Range(RangeDescriptor),
    Entry(EntryDescriptor),
}

impl AccessDescriptor {
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        match input.first() {
            Some(&RangeDescriptor::ACCESS_SELECTOR) => {
                let (input, descriptor) = RangeDescriptor::parse(input)?;
                Ok((input, Self::Range(descriptor)))
            }
            Some(&EntryDescriptor::ACCESS_SELECTOR) => {
                let (input, descriptor) = EntryDescriptor::parse(input)?;
                Ok((input, Self::Entry(descriptor)))
            }
            _ => Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag))),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Range(descriptor) => descriptor.encode(),
            Self::Entry(descriptor) => descriptor.encode(),
        }
    }
}
