//! DataNotification APDU (tag 15).
//!
//! Unconfirmed push service: the meter sends data on its own schedule.
//! The body stays raw; it is a self-describing data value the caller can
//! decode when needed.

use alloc::vec::Vec;
use core::fmt;

use nom::{
    IResult,
    bytes::complete::take,
    error::{Error as NomError, ErrorKind},
    number::complete::u8 as nom_u8,
};

use crate::data::{ByteBuffer, Data, DateTime};
use crate::error::{Error, map_nom};
use crate::invoke_id::LongInvokeIdAndPriority;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DataNotification {
    pub long_invoke_id_and_priority: LongInvokeIdAndPriority,
    /// When the notification was generated - optional
    pub date_time: Option<DateTime>,
    /// The pushed data, kept raw
    pub body: Vec<u8>,
}

impl DataNotification {
    pub const TAG: u8 = 15;

    /// Parses the body as a DLMS data value.
    pub fn value(&self) -> Result<Data, Error> {
        let (_, data) = Data::parse(&self.body).map_err(map_nom("data-notification body"))?;
        Ok(data)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push_u8(Self::TAG);
        out.push_bytes(&self.long_invoke_id_and_priority.encode());
        match &self.date_time {
            Some(date_time) => {
                out.push_u8(0x01);
                out.push_bytes(&date_time.encode());
            }
            None => out.push_u8(0x00),
        }
        out.push_bytes(&self.body);
        out
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, tag) = nom_u8(input)?;
        if tag != Self::TAG {
            return Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag)));
        }
        let (input, long_invoke_id_and_priority) = LongInvokeIdAndPriority::parse(input)?;
        let (input, has_datetime) = crate::axdr::parse_presence(input)?;
        let (input, date_time) = if has_datetime {
            let (input, date_time) = DateTime::parse(input)?;
            (input, Some(date_time))
        } else {
            (input, None)
        };
        let body = input.to_vec();
        let (input, _) = take(input.len())(input)?;
        Ok((input, Self { long_invoke_id_and_priority, date_time, body }))
    }
}

impl fmt::Display for DataNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DataNotification(id={}, {} bytes)",
            self.long_invoke_id_and_priority.long_invoke_id,
            self.body.len()
        )
    }
}
