//! DLMS data types.
//!
//! The wire representation is a recursive tagged union: one tag byte, an
//! A-XDR length for variable-width types, then the value bytes. Fixed-width
//! types carry no length byte. Reference: Green Book Ed. 12, Section 4.1.6.

#[cfg(feature = "serde")]
use alloc::string::ToString;
use alloc::{string::String, vec::Vec};
use core::convert::TryFrom;
use core::fmt;

use nom::{
    IResult, Parser,
    bytes::streaming::take,
    combinator::fail,
    number::streaming::{be_f32, be_f64, be_i16, be_i32, be_i64, be_u16, be_u32, be_u64, i8, u8},
};
#[cfg(feature = "serde")]
use serde::{Serialize, Serializer};

#[cfg(feature = "chrono-conversions")]
use chrono::{Datelike, Timelike};

use crate::axdr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
#[rustfmt::skip]
pub enum DataType {
  Null               =   0,
  Array              =   1,
  Structure          =   2,
  Bool               =   3,
  BitString          =   4,
  DoubleLong         =   5,
  DoubleLongUnsigned =   6,
  OctetString        =   9,
  VisibleString      =  10,
  Utf8String         =  12,
  BinaryCodedDecimal =  13,
  Integer            =  15,
  Long               =  16,
  Unsigned           =  17,
  LongUnsigned       =  18,
  CompactArray       =  19,
  Long64             =  20,
  Long64Unsigned     =  21,
  Enum               =  22,
  Float32            =  23,
  Float64            =  24,
  DateTime           =  25,
  Date               =  26,
  Time               =  27,
  DontCare           = 255,
}

impl TryFrom<u8> for DataType {
    type Error = u8;

    fn try_from(dt: u8) -> Result<Self, Self::Error> {
        Ok(match dt {
            0x00 => Self::Null,
            0x01 => Self::Array,
            0x02 => Self::Structure,
            0x03 => Self::Bool,
            0x04 => Self::BitString,
            0x05 => Self::DoubleLong,
            0x06 => Self::DoubleLongUnsigned,
            0x09 => Self::OctetString,
            0x0a => Self::VisibleString,
            0x0c => Self::Utf8String,
            0x0d => Self::BinaryCodedDecimal,
            0x0f => Self::Integer,
            0x10 => Self::Long,
            0x11 => Self::Unsigned,
            0x12 => Self::LongUnsigned,
            0x13 => Self::CompactArray,
            0x14 => Self::Long64,
            0x15 => Self::Long64Unsigned,
            0x16 => Self::Enum,
            0x17 => Self::Float32,
            0x18 => Self::Float64,
            0x19 => Self::DateTime,
            0x1a => Self::Date,
            0x1b => Self::Time,
            0xff => Self::DontCare,
            dt => return Err(dt),
        })
    }
}

/// Which sign the datetime deviation field carries.
///
/// The Blue Book (4.1.6.1) defines the deviation as the number of minutes to
/// add to local time to reach UTC, so UTC+1 is transmitted as -60. Some
/// meters ship firmware with the opposite convention; selecting
/// [`DeviationConvention::Reversed`] flips the interpretation without
/// touching the stored bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviationConvention {
    #[default]
    BlueBook,
    Reversed,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Date {
    pub year: u16,
    pub month: u8,
    pub day_of_month: u8,
    pub day_of_week: u8,
}

impl Date {
    /// Year value meaning "not specified".
    pub const UNSPECIFIED_YEAR: u16 = 0xFFFF;
    /// Month value marking the end of daylight saving time.
    pub const DST_END: u8 = 0xFD;
    /// Month value marking the beginning of daylight saving time.
    pub const DST_BEGIN: u8 = 0xFE;
    /// Day-of-month value meaning "last day of month".
    pub const LAST_DAY_OF_MONTH: u8 = 0xFE;

    /// Encode Date to 5 bytes: year_high, year_low, month, day_of_month,
    /// day_of_week. Reference: Green Book Ed. 12, Section 4.1.6.1.
    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(5);
        buffer.push_u16(self.year);
        buffer.push_u8(self.month);
        buffer.push_u8(self.day_of_month);
        buffer.push_u8(self.day_of_week);
        buffer
    }

    #[cfg(feature = "chrono-conversions")]
    /// Create a Date from a chrono NaiveDate.
    ///
    /// The day_of_week is calculated from the date; both chrono and DLMS use
    /// ISO 8601 weekday numbering (Monday=1, Sunday=7).
    pub fn from_chrono(date: &chrono::NaiveDate) -> Self {
        Self {
            year: date.year() as u16,
            month: date.month() as u8,
            day_of_month: date.day() as u8,
            day_of_week: date.weekday().number_from_monday() as u8,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, year) = be_u16(input)?;
        let (input, month) = u8(input)?;
        let (input, day_of_month) = u8(input)?;
        let (input, day_of_week) = u8(input)?;

        Ok((input, Self { year, month, day_of_month, day_of_week }))
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day_of_month)
    }
}

impl fmt::Debug for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Date(\"{}\")", self)
    }
}

#[cfg(feature = "serde")]
impl Serialize for Date {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Time {
    pub hour: Option<u8>,
    pub minute: Option<u8>,
    pub second: Option<u8>,
    pub hundredth: Option<u8>,
}

impl Time {
    /// Encode Time to 4 bytes: hour, minute, second, hundredth.
    /// None values are encoded as 0xFF (wildcard per DLMS spec).
    pub fn encode(&self) -> Vec<u8> {
        alloc::vec![
            self.hour.unwrap_or(0xFF),
            self.minute.unwrap_or(0xFF),
            self.second.unwrap_or(0xFF),
            self.hundredth.unwrap_or(0xFF),
        ]
    }

    #[cfg(feature = "chrono-conversions")]
    /// Create a Time from a chrono NaiveTime. Milliseconds are converted to
    /// hundredths of a second (truncated).
    pub fn from_chrono(time: &chrono::NaiveTime) -> Self {
        Self {
            hour: Some(time.hour() as u8),
            minute: Some(time.minute() as u8),
            second: Some(time.second() as u8),
            hundredth: Some((time.nanosecond() / 10_000_000) as u8),
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, (hour, minute, second, hundredth)) = (u8, u8, u8, u8).parse(input)?;

        let hour = match hour {
            0xff => None,
            0..=23 => Some(hour),
            _ => return fail().parse(input),
        };
        let minute = match minute {
            0xff => None,
            0..=59 => Some(minute),
            _ => return fail().parse(input),
        };
        let second = match second {
            0xff => None,
            0..=59 => Some(second),
            _ => return fail().parse(input),
        };
        let hundredth = match hundredth {
            0xff => None,
            0..=99 => Some(hundredth),
            _ => return fail().parse(input),
        };

        Ok((input, Self { hour, minute, second, hundredth }))
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}.{:02}",
            self.hour.unwrap_or(0),
            self.minute.unwrap_or(0),
            self.second.unwrap_or(0),
            self.hundredth.unwrap_or(0),
        )
    }
}

impl fmt::Debug for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Time(\"{}\")", self)
    }
}

#[cfg(feature = "serde")]
impl Serialize for Time {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct ClockStatus(pub u8);

impl ClockStatus {
    #[rustfmt::skip]
    const INVALID_VALUE_BIT:   u8 = 0b00000001;
    #[rustfmt::skip]
    const DOUBTFUL_VALUE_BIT:  u8 = 0b00000010;
    #[rustfmt::skip]
    const DIFFERENT_BASE_BIT:  u8 = 0b00000100;
    #[rustfmt::skip]
    const INVALID_STATUS_BIT:  u8 = 0b00001000;
    #[rustfmt::skip]
    const DAYLIGHT_SAVING_BIT: u8 = 0b10000000;

    pub fn invalid_value(&self) -> bool {
        (self.0 & Self::INVALID_VALUE_BIT) != 0
    }

    pub fn doubtful_value(&self) -> bool {
        (self.0 & Self::DOUBTFUL_VALUE_BIT) != 0
    }

    pub fn different_base(&self) -> bool {
        (self.0 & Self::DIFFERENT_BASE_BIT) != 0
    }

    pub fn invalid_status(&self) -> bool {
        (self.0 & Self::INVALID_STATUS_BIT) != 0
    }

    pub fn daylight_saving(&self) -> bool {
        (self.0 & Self::DAYLIGHT_SAVING_BIT) != 0
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct DateTime {
    pub date: Date,
    pub time: Time,
    /// Raw wire deviation in minutes, 0x8000 parsed as `None`. In the Blue
    /// Book sense this is minutes to add to local time to reach UTC.
    pub deviation: Option<i16>,
    pub clock_status: Option<ClockStatus>,
}

impl DateTime {
    /// Encode DateTime to 12 bytes: date (5) + time (4) + deviation (2) +
    /// clock_status (1). None deviation encodes as 0x8000, none status as
    /// 0xFF.
    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(12);
        buffer.push_bytes(&self.date.encode());
        buffer.push_bytes(&self.time.encode());
        buffer.push_i16(self.deviation.unwrap_or(-0x8000));
        buffer.push_u8(self.clock_status.as_ref().map(|cs| cs.0).unwrap_or(0xFF));
        buffer
    }

    /// The timezone offset in the usual sense (positive = east of UTC),
    /// under the given deviation convention.
    pub fn tz_offset_minutes(&self, convention: DeviationConvention) -> Option<i16> {
        self.deviation.map(|deviation| match convention {
            DeviationConvention::BlueBook => -deviation,
            DeviationConvention::Reversed => deviation,
        })
    }

    /// Sets the deviation from a timezone offset (positive = east of UTC)
    /// under the given convention.
    pub fn set_tz_offset_minutes(&mut self, offset: i16, convention: DeviationConvention) {
        self.deviation = Some(match convention {
            DeviationConvention::BlueBook => -offset,
            DeviationConvention::Reversed => offset,
        });
    }

    #[cfg(feature = "chrono-conversions")]
    /// Create a DateTime from a chrono NaiveDateTime, a timezone offset in
    /// minutes (positive = east of UTC) and a clock status byte. The offset
    /// is stored in the Blue Book deviation sense.
    pub fn from_chrono(dt: &chrono::NaiveDateTime, tz_offset_minutes: i16, clock_status: u8) -> Self {
        let mut out = Self {
            date: Date::from_chrono(&dt.date()),
            time: Time::from_chrono(&dt.time()),
            deviation: None,
            clock_status: Some(ClockStatus(clock_status)),
        };
        out.set_tz_offset_minutes(tz_offset_minutes, DeviationConvention::BlueBook);
        out
    }

    #[cfg(all(feature = "std", feature = "chrono-conversions"))]
    /// Create a DateTime representing the current local time.
    pub fn now() -> Self {
        use chrono::Local;
        let local_time = Local::now();
        let naive = local_time.naive_local();
        let offset_seconds = local_time.offset().local_minus_utc();
        let offset_minutes = (offset_seconds / 60) as i16;

        Self::from_chrono(&naive, offset_minutes, 0x00)
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, date) = Date::parse(input)?;
        let (input, time) = Time::parse(input)?;
        let (input, deviation) = be_i16(input)?;
        let deviation = Some(deviation).filter(|&b| b != 0x8000u16 as i16);
        let (input, clock_status) = u8(input)?;
        let clock_status = Some(clock_status).filter(|&b| b != 0xff).map(ClockStatus);

        Ok((input, Self { date, time, deviation, clock_status }))
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}T{}", self.date, self.time)?;

        if let Some(deviation) = self.deviation {
            // Deviation is minutes-to-UTC, so the printed offset is negated.
            if deviation > 0 {
                '-'.fmt(f)?;
            } else {
                '+'.fmt(f)?;
            };
            let deviation = deviation.abs();
            write!(f, "{:02}:{:02}", deviation / 60, deviation % 60)?;
        }

        Ok(())
    }
}

impl fmt::Debug for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DateTime(\"{}\")", self)
    }
}

#[cfg(feature = "serde")]
impl Serialize for DateTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Bit-string value: the length prefix counts bits, the payload carries
/// ceil(bits / 8) bytes, MSB first.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct BitString {
    pub bits: usize,
    pub data: Vec<u8>,
}

impl BitString {
    pub fn new(bits: usize, data: Vec<u8>) -> Self {
        Self { bits, data }
    }

    fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, bits) = axdr::parse_length(input)?;
        let (input, data) = take(bits.div_ceil(8))(input)?;
        Ok((input, Self { bits, data: data.to_vec() }))
    }
}

/// Element type of a compact-array (tag 19). Arrays and structures nest;
/// everything else is a bare type tag.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum TypeDescription {
    Simple(u8),
    Array { count: u16, element: alloc::boxed::Box<TypeDescription> },
    Structure(Vec<TypeDescription>),
}

impl TypeDescription {
    fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, tag) = u8(input)?;
        match tag {
            0x01 => {
                let (input, count) = be_u16(input)?;
                let (input, element) = Self::parse(input)?;
                Ok((input, Self::Array { count, element: alloc::boxed::Box::new(element) }))
            }
            0x02 => {
                let (mut input, count) = axdr::parse_length(input)?;
                let mut elements = Vec::with_capacity(count);
                for _ in 0..count {
                    let (rest, element) = Self::parse(input)?;
                    elements.push(element);
                    input = rest;
                }
                Ok((input, Self::Structure(elements)))
            }
            tag => Ok((input, Self::Simple(tag))),
        }
    }

    fn encode_into(&self, buffer: &mut Vec<u8>) {
        match self {
            Self::Simple(tag) => buffer.push(*tag),
            Self::Array { count, element } => {
                buffer.push(0x01);
                buffer.push_u16(*count);
                element.encode_into(buffer);
            }
            Self::Structure(elements) => {
                buffer.push(0x02);
                axdr::encode_length(buffer, elements.len());
                for element in elements {
                    element.encode_into(buffer);
                }
            }
        }
    }
}

/// Compact-array payload: a type description followed by the packed element
/// contents without per-element tags. The contents are kept raw; unpacking
/// them needs the description and is left to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct CompactArray {
    pub type_description: TypeDescription,
    pub contents: Vec<u8>,
}

#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Data {
    Null,
    Array(Vec<Data>),
    Structure(Vec<Data>),
    Bool(bool),
    BitString(BitString),
    DoubleLong(i32),
    DoubleLongUnsigned(u32),
    OctetString(Vec<u8>),
    VisibleString(String),
    Utf8String(String),
    BinaryCodedDecimal(Vec<u8>),
    Integer(i8),
    Long(i16),
    Unsigned(u8),
    LongUnsigned(u16),
    CompactArray(CompactArray),
    Long64(i64),
    Long64Unsigned(u64),
    Enum(u8),
    Float32(f32),
    Float64(f64),
    DateTime(DateTime),
    Date(Date),
    Time(Time),
    DontCare,
}

/// Helper trait for building encoded buffers with big-endian byte order.
/// All multi-byte integers are big-endian per DLMS specification.
pub trait ByteBuffer {
    fn push_u8(&mut self, value: u8);
    fn push_u16(&mut self, value: u16);
    fn push_u32(&mut self, value: u32);
    fn push_u64(&mut self, value: u64);
    fn push_i8(&mut self, value: i8);
    fn push_i16(&mut self, value: i16);
    fn push_i32(&mut self, value: i32);
    fn push_i64(&mut self, value: i64);
    fn push_bytes(&mut self, bytes: &[u8]);
}

impl ByteBuffer for Vec<u8> {
    fn push_u8(&mut self, value: u8) {
        self.push(value);
    }

    fn push_u16(&mut self, value: u16) {
        self.extend_from_slice(&value.to_be_bytes());
    }

    fn push_u32(&mut self, value: u32) {
        self.extend_from_slice(&value.to_be_bytes());
    }

    fn push_u64(&mut self, value: u64) {
        self.extend_from_slice(&value.to_be_bytes());
    }

    fn push_i8(&mut self, value: i8) {
        self.push(value as u8);
    }

    fn push_i16(&mut self, value: i16) {
        self.extend_from_slice(&value.to_be_bytes());
    }

    fn push_i32(&mut self, value: i32) {
        self.extend_from_slice(&value.to_be_bytes());
    }

    fn push_i64(&mut self, value: i64) {
        self.extend_from_slice(&value.to_be_bytes());
    }

    fn push_bytes(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

impl Data {
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, data_type) = u8(input)?;
        let data_type = DataType::try_from(data_type).map_err(|_| {
            nom::Err::Failure(nom::error::Error::new(input, nom::error::ErrorKind::Fail))
        })?;
        Ok(match data_type {
            DataType::Null => (input, Data::Null),
            DataType::DontCare => (input, Data::DontCare),
            DataType::Array => {
                let (input, elements) = Self::parse_elements(input)?;
                (input, Data::Array(elements))
            }
            DataType::Structure => {
                let (input, elements) = Self::parse_elements(input)?;
                (input, Data::Structure(elements))
            }
            DataType::Bool => {
                let (input, b) = u8(input)?;
                (input, Data::Bool(b != 0))
            }
            DataType::BitString => {
                let (input, bits) = BitString::parse(input)?;
                (input, Data::BitString(bits))
            }
            DataType::OctetString => {
                let (input, bytes) = axdr::parse_octet_string(input)?;
                (input, Data::OctetString(bytes.to_vec()))
            }
            DataType::VisibleString => {
                let (input, bytes) = axdr::parse_octet_string(input)?;
                let string = String::from_utf8(bytes.to_vec()).map_err(|_| {
                    nom::Err::Failure(nom::error::Error::new(input, nom::error::ErrorKind::Fail))
                })?;
                (input, Data::VisibleString(string))
            }
            DataType::Utf8String => {
                let (input, bytes) = axdr::parse_octet_string(input)?;
                let string = String::from_utf8(bytes.to_vec()).map_err(|_| {
                    nom::Err::Failure(nom::error::Error::new(input, nom::error::ErrorKind::Fail))
                })?;
                (input, Data::Utf8String(string))
            }
            DataType::BinaryCodedDecimal => {
                let (input, bytes) = axdr::parse_octet_string(input)?;
                (input, Data::BinaryCodedDecimal(bytes.to_vec()))
            }
            DataType::CompactArray => {
                let (input, type_description) = TypeDescription::parse(input)?;
                let (input, contents) = axdr::parse_octet_string(input)?;
                (
                    input,
                    Data::CompactArray(CompactArray {
                        type_description,
                        contents: contents.to_vec(),
                    }),
                )
            }
            DataType::Integer => {
                let (input, n) = i8(input)?;
                (input, Data::Integer(n))
            }
            DataType::Long => {
                let (input, n) = be_i16(input)?;
                (input, Data::Long(n))
            }
            DataType::DoubleLong => {
                let (input, n) = be_i32(input)?;
                (input, Data::DoubleLong(n))
            }
            DataType::Long64 => {
                let (input, n) = be_i64(input)?;
                (input, Data::Long64(n))
            }
            DataType::Unsigned => {
                let (input, n) = u8(input)?;
                (input, Data::Unsigned(n))
            }
            DataType::LongUnsigned => {
                let (input, n) = be_u16(input)?;
                (input, Data::LongUnsigned(n))
            }
            DataType::DoubleLongUnsigned => {
                let (input, n) = be_u32(input)?;
                (input, Data::DoubleLongUnsigned(n))
            }
            DataType::Long64Unsigned => {
                let (input, n) = be_u64(input)?;
                (input, Data::Long64Unsigned(n))
            }
            DataType::Enum => {
                let (input, n) = u8(input)?;
                (input, Data::Enum(n))
            }
            DataType::Float32 => {
                let (input, n) = be_f32(input)?;
                (input, Data::Float32(n))
            }
            DataType::Float64 => {
                let (input, n) = be_f64(input)?;
                (input, Data::Float64(n))
            }
            DataType::DateTime => {
                let (input, date_time) = DateTime::parse(input)?;
                (input, Data::DateTime(date_time))
            }
            DataType::Date => {
                let (input, date) = Date::parse(input)?;
                (input, Data::Date(date))
            }
            DataType::Time => {
                let (input, time) = Time::parse(input)?;
                (input, Data::Time(time))
            }
        })
    }

    fn parse_elements(input: &[u8]) -> IResult<&[u8], Vec<Data>> {
        let (mut input, count) = axdr::parse_length(input)?;
        let mut elements = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            let (rest, element) = Self::parse(input)?;
            elements.push(element);
            input = rest;
        }
        Ok((input, elements))
    }

    /// Encode the value to its self-describing form (tag + data).
    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(self.encoded_len());

        match self {
            Data::Null => {
                buffer.push_u8(0x00);
            }
            Data::DontCare => {
                buffer.push_u8(0xFF);
            }
            Data::Array(elements) => {
                buffer.push_u8(0x01);
                axdr::encode_length(&mut buffer, elements.len());
                for element in elements {
                    buffer.push_bytes(&element.encode());
                }
            }
            Data::Structure(elements) => {
                buffer.push_u8(0x02);
                axdr::encode_length(&mut buffer, elements.len());
                for element in elements {
                    buffer.push_bytes(&element.encode());
                }
            }
            Data::Bool(value) => {
                buffer.push_u8(0x03);
                buffer.push_u8(if *value { 0x01 } else { 0x00 });
            }
            Data::BitString(value) => {
                buffer.push_u8(0x04);
                axdr::encode_length(&mut buffer, value.bits);
                buffer.push_bytes(&value.data);
            }
            Data::DoubleLong(value) => {
                buffer.push_u8(0x05);
                buffer.push_i32(*value);
            }
            Data::DoubleLongUnsigned(value) => {
                buffer.push_u8(0x06);
                buffer.push_u32(*value);
            }
            Data::OctetString(bytes) => {
                buffer.push_u8(0x09);
                axdr::encode_octet_string(&mut buffer, bytes);
            }
            Data::VisibleString(string) => {
                buffer.push_u8(0x0A);
                axdr::encode_octet_string(&mut buffer, string.as_bytes());
            }
            Data::Utf8String(string) => {
                buffer.push_u8(0x0C);
                axdr::encode_octet_string(&mut buffer, string.as_bytes());
            }
            Data::BinaryCodedDecimal(bytes) => {
                buffer.push_u8(0x0D);
                axdr::encode_octet_string(&mut buffer, bytes);
            }
            Data::Integer(value) => {
                buffer.push_u8(0x0F);
                buffer.push_i8(*value);
            }
            Data::Long(value) => {
                buffer.push_u8(0x10);
                buffer.push_i16(*value);
            }
            Data::Unsigned(value) => {
                buffer.push_u8(0x11);
                buffer.push_u8(*value);
            }
            Data::LongUnsigned(value) => {
                buffer.push_u8(0x12);
                buffer.push_u16(*value);
            }
            Data::CompactArray(value) => {
                buffer.push_u8(0x13);
                value.type_description.encode_into(&mut buffer);
                axdr::encode_octet_string(&mut buffer, &value.contents);
            }
            Data::Long64(value) => {
                buffer.push_u8(0x14);
                buffer.push_i64(*value);
            }
            Data::Long64Unsigned(value) => {
                buffer.push_u8(0x15);
                buffer.push_u64(*value);
            }
            Data::Enum(value) => {
                buffer.push_u8(0x16);
                buffer.push_u8(*value);
            }
            Data::Float32(value) => {
                buffer.push_u8(0x17);
                buffer.push_u32(value.to_bits());
            }
            Data::Float64(value) => {
                buffer.push_u8(0x18);
                buffer.push_u64(value.to_bits());
            }
            Data::DateTime(dt) => {
                buffer.push_u8(0x19);
                buffer.push_bytes(&dt.encode());
            }
            Data::Date(date) => {
                buffer.push_u8(0x1A);
                buffer.push_bytes(&date.encode());
            }
            Data::Time(time) => {
                buffer.push_u8(0x1B);
                buffer.push_bytes(&time.encode());
            }
        }

        buffer
    }

    /// Calculate the encoded length without allocating.
    pub fn encoded_len(&self) -> usize {
        match self {
            Data::Null | Data::DontCare => 1,
            Data::Bool(_) => 2,
            Data::Integer(_) => 2,
            Data::Unsigned(_) => 2,
            Data::Enum(_) => 2,
            Data::Long(_) => 3,
            Data::LongUnsigned(_) => 3,
            Data::DoubleLong(_) => 5,
            Data::DoubleLongUnsigned(_) => 5,
            Data::Float32(_) => 5,
            Data::Long64(_) => 9,
            Data::Long64Unsigned(_) => 9,
            Data::Float64(_) => 9,
            Data::DateTime(_) => 1 + 12,
            Data::Date(_) => 1 + 5,
            Data::Time(_) => 1 + 4,
            Data::BitString(value) => 1 + length_len(value.bits) + value.bits.div_ceil(8),
            Data::OctetString(bytes) => 1 + length_len(bytes.len()) + bytes.len(),
            Data::VisibleString(string) => 1 + length_len(string.len()) + string.len(),
            Data::Utf8String(string) => 1 + length_len(string.len()) + string.len(),
            Data::BinaryCodedDecimal(bytes) => 1 + length_len(bytes.len()) + bytes.len(),
            Data::CompactArray(value) => {
                // Descriptor size is not worth precomputing, underestimate.
                1 + 1 + length_len(value.contents.len()) + value.contents.len()
            }
            Data::Array(elements) | Data::Structure(elements) => {
                1 + length_len(elements.len())
                    + elements.iter().map(|e| e.encoded_len()).sum::<usize>()
            }
        }
    }
}

fn length_len(length: usize) -> usize {
    match length {
        0..0x80 => 1,
        0x80..0x100 => 2,
        0x100..0x10000 => 3,
        _ => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn roundtrip(data: Data) {
        let encoded = data.encode();
        let (rest, parsed) = Data::parse(&encoded).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, data);
    }

    #[test]
    fn test_parse_null() {
        let input = [0x00, 0xFF];
        let (remaining, data) = Data::parse(&input).unwrap();
        assert_eq!(remaining, &[0xFF]);
        assert_eq!(data, Data::Null);
    }

    #[test]
    fn test_parse_dont_care() {
        let (_, data) = Data::parse(&[0xFF]).unwrap();
        assert_eq!(data, Data::DontCare);
    }

    #[test]
    fn test_parse_integers() {
        assert_eq!(Data::parse(&[0x0F, 0xD6]).unwrap().1, Data::Integer(-42));
        assert_eq!(Data::parse(&[0x11, 0x2A]).unwrap().1, Data::Unsigned(0x2A));
        assert_eq!(Data::parse(&[0x10, 0x01, 0x00]).unwrap().1, Data::Long(256));
        assert_eq!(Data::parse(&[0x12, 0x01, 0x00]).unwrap().1, Data::LongUnsigned(256));
        assert_eq!(
            Data::parse(&[0x06, 0x00, 0x00, 0x13, 0x91]).unwrap().1,
            Data::DoubleLongUnsigned(5009)
        );
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(Data::parse(&[0x03, 0x00]).unwrap().1, Data::Bool(false));
        assert_eq!(Data::parse(&[0x03, 0x01]).unwrap().1, Data::Bool(true));
    }

    #[test]
    fn test_parse_octet_string() {
        let input = [0x09, 0x03, 0xAA, 0xBB, 0xCC];
        assert_eq!(Data::parse(&input).unwrap().1, Data::OctetString(vec![0xAA, 0xBB, 0xCC]));
    }

    #[test]
    fn test_parse_bit_string_partial_byte() {
        // 11 bits need two bytes
        let input = [0x04, 0x0B, 0b1010_1010, 0b1100_0000];
        let (_, data) = Data::parse(&input).unwrap();
        assert_eq!(
            data,
            Data::BitString(BitString::new(11, vec![0b1010_1010, 0b1100_0000]))
        );
    }

    #[test]
    fn test_parse_structure() {
        // structure { unsigned 1, octet-string "ab" }
        let input = [0x02, 0x02, 0x11, 0x01, 0x09, 0x02, b'a', b'b'];
        let (_, data) = Data::parse(&input).unwrap();
        assert_eq!(
            data,
            Data::Structure(vec![Data::Unsigned(1), Data::OctetString(vec![b'a', b'b'])])
        );
    }

    #[test]
    fn test_parse_array_of_structures() {
        let input = [0x01, 0x02, 0x02, 0x01, 0x0F, 0x01, 0x02, 0x01, 0x0F, 0x02];
        let (_, data) = Data::parse(&input).unwrap();
        assert_eq!(
            data,
            Data::Array(vec![
                Data::Structure(vec![Data::Integer(1)]),
                Data::Structure(vec![Data::Integer(2)]),
            ])
        );
    }

    #[test]
    fn test_parse_never_reads_past_length() {
        // Octet string claims 4 bytes but only 2 are present.
        assert!(Data::parse(&[0x09, 0x04, 0x01, 0x02]).is_err());
    }

    #[test]
    fn test_parse_unknown_tag_fails() {
        assert!(Data::parse(&[0x07, 0x00]).is_err());
    }

    #[test]
    fn test_roundtrip_scalars() {
        roundtrip(Data::Null);
        roundtrip(Data::Bool(true));
        roundtrip(Data::Integer(-5));
        roundtrip(Data::Unsigned(200));
        roundtrip(Data::Long(-1000));
        roundtrip(Data::LongUnsigned(40000));
        roundtrip(Data::DoubleLong(-100000));
        roundtrip(Data::DoubleLongUnsigned(5009));
        roundtrip(Data::Long64(-1));
        roundtrip(Data::Long64Unsigned(u64::MAX));
        roundtrip(Data::Enum(7));
        roundtrip(Data::Float32(1.5));
        roundtrip(Data::Float64(-2.25));
        roundtrip(Data::DontCare);
    }

    #[test]
    fn test_roundtrip_strings() {
        roundtrip(Data::OctetString(vec![0u8; 200]));
        roundtrip(Data::VisibleString(String::from("METER01")));
        roundtrip(Data::Utf8String(String::from("målare")));
        roundtrip(Data::BinaryCodedDecimal(vec![0x12, 0x34]));
    }

    #[test]
    fn test_roundtrip_nested() {
        roundtrip(Data::Structure(vec![
            Data::Array(vec![Data::Unsigned(1), Data::Unsigned(2)]),
            Data::OctetString(vec![1, 2, 3]),
            Data::Null,
        ]));
    }

    #[test]
    fn test_roundtrip_compact_array() {
        roundtrip(Data::CompactArray(CompactArray {
            type_description: TypeDescription::Structure(vec![
                TypeDescription::Simple(0x12),
                TypeDescription::Simple(0x09),
            ]),
            contents: vec![0x00, 0x01, 0x02],
        }));
    }

    #[test]
    fn test_long_octet_string_uses_multi_byte_length() {
        let data = Data::OctetString(vec![0xAB; 300]);
        let encoded = data.encode();
        assert_eq!(&encoded[..4], &[0x09, 0x82, 0x01, 0x2C]);
        roundtrip(data);
    }

    #[test]
    fn test_date_parse_and_encode() {
        let input = [0x07, 0xE9, 0x01, 0x0F, 0x01];
        let (_, date) = Date::parse(&input).unwrap();
        assert_eq!(date.year, 2025);
        assert_eq!(date.month, 1);
        assert_eq!(date.day_of_month, 15);
        assert_eq!(date.day_of_week, 1);
        assert_eq!(date.encode(), input);
    }

    #[test]
    fn test_date_wildcards() {
        let input = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        let (_, date) = Date::parse(&input).unwrap();
        assert_eq!(date.year, Date::UNSPECIFIED_YEAR);
    }

    #[test]
    fn test_time_parse_rejects_invalid() {
        assert!(Time::parse(&[0x18, 0x00, 0x00, 0x00]).is_err()); // hour 24
        assert!(Time::parse(&[0x0C, 0x3C, 0x00, 0x00]).is_err()); // minute 60
        assert!(Time::parse(&[0x0C, 0x1E, 0x3C, 0x00]).is_err()); // second 60
        assert!(Time::parse(&[0x0C, 0x1E, 0x00, 0x64]).is_err()); // hundredth 100
    }

    #[test]
    fn test_time_wildcards() {
        let (_, time) = Time::parse(&[0xFF, 0xFF, 0xFF, 0xFF]).unwrap();
        assert_eq!(time.hour, None);
        assert_eq!(time.encode(), [0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_datetime_deviation_unspecified() {
        let mut bytes = vec![0x07, 0xE9, 0x01, 0x0F, 0x01, 0x0C, 0x1E, 0x00, 0x00];
        bytes.extend_from_slice(&[0x80, 0x00, 0xFF]);
        let (_, dt) = DateTime::parse(&bytes).unwrap();
        assert_eq!(dt.deviation, None);
        assert_eq!(dt.clock_status, None);
        assert_eq!(dt.encode(), bytes);
    }

    #[test]
    fn test_datetime_deviation_sign_convention() {
        // UTC+1 encodes as -60 in the Blue Book sense.
        let mut bytes = vec![0x07, 0xE9, 0x01, 0x0F, 0x01, 0x0C, 0x1E, 0x00, 0x00];
        bytes.extend_from_slice(&[0xFF, 0xC4, 0x00]); // -60, status 0
        let (_, dt) = DateTime::parse(&bytes).unwrap();
        assert_eq!(dt.deviation, Some(-60));
        assert_eq!(dt.tz_offset_minutes(DeviationConvention::BlueBook), Some(60));
        assert_eq!(dt.tz_offset_minutes(DeviationConvention::Reversed), Some(-60));
    }

    #[test]
    fn test_datetime_set_tz_offset() {
        let (_, mut dt) = DateTime::parse(&[
            0x07, 0xE9, 0x01, 0x0F, 0x01, 0x0C, 0x1E, 0x00, 0x00, 0x80, 0x00, 0xFF,
        ])
        .unwrap();
        dt.set_tz_offset_minutes(120, DeviationConvention::BlueBook);
        assert_eq!(dt.deviation, Some(-120));
        dt.set_tz_offset_minutes(120, DeviationConvention::Reversed);
        assert_eq!(dt.deviation, Some(120));
    }

    #[test]
    fn test_clock_status_bits() {
        let status = ClockStatus(0b1000_0011);
        assert!(status.invalid_value());
        assert!(status.doubtful_value());
        assert!(!status.different_base());
        assert!(!status.invalid_status());
        assert!(status.daylight_saving());
    }

    #[test]
    fn test_datetime_in_data_roundtrip() {
        let (_, dt) = DateTime::parse(&[
            0x07, 0xE9, 0x06, 0x0F, 0x07, 0x0A, 0x00, 0x00, 0x00, 0xFF, 0x88, 0x00,
        ])
        .unwrap();
        roundtrip(Data::DateTime(dt));
    }
}
