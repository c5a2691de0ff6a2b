use core::fmt::{self, Debug, Display};
use core::str::FromStr;

use nom::{IResult, Parser, number::complete::u8};
#[cfg(feature = "serde")]
use serde::{Serialize, Serializer};

use crate::error::Error;

/// An OBIS code.
///
/// Six bytes (A through F) that uniquely name an object inside a meter,
/// e.g. `1-0:1.8.0*255` for total active energy import.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObisCode {
    pub a: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub f: u8,
}

impl ObisCode {
    pub const fn new(a: u8, b: u8, c: u8, d: u8, e: u8, f: u8) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, (a, b, c, d, e, f)) = (u8, u8, u8, u8, u8, u8).parse(input)?;
        Ok((input, Self::new(a, b, c, d, e, f)))
    }

    /// Encode OBIS code as 6 raw bytes (A-B-C-D-E-F), without any A-XDR tag.
    pub fn encode(&self) -> [u8; 6] {
        [self.a, self.b, self.c, self.d, self.e, self.f]
    }
}

impl FromStr for ObisCode {
    type Err = Error;

    /// Parses both textual forms, `a-b:c.d.e.f` and `a.b.c.d.e.f`, with or
    /// without the trailing `*255`/`.255` group.
    ///
    /// # Example
    /// ```
    /// use cosem_client::ObisCode;
    ///
    /// let code: ObisCode = "1-0:1.8.0*255".parse().unwrap();
    /// assert_eq!(code, ObisCode::new(1, 0, 1, 8, 0, 255));
    /// assert_eq!(code, "1.0.1.8.0".parse().unwrap());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut groups = [0u16; 6];
        let mut count = 0;
        let mut current: Option<u16> = None;

        for ch in s.chars() {
            match ch {
                '0'..='9' => {
                    let digit = ch as u16 - '0' as u16;
                    let value = current.unwrap_or(0) * 10 + digit;
                    if value > 255 {
                        return Err(Error::Malformed(alloc::format!(
                            "OBIS group out of range in {s:?}"
                        )));
                    }
                    current = Some(value);
                }
                '-' | ':' | '.' | '*' => {
                    let Some(value) = current.take() else {
                        return Err(Error::Malformed(alloc::format!("empty OBIS group in {s:?}")));
                    };
                    if count == 6 {
                        return Err(Error::Malformed(alloc::format!(
                            "too many OBIS groups in {s:?}"
                        )));
                    }
                    groups[count] = value;
                    count += 1;
                }
                _ => {
                    return Err(Error::Malformed(alloc::format!(
                        "{s:?} is not a parsable OBIS string"
                    )));
                }
            }
        }
        if let Some(value) = current {
            if count == 6 {
                return Err(Error::Malformed(alloc::format!("too many OBIS groups in {s:?}")));
            }
            groups[count] = value;
            count += 1;
        }

        match count {
            // The final 255 group may be left out.
            5 => Ok(Self::new(
                groups[0] as u8,
                groups[1] as u8,
                groups[2] as u8,
                groups[3] as u8,
                groups[4] as u8,
                255,
            )),
            6 => Ok(Self::new(
                groups[0] as u8,
                groups[1] as u8,
                groups[2] as u8,
                groups[3] as u8,
                groups[4] as u8,
                groups[5] as u8,
            )),
            _ => Err(Error::Malformed(alloc::format!(
                "expected 5 or 6 OBIS groups in {s:?}, found {count}"
            ))),
        }
    }
}

impl Display for ObisCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}-{}:{}.{}.{}*{}", self.a, self.b, self.c, self.d, self.e, self.f)
    }
}

impl Debug for ObisCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ObisCode({})", self)
    }
}

#[cfg(feature = "serde")]
impl Serialize for ObisCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&alloc::string::ToString::to_string(self))
    }
}
