//! GeneralCiphering APDU (tag 221).
//!
//! The extended ciphering envelope: besides the protected payload it names
//! a transaction, both system titles, a timestamp, free-form other-info and
//! optionally the key material used (agreed, identified or wrapped key).

use alloc::vec::Vec;
use core::fmt;

use nom::{
    IResult,
    bytes::complete::take,
    error::{Error as NomError, ErrorKind},
    number::complete::u8 as nom_u8,
};

use crate::axdr;
use crate::data::ByteBuffer;
use crate::security_control::SecurityControl;

/// The key-info CHOICE of a GeneralCiphering APDU.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyInfo {
    /// key-id referencing a pre-shared key (choice 0)
    Identified { key_id: u8 },
    /// A key wrapped under a key-encrypting key (choice 1)
    Wrapped { kek_id: u8, key_ciphered_data: Vec<u8> },
    /// Key agreement parameters plus ciphered data (choice 2)
    Agreed { key_parameters: Vec<u8>, key_ciphered_data: Vec<u8> },
}

impl KeyInfo {
    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Self::Identified { key_id } => {
                out.push_u8(0x00);
                out.push_u8(*key_id);
            }
            Self::Wrapped { kek_id, key_ciphered_data } => {
                out.push_u8(0x01);
                out.push_u8(*kek_id);
                axdr::encode_octet_string(out, key_ciphered_data);
            }
            Self::Agreed { key_parameters, key_ciphered_data } => {
                out.push_u8(0x02);
                axdr::encode_octet_string(out, key_parameters);
                axdr::encode_octet_string(out, key_ciphered_data);
            }
        }
    }

    fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, choice) = nom_u8(input)?;
        match choice {
            0x00 => {
                let (input, key_id) = nom_u8(input)?;
                Ok((input, Self::Identified { key_id }))
            }
            0x01 => {
                let (input, kek_id) = nom_u8(input)?;
                let (input, data) = axdr::parse_octet_string(input)?;
                Ok((input, Self::Wrapped { kek_id, key_ciphered_data: data.to_vec() }))
            }
            0x02 => {
                let (input, parameters) = axdr::parse_octet_string(input)?;
                let (input, data) = axdr::parse_octet_string(input)?;
                Ok((
                    input,
                    Self::Agreed {
                        key_parameters: parameters.to_vec(),
                        key_ciphered_data: data.to_vec(),
                    },
                ))
            }
            _ => Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag))),
        }
    }
}

/// GeneralCiphering APDU.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneralCiphering {
    pub transaction_id: Vec<u8>,
    pub originator_system_title: Vec<u8>,
    pub recipient_system_title: Vec<u8>,
    /// Raw date-time octets; empty when not supplied
    pub date_time: Vec<u8>,
    pub other_information: Vec<u8>,
    pub key_info: Option<KeyInfo>,
    pub security_control: SecurityControl,
    pub invocation_counter: u32,
    pub ciphered_text: Vec<u8>,
}

impl GeneralCiphering {
    pub const TAG: u8 = 221;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push_u8(Self::TAG);
        axdr::encode_octet_string(&mut out, &self.transaction_id);
        axdr::encode_octet_string(&mut out, &self.originator_system_title);
        axdr::encode_octet_string(&mut out, &self.recipient_system_title);
        axdr::encode_octet_string(&mut out, &self.date_time);
        axdr::encode_octet_string(&mut out, &self.other_information);
        match &self.key_info {
            Some(key_info) => {
                out.push_u8(0x01);
                key_info.encode_into(&mut out);
            }
            None => out.push_u8(0x00),
        }
        // The protected payload is itself an octet string of the security
        // header and the ciphered text.
        axdr::encode_length(&mut out, 1 + 4 + self.ciphered_text.len());
        out.push_u8(self.security_control.to_byte());
        out.push_u32(self.invocation_counter);
        out.push_bytes(&self.ciphered_text);
        out
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, tag) = nom_u8(input)?;
        if tag != Self::TAG {
            return Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag)));
        }
        let (input, transaction_id) = axdr::parse_octet_string(input)?;
        let (input, originator_system_title) = axdr::parse_octet_string(input)?;
        let (input, recipient_system_title) = axdr::parse_octet_string(input)?;
        let (input, date_time) = axdr::parse_octet_string(input)?;
        let (input, other_information) = axdr::parse_octet_string(input)?;

        let (input, has_key_info) = axdr::parse_presence(input)?;
        let (input, key_info) = if has_key_info {
            let (input, key_info) = KeyInfo::parse(input)?;
            (input, Some(key_info))
        } else {
            (input, None)
        };

        let (input, payload_len) = axdr::parse_length(input)?;
        if payload_len < 5 {
            return Err(nom::Err::Error(NomError::new(input, ErrorKind::LengthValue)));
        }
        let (input, security_control) = SecurityControl::parse(input)?;
        let (input, counter_bytes) = take(4usize)(input)?;
        let invocation_counter = u32::from_be_bytes(counter_bytes.try_into().unwrap());
        let (input, ciphered_text) = take(payload_len - 5)(input)?;

        Ok((
            input,
            Self {
                transaction_id: transaction_id.to_vec(),
                originator_system_title: originator_system_title.to_vec(),
                recipient_system_title: recipient_system_title.to_vec(),
                date_time: date_time.to_vec(),
                other_information: other_information.to_vec(),
                key_info,
                security_control,
                invocation_counter,
                ciphered_text: ciphered_text.to_vec(),
            },
        ))
    }
}

impl fmt::Display for GeneralCiphering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GeneralCiphering(ic={}, {} bytes)",
            self.invocation_counter,
            self.ciphered_text.len()
        )
    }
}
