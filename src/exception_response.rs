//! ExceptionResponse APDU (tag 216).
//!
//! The meter signals that a service request could not be processed and
//! why. When the service error is an invocation counter error the body
//! carries the meter's current invocation counter so the client can
//! resynchronize.

use alloc::vec::Vec;
use core::fmt;

use nom::{
    IResult,
    error::{Error as NomError, ErrorKind},
    number::complete::{be_u32, u8 as nom_u8},
};

use crate::data::ByteBuffer;
use crate::enumerations::{ServiceException, StateException};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionResponse {
    pub state_error: StateException,
    pub service_error: ServiceException,
    /// The meter's current invocation counter, present when
    /// `service_error` is [`ServiceException::InvocationCounterError`].
    pub invocation_counter_data: Option<u32>,
}

impl ExceptionResponse {
    pub const TAG: u8 = 216;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(7);
        out.push_u8(Self::TAG);
        out.push_u8(self.state_error as u8);
        out.push_u8(self.service_error as u8);
        if let Some(counter) = self.invocation_counter_data {
            out.push_u32(counter);
        }
        out
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, tag) = nom_u8(input)?;
        if tag != Self::TAG {
            return Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag)));
        }
        let (input, state_error) = nom_u8(input)?;
        let state_error = StateException::try_from(state_error)
            .map_err(|_| nom::Err::Error(NomError::new(input, ErrorKind::Tag)))?;
        let (input, service_error) = nom_u8(input)?;
        let service_error = ServiceException::try_from(service_error)
            .map_err(|_| nom::Err::Error(NomError::new(input, ErrorKind::Tag)))?;

        let (input, invocation_counter_data) =
            if service_error == ServiceException::InvocationCounterError {
                let (input, counter) = be_u32(input)?;
                (input, Some(counter))
            } else {
                (input, None)
            };

        Ok((input, Self { state_error, service_error, invocation_counter_data }))
    }
}

impl fmt::Display for ExceptionResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExceptionResponse({:?}, {:?})", self.state_error, self.service_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_plain() {
        let response = ExceptionResponse {
            state_error: StateException::ServiceNotAllowed,
            service_error: ServiceException::OperationNotPossible,
            invocation_counter_data: None,
        };
        let encoded = response.encode();
        assert_eq!(encoded, alloc::vec![0xD8, 0x01, 0x01]);
        let (rest, parsed) = ExceptionResponse::parse(&encoded).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, response);
    }

    #[test]
    fn test_invocation_counter_error_carries_counter() {
        let bytes = [0xD8, 0x01, 0x06, 0x00, 0x00, 0x13, 0x91];
        let (rest, parsed) = ExceptionResponse::parse(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed.service_error, ServiceException::InvocationCounterError);
        assert_eq!(parsed.invocation_counter_data, Some(5009));
        assert_eq!(parsed.encode(), bytes);
    }

    #[test]
    fn test_unknown_errors_are_rejected() {
        assert!(ExceptionResponse::parse(&[0xD8, 0x03, 0x01]).is_err());
        assert!(ExceptionResponse::parse(&[0xD8, 0x01, 0x07]).is_err());
    }
}
