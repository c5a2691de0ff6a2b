//! ConfirmedServiceError APDU (tag 14).
//!
//! Returned instead of a service response (or inside an AARE) when the
//! requested service could not be carried out. The body is a service
//! choice byte followed by an error class and a value within the class.

use alloc::vec::Vec;
use core::fmt;

use derive_try_from_primitive::TryFromPrimitive;
use nom::{
    IResult,
    error::{Error as NomError, ErrorKind},
    number::complete::u8 as nom_u8,
};

use crate::enumerations::{
    AccessError, ApplicationReferenceError, DataScopeError, DefinitionError, HardwareResourceError,
    InitiateError, LoadDataError, OtherError, ServiceProviderError, TaskError, VdeStateError,
};

/// The service the error relates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum ConfirmedServiceChoice {
    InitiateError = 1,
    Read = 5,
    Write = 6,
}

/// An error class and its value. The class byte on the wire selects the
/// enumeration the value byte belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorValue {
    ApplicationReference(ApplicationReferenceError),
    HardwareResource(HardwareResourceError),
    VdeState(VdeStateError),
    Service(ServiceProviderError),
    Definition(DefinitionError),
    Access(AccessError),
    Initiate(InitiateError),
    LoadData(LoadDataError),
    DataScope(DataScopeError),
    Task(TaskError),
    Other(OtherError),
}

impl ServiceErrorValue {
    fn from_bytes(class: u8, value: u8) -> Option<Self> {
        Some(match class {
            0 => Self::ApplicationReference(ApplicationReferenceError::try_from(value).ok()?),
            1 => Self::HardwareResource(HardwareResourceError::try_from(value).ok()?),
            2 => Self::VdeState(VdeStateError::try_from(value).ok()?),
            3 => Self::Service(ServiceProviderError::try_from(value).ok()?),
            4 => Self::Definition(DefinitionError::try_from(value).ok()?),
            5 => Self::Access(AccessError::try_from(value).ok()?),
            6 => Self::Initiate(InitiateError::try_from(value).ok()?),
            7 => Self::LoadData(LoadDataError::try_from(value).ok()?),
            8 => Self::DataScope(DataScopeError::try_from(value).ok()?),
            9 => Self::Task(TaskError::try_from(value).ok()?),
            10 => Self::Other(OtherError::try_from(value).ok()?),
            _ => return None,
        })
    }

    fn to_bytes(self) -> (u8, u8) {
        match self {
            Self::ApplicationReference(e) => (0, e as u8),
            Self::HardwareResource(e) => (1, e as u8),
            Self::VdeState(e) => (2, e as u8),
            Self::Service(e) => (3, e as u8),
            Self::Definition(e) => (4, e as u8),
            Self::Access(e) => (5, e as u8),
            Self::Initiate(e) => (6, e as u8),
            Self::LoadData(e) => (7, e as u8),
            Self::DataScope(e) => (8, e as u8),
            Self::Task(e) => (9, e as u8),
            Self::Other(e) => (10, e as u8),
        }
    }
}

/// ConfirmedServiceError APDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmedServiceError {
    pub service: ConfirmedServiceChoice,
    pub error: ServiceErrorValue,
}

impl ConfirmedServiceError {
    pub const TAG: u8 = 14;

    pub fn encode(&self) -> Vec<u8> {
        let (class, value) = self.error.to_bytes();
        alloc::vec![Self::TAG, self.service as u8, class, value]
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, tag) = nom_u8(input)?;
        if tag != Self::TAG {
            return Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag)));
        }
        let (input, service) = nom_u8(input)?;
        let service = ConfirmedServiceChoice::try_from(service)
            .map_err(|_| nom::Err::Error(NomError::new(input, ErrorKind::Tag)))?;
        let (input, class) = nom_u8(input)?;
        let (input, value) = nom_u8(input)?;
        let error = ServiceErrorValue::from_bytes(class, value)
            .ok_or(nom::Err::Error(NomError::new(input, ErrorKind::Tag)))?;
        Ok((input, Self { service, error }))
    }
}

impl fmt::Display for ConfirmedServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConfirmedServiceError({:?}, {:?})", self.service, self.error)
    }
}
