//! Service-level enumerations shared across APDUs.
//!
//! Numeric assignments follow the DLMS Blue Book / Green Book tables. All
//! enums convert from their wire byte via `TryFrom`, failing on values the
//! standard does not assign.

use core::fmt;

use derive_try_from_primitive::TryFromPrimitive;

/// Outcome of a GET or SET service, carried in responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
#[rustfmt::skip]
pub enum DataAccessResult {
  Success                 =   0,
  HardwareFault           =   1,
  TemporaryFailure        =   2,
  ReadWriteDenied         =   3,
  ObjectUndefined         =   4,
  ObjectClassInconsistent =   9,
  ObjectUnavailable       =  11,
  TypeUnmatched           =  12,
  ScopeOfAccessViolated   =  13,
  DataBlockUnavailable    =  14,
  LongGetAborted          =  15,
  NoLongGetInProgress     =  16,
  LongSetAborted          =  17,
  NoLongSetInProgress     =  18,
  DataBlockNumberInvalid  =  19,
  OtherReason             = 250,
}

/// Outcome of an ACTION service. Same numeric assignments as
/// [`DataAccessResult`] apart from the long-action entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
#[rustfmt::skip]
pub enum ActionResult {
  Success                 =   0,
  HardwareFault           =   1,
  TemporaryFailure        =   2,
  ReadWriteDenied         =   3,
  ObjectUndefined         =   4,
  ObjectClassInconsistent =   9,
  ObjectUnavailable       =  11,
  TypeUnmatched           =  12,
  ScopeOfAccessViolated   =  13,
  DataBlockUnavailable    =  14,
  LongActionAborted       =  15,
  NoLongActionInProgress  =  16,
  OtherReason             = 250,
}

/// Result of the association negotiation, carried in the AARE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum AssociationResult {
    Accepted = 0,
    RejectedPermanent = 1,
    RejectedTransient = 2,
}

impl AssociationResult {
    pub fn is_accepted(self) -> bool {
        self == Self::Accepted
    }
}

/// Reason carried in a release request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum ReleaseRequestReason {
    Normal = 0,
    Urgent = 1,
    UserDefined = 30,
}

/// Reason carried in a release response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum ReleaseResponseReason {
    Normal = 0,
    NotFinished = 1,
    UserDefined = 30,
}

/// Authentication mechanism negotiated at association. The value doubles as
/// the last arc of the ACSE mechanism-name object identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum AuthenticationMechanism {
    None = 0,
    Lls = 1,
    Hls = 2,
    /// Insecure. Don't use with new meters.
    HlsMd5 = 3,
    /// Insecure. Don't use with new meters.
    HlsSha1 = 4,
    HlsGmac = 5,
    HlsSha256 = 6,
    HlsEcdsa = 7,
}

/// OID prefix shared by all DLMS mechanism names.
pub const MECHANISM_NAME_PREFIX: [u8; 6] = [0x60, 0x85, 0x74, 0x05, 0x08, 0x02];

impl AuthenticationMechanism {
    /// Does this mechanism run the HLS challenge/response procedure after
    /// association?
    pub fn is_hls(self) -> bool {
        !matches!(self, Self::None | Self::Lls)
    }

    /// Full 7-byte mechanism-name object identifier.
    pub fn oid_bytes(self) -> [u8; 7] {
        let mut oid = [0u8; 7];
        oid[..6].copy_from_slice(&MECHANISM_NAME_PREFIX);
        oid[6] = self as u8;
        oid
    }

    /// Parses a mechanism from the 7-byte object identifier.
    pub fn from_oid_bytes(bytes: &[u8]) -> Option<Self> {
        let (prefix, mechanism) = bytes.split_last_chunk::<1>()?;
        if prefix != MECHANISM_NAME_PREFIX {
            return None;
        }
        Self::try_from(mechanism[0]).ok()
    }
}

impl fmt::Display for AuthenticationMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Lls => write!(f, "LLS"),
            Self::Hls => write!(f, "HLS"),
            Self::HlsMd5 => write!(f, "HLS-MD5"),
            Self::HlsSha1 => write!(f, "HLS-SHA1"),
            Self::HlsGmac => write!(f, "HLS-GMAC"),
            Self::HlsSha256 => write!(f, "HLS-SHA256"),
            Self::HlsEcdsa => write!(f, "HLS-ECDSA"),
        }
    }
}

/// State-error of an ExceptionResponse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum StateException {
    ServiceNotAllowed = 1,
    ServiceUnknown = 2,
}

/// Service-error of an ExceptionResponse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum ServiceException {
    OperationNotPossible = 1,
    ServiceNotSupported = 2,
    OtherReason = 3,
    PduTooLong = 4,
    DecipheringError = 5,
    InvocationCounterError = 6,
}

// Error classes carried in a ConfirmedServiceError. Each class byte selects
// one of these enums; the following byte is the value within the class.

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum ApplicationReferenceError {
    Other = 0,
    TimeElapsed = 1,
    ApplicationUnreachable = 2,
    ApplicationReferenceInvalid = 3,
    ApplicationContextUnsupported = 4,
    ProviderCommunicationError = 5,
    DecipheringError = 6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum HardwareResourceError {
    Other = 0,
    MemoryUnavailable = 1,
    ProcessorResourceUnavailable = 2,
    MassStorageUnavailable = 3,
    OtherResourceUnavailable = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum VdeStateError {
    Other = 0,
    NoDlmsContext = 1,
    LoadingDataset = 2,
    StatusNoChange = 3,
    StatusInoperable = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum ServiceProviderError {
    Other = 0,
    /// PDU too long.
    PduSize = 1,
    /// Service unsupported as in conformance block.
    ServiceUnsupported = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum DefinitionError {
    Other = 0,
    ObjectUndefined = 1,
    ObjectClassInconsistent = 2,
    ObjectAttributeInconsistent = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum AccessError {
    Other = 0,
    ScopeOfAccessViolated = 1,
    ObjectAccessViolated = 2,
    HardwareFault = 3,
    ObjectUnavailable = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum InitiateError {
    Other = 0,
    DlmsVersionTooLow = 1,
    IncompatibleConformance = 2,
    PduSizeTooShort = 3,
    RefusedByVdeHandler = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum LoadDataError {
    Other = 0,
    PrimitiveOutOfSequence = 1,
    NotLoadable = 2,
    DatasetSizeTooLarge = 3,
    NotAwaitedSegment = 4,
    InterpretationFailure = 5,
    StorageFailure = 6,
    DatasetNotReady = 7,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum DataScopeError {
    Other = 0,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum TaskError {
    Other = 0,
    NoRemoteControl = 1,
    TiStopped = 2,
    TiRunning = 3,
    TiUnusable = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum OtherError {
    Other = 0,
}

/// Well-known COSEM interface class ids used by the engine itself. The wire
/// carries interface classes as plain `u16`; these constants only name the
/// ones the client needs to know about.
pub mod interface_class {
    pub const DATA: u16 = 1;
    pub const REGISTER: u16 = 3;
    pub const PROFILE_GENERIC: u16 = 7;
    pub const CLOCK: u16 = 8;
    pub const ASSOCIATION_LN: u16 = 15;
    pub const SECURITY_SETUP: u16 = 64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_access_result_from_byte() {
        assert_eq!(DataAccessResult::try_from(0).unwrap(), DataAccessResult::Success);
        assert_eq!(DataAccessResult::try_from(19).unwrap(), DataAccessResult::DataBlockNumberInvalid);
        assert_eq!(DataAccessResult::try_from(250).unwrap(), DataAccessResult::OtherReason);
        // 5-8 are unassigned
        assert!(DataAccessResult::try_from(5).is_err());
    }

    #[test]
    fn test_mechanism_oid_roundtrip() {
        for mechanism in [
            AuthenticationMechanism::None,
            AuthenticationMechanism::Lls,
            AuthenticationMechanism::HlsGmac,
            AuthenticationMechanism::HlsEcdsa,
        ] {
            let oid = mechanism.oid_bytes();
            assert_eq!(AuthenticationMechanism::from_oid_bytes(&oid), Some(mechanism));
        }
    }

    #[test]
    fn test_mechanism_oid_bytes() {
        // Gurux and the Green Book use 60 85 74 05 08 02 [level]
        assert_eq!(
            AuthenticationMechanism::HlsGmac.oid_bytes(),
            [0x60, 0x85, 0x74, 0x05, 0x08, 0x02, 0x05]
        );
    }

    #[test]
    fn test_mechanism_oid_rejects_wrong_prefix() {
        assert_eq!(
            AuthenticationMechanism::from_oid_bytes(&[0x60, 0x85, 0x74, 0x05, 0x08, 0x01, 0x05]),
            None
        );
    }

    #[test]
    fn test_is_hls() {
        assert!(!AuthenticationMechanism::None.is_hls());
        assert!(!AuthenticationMechanism::Lls.is_hls());
        assert!(AuthenticationMechanism::HlsGmac.is_hls());
        assert!(AuthenticationMechanism::Hls.is_hls());
    }
}
