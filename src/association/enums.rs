//! Enumerations specific to the ACSE association APDUs.
//!
//! Reference: DLMS Green Book Ed. 12, Section 11

use alloc::vec::Vec;
use core::fmt;

use derive_try_from_primitive::TryFromPrimitive;

/// Reason for association rejection, acse-service-user choice.
///
/// Reference: Green Book Table 138
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum AcseServiceUserDiagnostics {
    Null = 0,
    NoReasonGiven = 1,
    ApplicationContextNameNotSupported = 2,
    CallingApTitleNotRecognized = 3,
    CallingApInvocationIdentifierNotRecognized = 4,
    CallingAeQualifierNotRecognized = 5,
    CallingAeInvocationIdentifierNotRecognized = 6,
    CalledApTitleNotRecognized = 7,
    CalledApInvocationIdentifierNotRecognized = 8,
    CalledAeQualifierNotRecognized = 9,
    CalledAeInvocationIdentifierNotRecognized = 10,
    AuthenticationMechanismNameNotRecognised = 11,
    AuthenticationMechanismNameRequired = 12,
    AuthenticationFailure = 13,
    AuthenticationRequired = 14,
}

/// The result-source-diagnostic CHOICE of the AARE: either an
/// acse-service-user (tag A1) or an acse-service-provider (tag A2) reason.
/// Provider reasons are rare and kept as their raw byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcseDiagnostics {
    User(AcseServiceUserDiagnostics),
    Provider(u8),
}

impl AcseDiagnostics {
    pub const NULL: Self = Self::User(AcseServiceUserDiagnostics::Null);
}

/// Application context name - identifies the referencing method and whether
/// ciphered APDUs are allowed.
///
/// These are encoded as ASN.1 OBJECT IDENTIFIERs with a fixed DLMS prefix
/// and a final arc of 1-4.
///
/// Reference: Green Book Section 9.3.2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationContextName {
    /// Logical Name referencing without ciphering (arc 1)
    LogicalNameReferencing,
    /// Short Name referencing without ciphering (arc 2)
    ShortNameReferencing,
    /// Logical Name referencing with ciphering (arc 3)
    LogicalNameReferencingWithCiphering,
    /// Short Name referencing with ciphering (arc 4)
    ShortNameReferencingWithCiphering,
}

impl ApplicationContextName {
    /// Picks the LN context matching the protection of the connection. The
    /// engine only ever proposes LN referencing.
    pub const fn logical_name(ciphered: bool) -> Self {
        if ciphered { Self::LogicalNameReferencingWithCiphering } else { Self::LogicalNameReferencing }
    }

    /// The BER-encoded OBJECT IDENTIFIER content for this context.
    pub fn oid_bytes(&self) -> &'static [u8] {
        match self {
            Self::LogicalNameReferencing => &[0x60, 0x85, 0x74, 0x05, 0x08, 0x01, 0x01],
            Self::ShortNameReferencing => &[0x60, 0x85, 0x74, 0x05, 0x08, 0x01, 0x02],
            Self::LogicalNameReferencingWithCiphering => {
                &[0x60, 0x85, 0x74, 0x05, 0x08, 0x01, 0x03]
            }
            Self::ShortNameReferencingWithCiphering => &[0x60, 0x85, 0x74, 0x05, 0x08, 0x01, 0x04],
        }
    }

    /// Parse from OID bytes
    pub fn from_oid_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [0x60, 0x85, 0x74, 0x05, 0x08, 0x01, 0x01] => Some(Self::LogicalNameReferencing),
            [0x60, 0x85, 0x74, 0x05, 0x08, 0x01, 0x02] => Some(Self::ShortNameReferencing),
            [0x60, 0x85, 0x74, 0x05, 0x08, 0x01, 0x03] => {
                Some(Self::LogicalNameReferencingWithCiphering)
            }
            [0x60, 0x85, 0x74, 0x05, 0x08, 0x01, 0x04] => {
                Some(Self::ShortNameReferencingWithCiphering)
            }
            _ => None,
        }
    }

    /// Check if this context uses ciphering
    pub const fn uses_ciphering(&self) -> bool {
        matches!(
            self,
            Self::LogicalNameReferencingWithCiphering | Self::ShortNameReferencingWithCiphering
        )
    }

    /// Check if this context uses logical name referencing
    pub const fn uses_logical_names(&self) -> bool {
        matches!(self, Self::LogicalNameReferencing | Self::LogicalNameReferencingWithCiphering)
    }
}

impl fmt::Display for ApplicationContextName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LogicalNameReferencing => write!(f, "LN"),
            Self::ShortNameReferencing => write!(f, "SN"),
            Self::LogicalNameReferencingWithCiphering => write!(f, "LN-ciphered"),
            Self::ShortNameReferencingWithCiphering => write!(f, "SN-ciphered"),
        }
    }
}

/// The ACSE authentication-value CHOICE: a char-string (LLS password or HLS
/// challenge, tag 0x80) or a bit-string (tag 0x81).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationValue {
    CharString(Vec<u8>),
    BitString(Vec<u8>),
}

impl AuthenticationValue {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::CharString(bytes) | Self::BitString(bytes) => bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_application_context_oids() {
        assert_eq!(
            ApplicationContextName::LogicalNameReferencing.oid_bytes(),
            &[0x60, 0x85, 0x74, 0x05, 0x08, 0x01, 0x01]
        );
        assert_eq!(
            ApplicationContextName::LogicalNameReferencingWithCiphering.oid_bytes(),
            &[0x60, 0x85, 0x74, 0x05, 0x08, 0x01, 0x03]
        );
    }

    #[test]
    fn test_application_context_roundtrip() {
        for context in [
            ApplicationContextName::LogicalNameReferencing,
            ApplicationContextName::ShortNameReferencing,
            ApplicationContextName::LogicalNameReferencingWithCiphering,
            ApplicationContextName::ShortNameReferencingWithCiphering,
        ] {
            assert_eq!(ApplicationContextName::from_oid_bytes(context.oid_bytes()), Some(context));
        }
        assert_eq!(ApplicationContextName::from_oid_bytes(&[0x60, 0x85]), None);
    }

    #[test]
    fn test_uses_ciphering() {
        assert!(!ApplicationContextName::LogicalNameReferencing.uses_ciphering());
        assert!(ApplicationContextName::LogicalNameReferencingWithCiphering.uses_ciphering());
        assert_eq!(
            ApplicationContextName::logical_name(true),
            ApplicationContextName::LogicalNameReferencingWithCiphering
        );
    }

    #[test]
    fn test_diagnostics_from_byte() {
        assert_eq!(
            AcseServiceUserDiagnostics::try_from(13).unwrap(),
            AcseServiceUserDiagnostics::AuthenticationFailure
        );
        assert!(AcseServiceUserDiagnostics::try_from(99).is_err());
    }
}
