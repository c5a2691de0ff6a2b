//! Conformance bitflags for DLMS/COSEM
//!
//! The conformance block is a 24-bit field naming the services available in
//! an association. The client proposes its conformance in the AARQ; the
//! meter replies with the negotiated conformance in the AARE and every
//! subsequent request is validated against it.
//!
//! The standard numbers the bits from the left, so "bit 0" of the tables is
//! the MSB of the 24-bit field. The constants below use plain LSB-0 values
//! that already account for that.
//!
//! Reference: DLMS Green Book Ed. 12, Table 133

use core::fmt;

/// Conformance bits indicating supported DLMS services
///
/// # Examples
///
/// ```
/// use cosem_client::association::Conformance;
///
/// let client = Conformance::GET | Conformance::SET | Conformance::SELECTIVE_ACCESS;
///
/// assert!(client.contains(Conformance::GET));
/// assert!(!client.contains(Conformance::ACTION));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Conformance {
    bits: u32,
}

impl Conformance {
    /// General protection (standard bit 1)
    pub const GENERAL_PROTECTION: Self = Self { bits: 1 << 22 };

    /// General block transfer (standard bit 2)
    pub const GENERAL_BLOCK_TRANSFER: Self = Self { bits: 1 << 21 };

    /// Delta value encoding (standard bit 6)
    pub const DELTA_VALUE_ENCODING: Self = Self { bits: 1 << 17 };

    /// Attribute 0 supported with SET (standard bit 8)
    pub const ATTRIBUTE_0_WITH_SET: Self = Self { bits: 1 << 15 };

    /// Priority management supported (standard bit 9)
    pub const PRIORITY_MANAGEMENT: Self = Self { bits: 1 << 14 };

    /// Attribute 0 supported with GET (standard bit 10)
    pub const ATTRIBUTE_0_WITH_GET: Self = Self { bits: 1 << 13 };

    /// Block transfer with GET or READ (standard bit 11)
    pub const BLOCK_TRANSFER_WITH_GET: Self = Self { bits: 1 << 12 };

    /// Block transfer with SET or WRITE (standard bit 12)
    pub const BLOCK_TRANSFER_WITH_SET: Self = Self { bits: 1 << 11 };

    /// Block transfer with ACTION (standard bit 13)
    pub const BLOCK_TRANSFER_WITH_ACTION: Self = Self { bits: 1 << 10 };

    /// Multiple references (standard bit 14)
    pub const MULTIPLE_REFERENCES: Self = Self { bits: 1 << 9 };

    /// Data notification (standard bit 16)
    pub const DATA_NOTIFICATION: Self = Self { bits: 1 << 7 };

    /// Access service (standard bit 17)
    pub const ACCESS: Self = Self { bits: 1 << 6 };

    /// GET service (standard bit 19)
    pub const GET: Self = Self { bits: 1 << 4 };

    /// SET service (standard bit 20)
    pub const SET: Self = Self { bits: 1 << 3 };

    /// Selective access (standard bit 21)
    pub const SELECTIVE_ACCESS: Self = Self { bits: 1 << 2 };

    /// Event notification (standard bit 22)
    pub const EVENT_NOTIFICATION: Self = Self { bits: 1 << 1 };

    /// ACTION service (standard bit 23)
    pub const ACTION: Self = Self { bits: 1 << 0 };

    /// Empty conformance (no services)
    pub const EMPTY: Self = Self { bits: 0 };

    /// All 24 conformance bits set
    pub const ALL: Self = Self { bits: 0x00FF_FFFF };

    /// The default proposed conformance of a client using LN referencing:
    /// GET/SET/ACTION with selective access, block transfer for all three
    /// and multiple references.
    pub const DEFAULT_CLIENT: Self = Self {
        bits: Self::GET.bits
            | Self::SET.bits
            | Self::ACTION.bits
            | Self::SELECTIVE_ACCESS.bits
            | Self::MULTIPLE_REFERENCES.bits
            | Self::BLOCK_TRANSFER_WITH_GET.bits
            | Self::BLOCK_TRANSFER_WITH_SET.bits
            | Self::BLOCK_TRANSFER_WITH_ACTION.bits,
    };

    /// Create conformance from raw bits, masked to 24 bits
    pub const fn from_bits(bits: u32) -> Self {
        Self { bits: bits & 0x00FF_FFFF }
    }

    /// Get raw bits value
    pub const fn bits(&self) -> u32 {
        self.bits
    }

    /// Create conformance from the 3 data bytes of the bit string
    /// (big-endian, standard bit 0 first)
    pub const fn from_bytes(bytes: [u8; 3]) -> Self {
        let bits = ((bytes[0] as u32) << 16) | ((bytes[1] as u32) << 8) | (bytes[2] as u32);
        Self::from_bits(bits)
    }

    /// Convert to the 3 data bytes of the bit string
    pub const fn to_bytes(self) -> [u8; 3] {
        [
            ((self.bits >> 16) & 0xFF) as u8,
            ((self.bits >> 8) & 0xFF) as u8,
            (self.bits & 0xFF) as u8,
        ]
    }

    /// Check if this conformance contains all flags of `other`
    pub const fn contains(self, other: Self) -> bool {
        (self.bits & other.bits) == other.bits
    }

    /// Check if this conformance is empty
    pub const fn is_empty(self) -> bool {
        self.bits == 0
    }

    /// Bitwise OR of two conformance values
    pub const fn union(self, other: Self) -> Self {
        Self { bits: self.bits | other.bits }
    }

    /// Bitwise AND of two conformance values. This is what the meter does
    /// during negotiation to find the common services.
    pub const fn intersection(self, other: Self) -> Self {
        Self { bits: self.bits & other.bits }
    }

    /// Remove flags from conformance
    pub const fn difference(self, other: Self) -> Self {
        Self { bits: self.bits & !other.bits }
    }
}

impl core::ops::BitOr for Conformance {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl core::ops::BitOrAssign for Conformance {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

impl core::ops::BitAnd for Conformance {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        self.intersection(rhs)
    }
}

impl core::ops::BitAndAssign for Conformance {
    fn bitand_assign(&mut self, rhs: Self) {
        *self = self.intersection(rhs);
    }
}

impl core::ops::Not for Conformance {
    type Output = Self;

    fn not(self) -> Self {
        Self::from_bits(!self.bits)
    }
}

impl fmt::Debug for Conformance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conformance").field("bits", &format_args!("0x{:06X}", self.bits)).finish()
    }
}

impl fmt::Display for Conformance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Conformance(0x{:06X})", self.bits)
    }
}
