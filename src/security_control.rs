use core::fmt;

use nom::{IResult, number::complete::u8};

/// Security-control byte of the Green Book security suite.
///
/// Bits 0-3 carry the suite id, bit 4 authenticated, bit 5 encrypted,
/// bit 6 broadcast key, bit 7 compressed.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SecurityControl {
    security_control: u8,
}

impl fmt::Debug for SecurityControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityControl")
            .field("suite_id", &self.suite_id())
            .field("authentication", &self.authentication())
            .field("encryption", &self.encryption())
            .field("broadcast", &self.broadcast())
            .field("compression", &self.compression())
            .finish()
    }
}

impl SecurityControl {
    #[rustfmt::skip]
    const COMPRESSION_BIT:    u8 = 0b10000000;
    #[rustfmt::skip]
    const BROADCAST_BIT:      u8 = 0b01000000;
    #[rustfmt::skip]
    const ENCRYPTION_BIT:     u8 = 0b00100000;
    #[rustfmt::skip]
    const AUTHENTICATION_BIT: u8 = 0b00010000;

    /// A control byte for the given suite with no protection bits set.
    pub const fn new(suite_id: u8) -> Self {
        Self { security_control: suite_id & 0b00001111 }
    }

    /// The usual client configuration: suite plus authenticated/encrypted
    /// flags, unicast key, no compression.
    pub const fn with_protection(suite_id: u8, authenticated: bool, encrypted: bool) -> Self {
        let mut byte = suite_id & 0b00001111;
        if authenticated {
            byte |= Self::AUTHENTICATION_BIT;
        }
        if encrypted {
            byte |= Self::ENCRYPTION_BIT;
        }
        Self { security_control: byte }
    }

    pub const fn from_byte(security_control: u8) -> Self {
        Self { security_control }
    }

    pub const fn to_byte(self) -> u8 {
        self.security_control
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, security_control) = u8(input)?;
        Ok((input, Self { security_control }))
    }

    pub fn suite_id(&self) -> u8 {
        self.security_control & 0b00001111
    }

    pub fn authentication(&self) -> bool {
        (self.security_control & Self::AUTHENTICATION_BIT) != 0
    }

    pub fn set_authentication(&mut self, authentication: bool) {
        if authentication {
            self.security_control |= Self::AUTHENTICATION_BIT
        } else {
            self.security_control &= !Self::AUTHENTICATION_BIT
        }
    }

    pub fn encryption(&self) -> bool {
        (self.security_control & Self::ENCRYPTION_BIT) != 0
    }

    pub fn set_encryption(&mut self, encryption: bool) {
        if encryption {
            self.security_control |= Self::ENCRYPTION_BIT
        } else {
            self.security_control &= !Self::ENCRYPTION_BIT
        }
    }

    pub fn broadcast(&self) -> bool {
        (self.security_control & Self::BROADCAST_BIT) != 0
    }

    pub fn set_broadcast(&mut self, broadcast: bool) {
        if broadcast {
            self.security_control |= Self::BROADCAST_BIT
        } else {
            self.security_control &= !Self::BROADCAST_BIT
        }
    }

    pub fn compression(&self) -> bool {
        (self.security_control & Self::COMPRESSION_BIT) != 0
    }

    pub fn set_compression(&mut self, compression: bool) {
        if compression {
            self.security_control |= Self::COMPRESSION_BIT
        } else {
            self.security_control &= !Self::COMPRESSION_BIT
        }
    }
}
