//! Crate-wide error type.
//!
//! The variants follow the failure categories of the protocol engine:
//! structural decode failures, state-machine violations, conformance
//! violations, cryptographic failures and meter-side service results.

use alloc::format;
use alloc::string::String;

use thiserror::Error;

use crate::enumerations::{ActionResult, DataAccessResult, ServiceException, StateException};

#[derive(Debug, Error)]
pub enum Error {
    /// A BER, A-XDR or HDLC structure could not be decoded.
    #[error("malformed input: {0}")]
    Malformed(String),

    /// More data is required before the structure can be decoded.
    #[error("need more data")]
    Incomplete,

    /// An event cannot be sent or received in the current protocol state.
    /// The connection should be discarded.
    #[error("local protocol error: {0}")]
    LocalProtocol(String),

    /// The requested service is not part of the negotiated conformance.
    #[error("conformance error: {0}")]
    Conformance(String),

    /// GCM tag verification failed. The ciphered text may have been tampered
    /// with, or key, auth key, security control or invocation counter is
    /// wrong. Fatal for the association.
    #[error("unable to decrypt ciphered text, authentication tag is not valid")]
    Decryption,

    /// A cryptographic operation was requested without the required key
    /// material or system title.
    #[error("protection error: {0}")]
    Protection(String),

    /// ACSE APDUs are not allowed on a pre-established association.
    #[error("pre-established association: {0}")]
    PreEstablishedAssociation(String),

    /// The meter answered a GET or SET with a service error.
    #[error("data access result: {0:?}")]
    DataAccess(DataAccessResult),

    /// The meter answered an ACTION with a service error.
    #[error("action result: {0:?}")]
    Action(ActionResult),

    /// The meter signalled a service exception.
    #[error("exception response: state={state_error:?}, service={service_error:?}")]
    Exception {
        state_error: StateException,
        service_error: ServiceException,
        /// Carried when the service error is an invocation counter error and
        /// holds the meter's current invocation counter.
        invocation_counter: Option<u32>,
    },

    /// The first byte of an APDU is not a tag known to the factory.
    #[error("tag {0} is not a known APDU tag")]
    UnknownApdu(u8),

    #[cfg(feature = "std")]
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Maps a nom failure into [`Error`], preserving the incomplete/malformed
/// distinction so callers can ask for more data at the link layer.
pub(crate) fn map_nom<E: core::fmt::Debug>(
    context: &'static str,
) -> impl FnOnce(nom::Err<E>) -> Error {
    move |err| match err {
        nom::Err::Incomplete(_) => Error::Incomplete,
        err => Error::Malformed(format!("{context}: {err:?}")),
    }
}
