//! HDLC link layer.
//!
//! DLMS uses HDLC to move APDUs over serial lines (and over TCP against
//! meters without the IP wrapper transport). This module implements the
//! frame formats, address encoding, check sequences and the client-side
//! connection state machine; actual I/O stays with the caller.

pub use self::{
    address::{AddressKind, HdlcAddress, ParsedAddress},
    connection::{DEFAULT_MAX_DATA_SIZE, HdlcConnection, HdlcEvent, HdlcState},
    fields::{Control, FrameFormat},
    frames::{
        DisconnectFrame, Frame, HDLC_FLAG, InformationFrame, LLC_COMMAND_HEADER,
        LLC_RESPONSE_HEADER, ReceiveReadyFrame, SnrmFrame, UaFrame, UnnumberedInformationFrame,
    },
};

pub(crate) mod address;
pub(crate) mod connection;
pub(crate) mod crc;
pub(crate) mod fields;
pub(crate) mod frames;
