//! A sans-I/O client engine for the DLMS/COSEM application layer.
//!
//! The crate composes and parses the binary APDUs of the DLMS application
//! layer (ACSE association control in BER, xDLMS services in A-XDR),
//! applies the Green Book security suite (AES-GCM with invocation
//! counters, GMAC-based HLS authentication) and drives a metering session
//! through association, data exchange and release. A matching HDLC link
//! layer and the IP wrapper connect the engine to serial or TCP meters.
//!
//! The protocol core never performs I/O: [`DlmsConnection::send`] turns an
//! event into bytes, [`DlmsConnection::receive_data`] plus
//! [`DlmsConnection::next_event`] turn bytes back into events. The `std`
//! feature adds blocking I/O collaborators and a [`client::DlmsClient`]
//! façade; the `tokio` feature adds an async adaptor over the same core.
//!
//! ```no_run
//! # #[cfg(feature = "std")] {
//! use cosem_client::client::DlmsClient;
//! use cosem_client::connection::{ConnectionSettings, DlmsConnection};
//! use cosem_client::io::{TcpIo, WrapperLink};
//! use cosem_client::CosemAttribute;
//!
//! let connection = DlmsConnection::new(ConnectionSettings::default()).unwrap();
//! let link = WrapperLink::new(TcpIo::new("10.0.0.5", 4059), 16, 1);
//! let mut client = DlmsClient::new(connection, link);
//!
//! client.connect().unwrap();
//! client.associate().unwrap();
//! let counter = client.get(CosemAttribute::invocation_counter()).unwrap();
//! client.release().unwrap();
//! # }
//! ```

#![no_std]
#![deny(unsafe_code)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod action;
pub mod apdu;
pub mod association;
pub mod authentication;
pub mod axdr;
pub mod connection;
pub mod cosem;
pub mod confirmed_service_error;
pub mod data;
pub mod data_notification;
pub mod enumerations;
pub mod error;
pub mod exception_response;
pub mod general_ciphering;
pub mod general_glo_ciphering;
pub mod get;
pub mod hdlc;
pub mod invoke_id;
pub mod obis_code;
pub mod security;
pub mod security_control;
pub mod selective_access;
pub mod set;
pub mod state;
pub mod wrapper;

#[cfg(feature = "std")]
pub mod client;
#[cfg(feature = "std")]
pub mod io;

pub use apdu::Apdu;
pub use connection::{ConnectionEvent, ConnectionSettings, DlmsConnection};
pub use cosem::{CosemAttribute, CosemAttributeWithSelection, CosemMethod};
pub use data::{
    BitString, ClockStatus, Data, DataType, Date, DateTime, DeviationConvention, Time,
};
pub use enumerations::{
    ActionResult, AssociationResult, AuthenticationMechanism, DataAccessResult,
};
pub use error::Error;
pub use invoke_id::{InvokeIdAndPriority, LongInvokeIdAndPriority};
pub use obis_code::ObisCode;
pub use security_control::SecurityControl;
pub use state::DlmsState;

#[cfg(test)]
pub(crate) mod test_support;
