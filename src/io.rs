//! Blocking I/O collaborators and link drivers.
//!
//! The protocol core never blocks; these adaptors do. An [`Io`] moves raw
//! bytes over a medium. A [`Transport`] runs a complete request/response
//! round trip by driving a link-layer state machine over an [`Io`]:
//! [`HdlcLink`] frames payloads in HDLC with LLC headers and segmentation,
//! [`WrapperLink`] uses the 8-byte IP wrapper.

use alloc::format;
use alloc::vec::Vec;

use log::debug;

use crate::error::Error;
use crate::hdlc::{
    DisconnectFrame, Frame, HDLC_FLAG, HdlcAddress, HdlcConnection, HdlcEvent, HdlcState,
    InformationFrame, LLC_COMMAND_HEADER, LLC_RESPONSE_HEADER, ReceiveReadyFrame, SnrmFrame,
};
use crate::wrapper::WrapperHeader;

#[cfg(feature = "tokio")]
pub mod async_io;

/// The byte-moving collaborator the link drivers consume.
///
/// `recv` returns exactly `amount` bytes, blocking until satisfied;
/// `recv_until` returns bytes up to and including `marker`.
pub trait Io {
    fn connect(&mut self) -> Result<(), Error>;
    fn disconnect(&mut self) -> Result<(), Error>;
    fn send(&mut self, data: &[u8]) -> Result<(), Error>;
    fn recv(&mut self, amount: usize) -> Result<Vec<u8>, Error>;
    fn recv_until(&mut self, marker: u8) -> Result<Vec<u8>, Error>;
}

/// A complete request/response round trip over some link layer.
pub trait Transport {
    fn connect(&mut self) -> Result<(), Error>;
    fn disconnect(&mut self) -> Result<(), Error>;
    /// Transmits one application payload and returns the complete response
    /// payload.
    fn request(&mut self, pdu: &[u8]) -> Result<Vec<u8>, Error>;
}

/// Blocking TCP I/O.
pub struct TcpIo {
    host: std::string::String,
    port: u16,
    timeout: core::time::Duration,
    stream: Option<std::net::TcpStream>,
}

impl TcpIo {
    pub fn new(host: impl Into<std::string::String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: core::time::Duration::from_secs(10),
            stream: None,
        }
    }

    pub fn with_timeout(mut self, timeout: core::time::Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn stream(&mut self) -> Result<&mut std::net::TcpStream, Error> {
        self.stream
            .as_mut()
            .ok_or_else(|| Error::LocalProtocol(format!("TCP transport not connected")))
    }
}

impl Io for TcpIo {
    fn connect(&mut self) -> Result<(), Error> {
        if self.stream.is_some() {
            return Err(Error::LocalProtocol(format!(
                "there is already an active socket to {}:{}",
                self.host, self.port
            )));
        }
        let stream = std::net::TcpStream::connect((self.host.as_str(), self.port))?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        debug!("connected to {}:{}", self.host, self.port);
        self.stream = Some(stream);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), Error> {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
            debug!("connection to {}:{} is closed", self.host, self.port);
        }
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> Result<(), Error> {
        use std::io::Write;
        self.stream()?.write_all(data)?;
        Ok(())
    }

    fn recv(&mut self, amount: usize) -> Result<Vec<u8>, Error> {
        use std::io::Read;
        let mut data = alloc::vec![0u8; amount];
        self.stream()?.read_exact(&mut data)?;
        Ok(data)
    }

    fn recv_until(&mut self, marker: u8) -> Result<Vec<u8>, Error> {
        use std::io::Read;
        let mut data = Vec::new();
        let stream = self.stream()?;
        let mut byte = [0u8; 1];
        loop {
            stream.read_exact(&mut byte)?;
            data.push(byte[0]);
            if byte[0] == marker {
                return Ok(data);
            }
        }
    }
}

/// Drives an [`HdlcConnection`] over an [`Io`]: SNRM/UA setup, LLC
/// prefixes, outbound segmentation and RR-driven inbound reassembly.
pub struct HdlcLink<I: Io> {
    io: I,
    connection: HdlcConnection,
    negotiation: Option<Vec<u8>>,
}

impl<I: Io> HdlcLink<I> {
    pub fn new(
        io: I,
        client_logical: u16,
        server_logical: u16,
        server_physical: Option<u16>,
    ) -> Result<Self, Error> {
        let client_address = HdlcAddress::client(client_logical)?;
        let server_address = HdlcAddress::server(server_logical, server_physical)?;
        Ok(Self { io, connection: HdlcConnection::new(client_address, server_address), negotiation: None })
    }

    /// The raw parameter-negotiation block of the UA response, if the meter
    /// sent one.
    pub fn negotiation(&self) -> Option<&[u8]> {
        self.negotiation.as_deref()
    }

    /// Largest information field per frame; lower it for meters that
    /// negotiate a smaller window.
    pub fn set_max_data_size(&mut self, max_data_size: usize) {
        self.connection.max_data_size = max_data_size;
    }

    fn information_frame(&self, payload: Vec<u8>, segmented: bool) -> Frame {
        Frame::Information(InformationFrame {
            destination: self.connection.server_address(),
            source: self.connection.client_address(),
            payload,
            send_sequence: self.connection.send_sequence_number(),
            receive_sequence: self.connection.receive_sequence_number(),
            segmented,
            is_final: true,
        })
    }

    /// Reads frames off the wire until the connection yields an event.
    fn next_frame(&mut self) -> Result<Frame, Error> {
        loop {
            match self.connection.next_event()? {
                HdlcEvent::Frame(frame) => return Ok(frame),
                HdlcEvent::NeedData => {
                    let bytes = self.recv_frame()?;
                    self.connection.receive_data(&bytes);
                }
            }
        }
    }

    /// Reads up to the closing flag. When only a bare flag came in it was
    /// the shared boundary of the previous frame, so read on to the next.
    fn recv_frame(&mut self) -> Result<Vec<u8>, Error> {
        let mut data = self.io.recv_until(HDLC_FLAG)?;
        if data == [HDLC_FLAG] {
            data.extend_from_slice(&self.io.recv_until(HDLC_FLAG)?);
        }
        Ok(data)
    }
}

impl<I: Io> Transport for HdlcLink<I> {
    fn connect(&mut self) -> Result<(), Error> {
        self.io.connect()?;
        if self.connection.state() != HdlcState::NotConnected {
            return Err(Error::LocalProtocol(format!(
                "tried to initiate an HDLC connection in state {:?}",
                self.connection.state()
            )));
        }
        let snrm = Frame::Snrm(SnrmFrame {
            destination: self.connection.server_address(),
            source: self.connection.client_address(),
        });
        let bytes = self.connection.send(&snrm)?;
        self.io.send(&bytes)?;
        match self.next_frame()? {
            Frame::Ua(ua) => {
                debug!("HDLC connection is up");
                self.negotiation = (!ua.information.is_empty()).then_some(ua.information);
                Ok(())
            }
            frame => Err(Error::LocalProtocol(format!(
                "expected a UA to complete the connection, got {frame:?}"
            ))),
        }
    }

    fn disconnect(&mut self) -> Result<(), Error> {
        if self.connection.state() == HdlcState::Idle {
            let disc = Frame::Disconnect(DisconnectFrame {
                destination: self.connection.server_address(),
                source: self.connection.client_address(),
            });
            let bytes = self.connection.send(&disc)?;
            self.io.send(&bytes)?;
            let _ = self.next_frame()?;
        }
        self.io.disconnect()
    }

    fn request(&mut self, pdu: &[u8]) -> Result<Vec<u8>, Error> {
        // The LLC header goes in front of the payload once; it is not
        // repeated in later segments.
        let mut out = Vec::with_capacity(LLC_COMMAND_HEADER.len() + pdu.len());
        out.extend_from_slice(&LLC_COMMAND_HEADER);
        out.extend_from_slice(pdu);

        let chunk_count = out.chunks(self.connection.max_data_size).count();
        for (index, chunk) in out.chunks(self.connection.max_data_size).enumerate() {
            let segmented = index + 1 < chunk_count;
            let frame = self.information_frame(chunk.to_vec(), segmented);
            let bytes = self.connection.send(&frame)?;
            self.io.send(&bytes)?;

            if segmented {
                // The peer acknowledges each non-terminal block with RR.
                match self.next_frame()? {
                    Frame::ReceiveReady(_) => continue,
                    frame => {
                        return Err(Error::LocalProtocol(format!(
                            "expected an RR to acknowledge a segment, got {frame:?}"
                        )));
                    }
                }
            }
        }

        let mut in_buffer = Vec::new();
        loop {
            let information = match self.next_frame()? {
                Frame::Information(information) => information,
                frame => {
                    return Err(Error::LocalProtocol(format!(
                        "expected an information frame, got {frame:?}"
                    )));
                }
            };
            in_buffer.extend_from_slice(&information.payload);

            if information.segmented && information.is_final {
                // The peer exhausted its window; ask for the rest.
                let rr = Frame::ReceiveReady(ReceiveReadyFrame {
                    destination: self.connection.server_address(),
                    source: self.connection.client_address(),
                    receive_sequence: self.connection.receive_sequence_number(),
                });
                let bytes = self.connection.send(&rr)?;
                self.io.send(&bytes)?;
            }
            if !information.segmented && information.is_final {
                break;
            }
        }

        let payload = in_buffer
            .strip_prefix(&LLC_RESPONSE_HEADER[..])
            .ok_or_else(|| {
                Error::Malformed(format!("response data is not prefixed by the LLC header"))
            })?;
        Ok(payload.to_vec())
    }
}

/// Drives the IP wrapper over an [`Io`]. The wrapper ports mirror the
/// client and server addresses.
pub struct WrapperLink<I: Io> {
    io: I,
    source_wport: u16,
    destination_wport: u16,
}

impl<I: Io> WrapperLink<I> {
    pub fn new(io: I, source_wport: u16, destination_wport: u16) -> Self {
        Self { io, source_wport, destination_wport }
    }
}

impl<I: Io> Transport for WrapperLink<I> {
    fn connect(&mut self) -> Result<(), Error> {
        self.io.connect()
    }

    fn disconnect(&mut self) -> Result<(), Error> {
        self.io.disconnect()
    }

    fn request(&mut self, pdu: &[u8]) -> Result<Vec<u8>, Error> {
        self.io.send(&WrapperHeader::wrap(self.source_wport, self.destination_wport, pdu))?;

        let header_bytes = self.io.recv(WrapperHeader::LENGTH)?;
        let (_, header) = WrapperHeader::parse(&header_bytes)
            .map_err(crate::error::map_nom("wrapper header"))?;
        self.io.recv(header.length as usize)
    }
}
