//! The HDLC connection state machine.
//!
//! Tracks connection state, turns frames into bytes and bytes back into
//! frames, and keeps the modulo-8 sequence numbers of both stations in
//! step. Like the DLMS layer it is sans-I/O: `send` returns bytes to
//! transmit, `receive_data`/`next_event` consume received bytes.

use alloc::format;
use alloc::vec::Vec;

use log::debug;

use super::address::HdlcAddress;
use super::frames::{Frame, HDLC_FLAG};
use crate::error::Error;

/// Default maximum information field size before segmentation, the value
/// assumed when no HDLC parameters are negotiated.
pub const DEFAULT_MAX_DATA_SIZE: usize = 128;

/// Client-side HDLC connection states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HdlcState {
    /// Session created but SNRM/UA has not run.
    NotConnected,
    /// SNRM sent.
    AwaitingConnection,
    /// Connected, no exchange in flight.
    Idle,
    /// An I-frame or RR is outstanding.
    AwaitingResponse,
    /// DISC sent.
    AwaitingDisconnect,
}

/// What [`HdlcConnection::next_event`] produced.
#[derive(Debug, Clone, PartialEq)]
pub enum HdlcEvent {
    Frame(Frame),
    NeedData,
}

/// An HDLC connection between one client and one server address.
pub struct HdlcConnection {
    client_address: HdlcAddress,
    server_address: HdlcAddress,
    // Sequence numbers, all modulo 8. `our_*` are what we stamp into
    // outgoing I-frames; `peer_*` are what the meter is expected to send.
    our_ssn: u8,
    our_rsn: u8,
    peer_ssn: u8,
    peer_rsn: u8,
    /// Largest information field the peer accepts per frame.
    pub max_data_size: usize,
    state: HdlcState,
    buffer: Vec<u8>,
    buffer_search_position: usize,
}

impl HdlcConnection {
    pub fn new(client_address: HdlcAddress, server_address: HdlcAddress) -> Self {
        Self {
            client_address,
            server_address,
            our_ssn: 0,
            our_rsn: 0,
            peer_ssn: 0,
            peer_rsn: 0,
            max_data_size: DEFAULT_MAX_DATA_SIZE,
            state: HdlcState::NotConnected,
            buffer: Vec::new(),
            buffer_search_position: 1,
        }
    }

    pub fn state(&self) -> HdlcState {
        self.state
    }

    pub fn client_address(&self) -> HdlcAddress {
        self.client_address
    }

    pub fn server_address(&self) -> HdlcAddress {
        self.server_address
    }

    /// Send sequence number for the next outgoing I-frame.
    pub fn send_sequence_number(&self) -> u8 {
        self.our_ssn
    }

    /// Receive sequence number acknowledging what we got so far.
    pub fn receive_sequence_number(&self) -> u8 {
        self.our_rsn
    }

    /// Validates the frame against the connection state and returns the
    /// bytes to transmit.
    pub fn send(&mut self, frame: &Frame) -> Result<Vec<u8>, Error> {
        let new_state = match (self.state, frame) {
            (HdlcState::NotConnected, Frame::Snrm(_)) => HdlcState::AwaitingConnection,
            (HdlcState::Idle, Frame::Information(_)) => HdlcState::AwaitingResponse,
            (HdlcState::Idle, Frame::ReceiveReady(_)) => HdlcState::AwaitingResponse,
            (HdlcState::Idle, Frame::Disconnect(_)) => HdlcState::AwaitingDisconnect,
            (state, frame) => {
                return Err(Error::LocalProtocol(format!(
                    "cannot send {frame:?} in HDLC state {state:?}"
                )));
            }
        };

        if let Frame::Information(information) = frame {
            if information.send_sequence != self.our_ssn
                || information.receive_sequence != self.our_rsn
            {
                return Err(Error::LocalProtocol(format!(
                    "frame sequence numbers are wrong: frame(ssn: {}, rsn: {}) != ours(ssn: {}, \
                     rsn: {})",
                    information.send_sequence,
                    information.receive_sequence,
                    self.our_ssn,
                    self.our_rsn
                )));
            }
            self.our_ssn = (self.our_ssn + 1) % 8;
            self.peer_rsn = (self.peer_rsn + 1) % 8;
        }

        debug!("HDLC state transitioned from {:?} to {new_state:?}", self.state);
        self.state = new_state;
        Ok(frame.encode())
    }

    /// Adds received bytes to the receive buffer.
    pub fn receive_data(&mut self, data: &[u8]) {
        if !data.is_empty() {
            debug!("received {} bytes of HDLC data", data.len());
            self.buffer.extend_from_slice(data);
        }
    }

    /// Tries to cut one frame out of the buffer. An unparsable candidate
    /// usually means a flag byte inside frame data, so the search just
    /// continues; a frame that parses but does not fit the state is a
    /// protocol error.
    pub fn next_event(&mut self) -> Result<HdlcEvent, Error> {
        loop {
            let Some(frame_bytes) = self.find_frame() else {
                return Ok(HdlcEvent::NeedData);
            };

            match Frame::parse(&frame_bytes) {
                Ok(frame) => {
                    self.process_received(&frame)?;
                    self.tidy_buffer();
                    return Ok(HdlcEvent::Frame(frame));
                }
                Err(_) => {
                    debug!("HDLC frame could not be parsed, need more data");
                    continue;
                }
            }
        }
    }

    fn process_received(&mut self, frame: &Frame) -> Result<(), Error> {
        let new_state = match (self.state, frame) {
            (HdlcState::AwaitingConnection, Frame::Ua(_)) => HdlcState::Idle,
            (HdlcState::AwaitingResponse, Frame::Information(_)) => HdlcState::Idle,
            (HdlcState::AwaitingResponse, Frame::ReceiveReady(_)) => HdlcState::Idle,
            // A window of segmented I-frames arrives back to back; the
            // state bounces between the two exchange states.
            (HdlcState::Idle, Frame::Information(_)) => HdlcState::AwaitingResponse,
            (HdlcState::AwaitingDisconnect, Frame::Ua(_)) => HdlcState::NotConnected,
            (state, frame) => {
                return Err(Error::LocalProtocol(format!(
                    "cannot receive {frame:?} in HDLC state {state:?}"
                )));
            }
        };

        if let Frame::Information(information) = frame {
            if information.send_sequence != self.peer_ssn
                || information.receive_sequence != self.peer_rsn
            {
                return Err(Error::LocalProtocol(format!(
                    "frame sequence numbers are wrong: frame(ssn: {}, rsn: {}) != peer(ssn: {}, \
                     rsn: {})",
                    information.send_sequence,
                    information.receive_sequence,
                    self.peer_ssn,
                    self.peer_rsn
                )));
            }
            self.peer_ssn = (self.peer_ssn + 1) % 8;
            self.our_rsn = (self.our_rsn + 1) % 8;
        }

        debug!("HDLC state transitioned from {:?} to {new_state:?}", self.state);
        self.state = new_state;
        Ok(())
    }

    /// Cuts the next candidate frame out of the buffer. During windowed
    /// exchanges adjacent frames may share one flag, so a missing opening
    /// flag is reinserted.
    fn find_frame(&mut self) -> Option<Vec<u8>> {
        let end = self.buffer[self.buffer_search_position.min(self.buffer.len())..]
            .iter()
            .position(|byte| *byte == HDLC_FLAG)?
            + self.buffer_search_position
            + 1;

        let mut frame_bytes = self.buffer[..end].to_vec();
        self.buffer_search_position = end;

        if frame_bytes.first() != Some(&HDLC_FLAG) {
            frame_bytes.insert(0, HDLC_FLAG);
        }
        Some(frame_bytes)
    }

    /// Removes the consumed frame bytes from the buffer.
    fn tidy_buffer(&mut self) {
        self.buffer.drain(..self.buffer_search_position.min(self.buffer.len()));
        self.buffer_search_position = 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hdlc::frames::{
        DisconnectFrame, InformationFrame, ReceiveReadyFrame, SnrmFrame, UaFrame,
    };
    use crate::test_support::hex;

    fn connection() -> HdlcConnection {
        HdlcConnection::new(
            HdlcAddress::client(16).unwrap(),
            HdlcAddress::server(1, Some(17)).unwrap(),
        )
    }

    fn snrm(connection: &HdlcConnection) -> Frame {
        Frame::Snrm(SnrmFrame {
            destination: connection.server_address(),
            source: connection.client_address(),
        })
    }

    fn information(connection: &HdlcConnection, payload: Vec<u8>) -> Frame {
        Frame::Information(InformationFrame {
            destination: connection.server_address(),
            source: connection.client_address(),
            payload,
            send_sequence: connection.send_sequence_number(),
            receive_sequence: connection.receive_sequence_number(),
            segmented: false,
            is_final: true,
        })
    }

    /// A UA frame as the meter would send it, byte-wise.
    fn ua_bytes() -> Vec<u8> {
        Frame::Ua(UaFrame {
            destination: HdlcAddress::client(16).unwrap(),
            source: HdlcAddress::server(1, Some(17)).unwrap(),
            information: Vec::new(),
        })
        .encode()
    }

    fn meter_information_bytes(ssn: u8, rsn: u8, segmented: bool, payload: &[u8]) -> Vec<u8> {
        Frame::Information(InformationFrame {
            destination: HdlcAddress::client(16).unwrap(),
            source: HdlcAddress::server(1, Some(17)).unwrap(),
            payload: payload.to_vec(),
            send_sequence: ssn,
            receive_sequence: rsn,
            segmented,
            is_final: true,
        })
        .encode()
    }

    fn connect(connection: &mut HdlcConnection) {
        let frame = snrm(connection);
        connection.send(&frame).unwrap();
        connection.receive_data(&ua_bytes());
        let HdlcEvent::Frame(Frame::Ua(_)) = connection.next_event().unwrap() else {
            panic!("expected UA");
        };
        assert_eq!(connection.state(), HdlcState::Idle);
    }

    #[test]
    fn test_snrm_bytes() {
        let mut connection = connection();
        let bytes = connection.send(&snrm(&connection)).unwrap();
        assert_eq!(bytes, hex("7EA00802232193BD647E"));
        assert_eq!(connection.state(), HdlcState::AwaitingConnection);
    }

    #[test]
    fn test_connect_disconnect_cycle() {
        let mut connection = connection();
        connect(&mut connection);

        let disc = Frame::Disconnect(DisconnectFrame {
            destination: connection.server_address(),
            source: connection.client_address(),
        });
        connection.send(&disc).unwrap();
        assert_eq!(connection.state(), HdlcState::AwaitingDisconnect);

        connection.receive_data(&ua_bytes());
        let HdlcEvent::Frame(Frame::Ua(_)) = connection.next_event().unwrap() else {
            panic!("expected UA");
        };
        assert_eq!(connection.state(), HdlcState::NotConnected);
    }

    #[test]
    fn test_cannot_send_information_before_connect() {
        let mut connection = connection();
        let frame = information(&connection, alloc::vec![0x01]);
        assert!(matches!(connection.send(&frame), Err(Error::LocalProtocol(_))));
        assert_eq!(connection.state(), HdlcState::NotConnected);
    }

    #[test]
    fn test_sequence_numbers_advance_on_exchange() {
        let mut connection = connection();
        connect(&mut connection);

        let frame = information(&connection, alloc::vec![0x01, 0x02]);
        connection.send(&frame).unwrap();
        assert_eq!(connection.send_sequence_number(), 1);
        assert_eq!(connection.state(), HdlcState::AwaitingResponse);

        connection.receive_data(&meter_information_bytes(0, 1, false, &[0x03]));
        let HdlcEvent::Frame(Frame::Information(response)) = connection.next_event().unwrap()
        else {
            panic!("expected I-frame");
        };
        assert_eq!(response.payload, alloc::vec![0x03]);
        assert_eq!(connection.receive_sequence_number(), 1);
        assert_eq!(connection.state(), HdlcState::Idle);
    }

    #[test]
    fn test_wrong_sequence_number_is_rejected() {
        let mut connection = connection();
        connect(&mut connection);
        let frame = information(&connection, alloc::vec![0x01]);
        connection.send(&frame).unwrap();

        // The meter should send ssn 0; 5 is a protocol error.
        connection.receive_data(&meter_information_bytes(5, 1, false, &[0x03]));
        assert!(matches!(connection.next_event(), Err(Error::LocalProtocol(_))));
    }

    #[test]
    fn test_outgoing_sequence_numbers_are_validated() {
        let mut connection = connection();
        connect(&mut connection);
        let frame = Frame::Information(InformationFrame {
            destination: connection.server_address(),
            source: connection.client_address(),
            payload: alloc::vec![0x01],
            send_sequence: 7,
            receive_sequence: 0,
            segmented: false,
            is_final: true,
        });
        assert!(matches!(connection.send(&frame), Err(Error::LocalProtocol(_))));
    }

    #[test]
    fn test_sequence_numbers_wrap_modulo_8() {
        let mut connection = connection();
        connect(&mut connection);

        for round in 0..9u32 {
            let frame = information(&connection, alloc::vec![round as u8]);
            connection.send(&frame).unwrap();
            let meter_frame = meter_information_bytes(
                (round % 8) as u8,
                ((round + 1) % 8) as u8,
                false,
                &[0xAA],
            );
            connection.receive_data(&meter_frame);
            connection.next_event().unwrap();
        }
        assert_eq!(connection.send_sequence_number(), 1);
        assert_eq!(connection.receive_sequence_number(), 1);
    }

    #[test]
    fn test_segmented_receive_alternates_states() {
        let mut connection = connection();
        connect(&mut connection);
        let frame = information(&connection, alloc::vec![0x01]);
        connection.send(&frame).unwrap();

        // Two segmented frames then the final one, no RR in between
        // (window size above one).
        connection.receive_data(&meter_information_bytes(0, 1, true, &[0x01]));
        let HdlcEvent::Frame(Frame::Information(first)) = connection.next_event().unwrap() else {
            panic!("expected I-frame");
        };
        assert!(first.segmented);
        assert_eq!(connection.state(), HdlcState::Idle);

        connection.receive_data(&meter_information_bytes(1, 1, true, &[0x02]));
        connection.next_event().unwrap();
        assert_eq!(connection.state(), HdlcState::AwaitingResponse);

        connection.receive_data(&meter_information_bytes(2, 1, false, &[0x03]));
        connection.next_event().unwrap();
        assert_eq!(connection.state(), HdlcState::Idle);
        assert_eq!(connection.receive_sequence_number(), 3);
    }

    #[test]
    fn test_rr_acknowledges_outbound_segment() {
        let mut connection = connection();
        connect(&mut connection);
        let frame = information(&connection, alloc::vec![0x01]);
        connection.send(&frame).unwrap();

        let rr = Frame::ReceiveReady(ReceiveReadyFrame {
            destination: HdlcAddress::client(16).unwrap(),
            source: HdlcAddress::server(1, Some(17)).unwrap(),
            receive_sequence: 1,
        })
        .encode();
        connection.receive_data(&rr);
        let HdlcEvent::Frame(Frame::ReceiveReady(_)) = connection.next_event().unwrap() else {
            panic!("expected RR");
        };
        assert_eq!(connection.state(), HdlcState::Idle);
    }

    #[test]
    fn test_need_data_on_partial_frame() {
        let mut connection = connection();
        connection.send(&snrm(&connection)).unwrap();

        let ua = ua_bytes();
        connection.receive_data(&ua[..5]);
        assert_eq!(connection.next_event().unwrap(), HdlcEvent::NeedData);

        connection.receive_data(&ua[5..]);
        assert!(matches!(connection.next_event().unwrap(), HdlcEvent::Frame(Frame::Ua(_))));
    }

    #[test]
    fn test_shared_flag_between_frames() {
        let mut connection = connection();
        connect(&mut connection);
        let frame = information(&connection, alloc::vec![0x01]);
        connection.send(&frame).unwrap();

        // Two frames sharing the middle flag: the second loses its opening
        // flag on the wire.
        let first = meter_information_bytes(0, 1, true, &[0x01]);
        let second = meter_information_bytes(1, 1, false, &[0x02]);
        let mut stream = first.clone();
        stream.extend_from_slice(&second[1..]);

        connection.receive_data(&stream);
        let HdlcEvent::Frame(Frame::Information(one)) = connection.next_event().unwrap() else {
            panic!("expected first I-frame");
        };
        assert_eq!(one.payload, alloc::vec![0x01]);
        let HdlcEvent::Frame(Frame::Information(two)) = connection.next_event().unwrap() else {
            panic!("expected second I-frame");
        };
        assert_eq!(two.payload, alloc::vec![0x02]);
    }

    #[test]
    fn test_flag_byte_inside_payload() {
        let mut connection = connection();
        connect(&mut connection);
        let frame = information(&connection, alloc::vec![0x01]);
        connection.send(&frame).unwrap();

        // Payload contains 0x7E, so the first candidate cut is too short
        // and only parses once the real closing flag arrives.
        let meter_frame = meter_information_bytes(0, 1, false, &[0x11, HDLC_FLAG, 0x22]);
        connection.receive_data(&meter_frame);
        let HdlcEvent::Frame(Frame::Information(information)) = connection.next_event().unwrap()
        else {
            panic!("expected an I-frame");
        };
        assert_eq!(information.payload, alloc::vec![0x11, HDLC_FLAG, 0x22]);
    }
}
