//! HDLC frame formats.
//!
//! Frames start and end with the 0x7E flag (which adjacent frames may
//! share): flag, format (2), destination address (1-4), source address
//! (1-4), control (1), HCS (2, only when an information field follows),
//! information, FCS (2), flag. The HCS covers the header from the format
//! field through the control byte; the FCS covers everything between the
//! flags.

use alloc::vec::Vec;

use super::address::{AddressKind, HdlcAddress, ParsedAddress, find_addresses};
use super::crc;
use super::fields::{Control, FrameFormat};
use crate::error::Error;

/// HDLC frame boundary flag.
pub const HDLC_FLAG: u8 = 0x7E;

/// LLC header prepended to outbound xDLMS payloads (client to server).
pub const LLC_COMMAND_HEADER: [u8; 3] = [0xE6, 0xE6, 0x00];

/// LLC header expected on inbound xDLMS payloads (server to client).
pub const LLC_RESPONSE_HEADER: [u8; 3] = [0xE6, 0xE7, 0x00];

/// SNRM frame, opens the HDLC connection.
#[derive(Debug, Clone, PartialEq)]
pub struct SnrmFrame {
    pub destination: HdlcAddress,
    pub source: HdlcAddress,
}

/// Unnumbered acknowledgement; answers SNRM and DISC. The information
/// field, when present, carries the HDLC parameter negotiation block and
/// is surfaced raw.
#[derive(Debug, Clone, PartialEq)]
pub struct UaFrame {
    pub destination: HdlcAddress,
    pub source: HdlcAddress,
    pub information: Vec<u8>,
}

/// DISC frame, closes the HDLC connection.
#[derive(Debug, Clone, PartialEq)]
pub struct DisconnectFrame {
    pub destination: HdlcAddress,
    pub source: HdlcAddress,
}

/// Receive-ready frame acknowledging received I-frames and asking for the
/// next one during segmentation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiveReadyFrame {
    pub destination: HdlcAddress,
    pub source: HdlcAddress,
    pub receive_sequence: u8,
}

/// Numbered information frame carrying (a segment of) an application
/// payload.
#[derive(Debug, Clone, PartialEq)]
pub struct InformationFrame {
    pub destination: HdlcAddress,
    pub source: HdlcAddress,
    pub payload: Vec<u8>,
    pub send_sequence: u8,
    pub receive_sequence: u8,
    pub segmented: bool,
    pub is_final: bool,
}

/// Unnumbered information frame.
#[derive(Debug, Clone, PartialEq)]
pub struct UnnumberedInformationFrame {
    pub destination: HdlcAddress,
    pub source: HdlcAddress,
    pub payload: Vec<u8>,
    pub segmented: bool,
    pub is_final: bool,
}

/// Any frame the client sends or receives.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Snrm(SnrmFrame),
    Ua(UaFrame),
    Disconnect(DisconnectFrame),
    ReceiveReady(ReceiveReadyFrame),
    Information(InformationFrame),
    UnnumberedInformation(UnnumberedInformationFrame),
}

/// Builds a complete frame: format, addresses, control, optional HCS and
/// information field, FCS, all between flags.
fn assemble(
    destination: &HdlcAddress,
    source: &HdlcAddress,
    control: Control,
    segmented: bool,
    information: Option<&[u8]>,
) -> Vec<u8> {
    let destination_bytes = destination.encode();
    let source_bytes = source.encode();

    let mut length = 2 + destination_bytes.len() + source_bytes.len() + 1 + 2;
    if let Some(information) = information {
        length += 2 + information.len();
    }
    // Lengths are bounded by the format field; the connection splits
    // payloads well below the 11-bit limit.
    let format = FrameFormat::new(length as u16, segmented).expect("frame length exceeds format");

    let mut content = Vec::with_capacity(length);
    content.extend_from_slice(&format.to_bytes());
    content.extend_from_slice(&destination_bytes);
    content.extend_from_slice(&source_bytes);
    content.push(control.to_byte());

    if let Some(information) = information {
        let hcs = crc::checksum(&content);
        content.extend_from_slice(&hcs);
        content.extend_from_slice(information);
    }

    let fcs = crc::checksum(&content);
    content.extend_from_slice(&fcs);

    let mut out = Vec::with_capacity(length + 2);
    out.push(HDLC_FLAG);
    out.extend_from_slice(&content);
    out.push(HDLC_FLAG);
    out
}

fn received_client_address(parsed: ParsedAddress) -> HdlcAddress {
    HdlcAddress { logical: parsed.logical, physical: parsed.physical, kind: AddressKind::Client }
}

fn received_server_address(parsed: ParsedAddress) -> HdlcAddress {
    HdlcAddress { logical: parsed.logical, physical: parsed.physical, kind: AddressKind::Server }
}

impl Frame {
    pub fn destination(&self) -> &HdlcAddress {
        match self {
            Self::Snrm(frame) => &frame.destination,
            Self::Ua(frame) => &frame.destination,
            Self::Disconnect(frame) => &frame.destination,
            Self::ReceiveReady(frame) => &frame.destination,
            Self::Information(frame) => &frame.destination,
            Self::UnnumberedInformation(frame) => &frame.destination,
        }
    }

    pub fn source(&self) -> &HdlcAddress {
        match self {
            Self::Snrm(frame) => &frame.source,
            Self::Ua(frame) => &frame.source,
            Self::Disconnect(frame) => &frame.source,
            Self::ReceiveReady(frame) => &frame.source,
            Self::Information(frame) => &frame.source,
            Self::UnnumberedInformation(frame) => &frame.source,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Snrm(frame) => assemble(
                &frame.destination,
                &frame.source,
                Control::Snrm { is_final: true },
                false,
                None,
            ),
            Self::Ua(frame) => assemble(
                &frame.destination,
                &frame.source,
                Control::Ua { is_final: true },
                false,
                Some(&frame.information),
            ),
            Self::Disconnect(frame) => assemble(
                &frame.destination,
                &frame.source,
                Control::Disconnect { is_final: true },
                false,
                None,
            ),
            Self::ReceiveReady(frame) => assemble(
                &frame.destination,
                &frame.source,
                Control::ReceiveReady {
                    receive_sequence: frame.receive_sequence,
                    is_final: true,
                },
                false,
                None,
            ),
            Self::Information(frame) => assemble(
                &frame.destination,
                &frame.source,
                Control::Information {
                    send_sequence: frame.send_sequence,
                    receive_sequence: frame.receive_sequence,
                    is_final: frame.is_final,
                },
                frame.segmented,
                Some(&frame.payload),
            ),
            Self::UnnumberedInformation(frame) => assemble(
                &frame.destination,
                &frame.source,
                Control::UnnumberedInformation { is_final: frame.is_final },
                frame.segmented,
                Some(&frame.payload),
            ),
        }
    }

    /// Parses one complete frame including both flags, verifying the
    /// declared length and both check sequences.
    pub fn parse(frame_bytes: &[u8]) -> Result<Self, Error> {
        if frame_bytes.len() < 9 {
            return Err(Error::Incomplete);
        }
        if frame_bytes[0] != HDLC_FLAG || frame_bytes[frame_bytes.len() - 1] != HDLC_FLAG {
            return Err(Error::Malformed(alloc::format!(
                "frame is not enclosed by HDLC flags"
            )));
        }

        let format = FrameFormat::from_bytes([frame_bytes[1], frame_bytes[2]])?;
        if format.length as usize + 2 != frame_bytes.len() {
            return Err(Error::Malformed(alloc::format!(
                "frame data is not of the length specified in the format field, should be {} \
                 but is {}",
                format.length,
                frame_bytes.len() - 2
            )));
        }

        let content = &frame_bytes[1..frame_bytes.len() - 1];
        let (fcs_data, fcs) = content.split_at(content.len() - 2);
        if !crc::matches(fcs_data, fcs) {
            return Err(Error::Malformed(alloc::format!("FCS is not correct")));
        }

        let (destination, source) = find_addresses(frame_bytes)?;
        let control_position = 2 + destination.length + source.length;
        let control = Control::from_byte(content[control_position])?;

        // The client receives frames addressed to it from a server.
        let destination = received_client_address(destination);
        let source = received_server_address(source);

        let header_end = control_position + 1;
        let read_information = |expect_info: bool| -> Result<Vec<u8>, Error> {
            if !expect_info {
                if header_end != fcs_data.len() {
                    return Err(Error::Malformed(alloc::format!(
                        "unexpected information field in control-only frame"
                    )));
                }
                return Ok(Vec::new());
            }
            if header_end + 2 > fcs_data.len() {
                return Err(Error::Malformed(alloc::format!("frame too short for HCS")));
            }
            let header = &content[..header_end];
            let hcs = &content[header_end..header_end + 2];
            if !crc::matches(header, hcs) {
                return Err(Error::Malformed(alloc::format!("HCS is not correct")));
            }
            Ok(fcs_data[header_end + 2..].to_vec())
        };

        match control {
            Control::Snrm { .. } => {
                read_information(false)?;
                Ok(Self::Snrm(SnrmFrame { destination, source }))
            }
            Control::Disconnect { .. } => {
                read_information(false)?;
                Ok(Self::Disconnect(DisconnectFrame { destination, source }))
            }
            Control::ReceiveReady { receive_sequence, .. } => {
                read_information(false)?;
                Ok(Self::ReceiveReady(ReceiveReadyFrame {
                    destination,
                    source,
                    receive_sequence,
                }))
            }
            Control::Ua { .. } => {
                let information = read_information(true)?;
                Ok(Self::Ua(UaFrame { destination, source, information }))
            }
            Control::Information { send_sequence, receive_sequence, is_final } => {
                let payload = read_information(true)?;
                Ok(Self::Information(InformationFrame {
                    destination,
                    source,
                    payload,
                    send_sequence,
                    receive_sequence,
                    segmented: format.segmented,
                    is_final,
                }))
            }
            Control::UnnumberedInformation { is_final } => {
                let payload = read_information(true)?;
                Ok(Self::UnnumberedInformation(UnnumberedInformationFrame {
                    destination,
                    source,
                    payload,
                    segmented: format.segmented,
                    is_final,
                }))
            }
        }
    }
}
