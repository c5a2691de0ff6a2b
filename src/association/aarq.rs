//! AARQ APDU (A-Associate Request)
//!
//! Sent by the client to initiate an application association. BER encoded
//! with context-specific tags; the user-information field carries the
//! A-XDR encoded xDLMS InitiateRequest (possibly ciphered) wrapped in a
//! BER octet string.
//!
//! Reference: DLMS Green Book Ed. 12, Section 11.3 and Tables 136-137

use alloc::vec::Vec;
use core::fmt;

use nom::{
    IResult,
    error::{Error as NomError, ErrorKind},
};

use super::ber::{
    TagType, encode_application, encode_bit_string, encode_context_specific,
    encode_object_identifier, encode_octet_string, encode_tlv, parse_field,
    parse_object_identifier, parse_octet_string, parse_tag,
};
use super::enums::{ApplicationContextName, AuthenticationValue};
use super::RequestUserInformation;
use crate::association::ber::TagClass;
use crate::enumerations::AuthenticationMechanism;

/// AARQ APDU (A-Associate Request) - Tag 0x60
///
/// ```text
/// 60 (APPLICATION 0 CONSTRUCTED) - AARQ
///   A1 (CONTEXT 1) - application-context-name
///   A2 (CONTEXT 2) - called-AP-title [OPTIONAL]
///   A3 (CONTEXT 3) - called-AE-qualifier [OPTIONAL]
///   A6 (CONTEXT 6) - calling-AP-title (system title when ciphered) [OPTIONAL]
///   A7 (CONTEXT 7) - calling-AE-qualifier [OPTIONAL]
///   8A (CONTEXT 10 PRIMITIVE) - sender-acse-requirements [OPTIONAL]
///   8B (CONTEXT 11 PRIMITIVE) - mechanism-name [OPTIONAL]
///   AC (CONTEXT 12) - calling-authentication-value [OPTIONAL]
///   BE (CONTEXT 30) - user-information [OPTIONAL]
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AarqApdu {
    /// Application context name (LN/SN, with/without ciphering)
    pub application_context_name: ApplicationContextName,
    /// Called AP title (server) - optional
    pub called_ap_title: Option<Vec<u8>>,
    /// Called AE qualifier (server) - optional
    pub called_ae_qualifier: Option<Vec<u8>>,
    /// Calling AP title - the client system title, mandatory when ciphered
    pub calling_ap_title: Option<Vec<u8>>,
    /// Calling AE qualifier (client) - optional
    pub calling_ae_qualifier: Option<Vec<u8>>,
    /// Sender ACSE requirements: authentication functional unit selected
    pub sender_acse_requirements: Option<bool>,
    /// Authentication mechanism (OID)
    pub mechanism_name: Option<AuthenticationMechanism>,
    /// Authentication value (LLS password or HLS client-to-meter challenge)
    pub calling_authentication_value: Option<AuthenticationValue>,
    /// xDLMS InitiateRequest, cleartext or global-ciphered
    pub user_information: Option<RequestUserInformation>,
}

impl AarqApdu {
    /// An AARQ without authentication, LN referencing, no ciphering.
    pub fn new_simple_ln(user_information: RequestUserInformation) -> Self {
        Self {
            application_context_name: ApplicationContextName::LogicalNameReferencing,
            called_ap_title: None,
            called_ae_qualifier: None,
            calling_ap_title: None,
            calling_ae_qualifier: None,
            sender_acse_requirements: None,
            mechanism_name: None,
            calling_authentication_value: None,
            user_information: Some(user_information),
        }
    }

    /// An AARQ with LLS password authentication.
    pub fn new_with_password(user_information: RequestUserInformation, password: Vec<u8>) -> Self {
        Self {
            sender_acse_requirements: Some(true),
            mechanism_name: Some(AuthenticationMechanism::Lls),
            calling_authentication_value: Some(AuthenticationValue::CharString(password)),
            ..Self::new_simple_ln(user_information)
        }
    }

    /// Whether the application context selects ciphered APDUs.
    pub fn ciphered(&self) -> bool {
        self.application_context_name.uses_ciphering()
    }

    /// Calling AP title as an 8-byte system title, when present and well
    /// formed.
    pub fn system_title(&self) -> Option<[u8; 8]> {
        self.calling_ap_title.as_deref().and_then(|title| title.try_into().ok())
    }

    /// Encode to ASN.1 BER, including the outer tag and length.
    pub fn encode(&self) -> Vec<u8> {
        let mut content = Vec::new();

        // A1: application-context-name (OBJECT IDENTIFIER)
        let app_context_oid = encode_object_identifier(self.application_context_name.oid_bytes());
        content.extend(encode_context_specific(1, TagType::Constructed, &app_context_oid));

        // A2: called-AP-title (OPTIONAL)
        if let Some(ref title) = self.called_ap_title {
            let title_encoded = encode_octet_string(title);
            content.extend(encode_context_specific(2, TagType::Constructed, &title_encoded));
        }

        // A3: called-AE-qualifier (OPTIONAL)
        if let Some(ref qualifier) = self.called_ae_qualifier {
            let qualifier_encoded = encode_octet_string(qualifier);
            content.extend(encode_context_specific(3, TagType::Constructed, &qualifier_encoded));
        }

        // A6: calling-AP-title (OPTIONAL) - system title for ciphering
        if let Some(ref title) = self.calling_ap_title {
            let title_encoded = encode_octet_string(title);
            content.extend(encode_context_specific(6, TagType::Constructed, &title_encoded));
        }

        // A7: calling-AE-qualifier (OPTIONAL)
        if let Some(ref qualifier) = self.calling_ae_qualifier {
            let qualifier_encoded = encode_octet_string(qualifier);
            content.extend(encode_context_specific(7, TagType::Constructed, &qualifier_encoded));
        }

        // 8A: sender-acse-requirements (OPTIONAL). Only ever sent to select
        // the authentication functional unit: bit string 0x07 0x80.
        if self.sender_acse_requirements == Some(true) {
            content.extend(encode_context_specific(10, TagType::Primitive, &[0x07, 0x80]));
        }

        // 8B: mechanism-name (OPTIONAL). The OID bytes are carried raw,
        // without a nested OBJECT IDENTIFIER header.
        if let Some(ref mechanism) = self.mechanism_name {
            content.extend(encode_context_specific(
                11,
                TagType::Primitive,
                &mechanism.oid_bytes(),
            ));
        }

        // AC: calling-authentication-value (OPTIONAL)
        if let Some(ref auth_value) = self.calling_authentication_value {
            let choice = match auth_value {
                AuthenticationValue::CharString(password) => encode_tlv(0x80, password),
                AuthenticationValue::BitString(bits) => {
                    encode_tlv(0x81, &encode_bit_string(bits, 0))
                }
            };
            content.extend(encode_context_specific(12, TagType::Constructed, &choice));
        }

        // BE: user-information (OPTIONAL) - octet string holding the xDLMS
        // InitiateRequest
        if let Some(ref user_info) = self.user_information {
            let user_info_octets = encode_octet_string(&user_info.encode());
            content.extend(encode_context_specific(30, TagType::Constructed, &user_info_octets));
        }

        encode_application(0, TagType::Constructed, &content)
    }

    /// Parse from ASN.1 BER.
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, (class, tag_type, tag_number)) = parse_tag(input)?;
        if class != TagClass::Application || tag_type != TagType::Constructed || tag_number != 0 {
            return Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag)));
        }

        let (input, length) = super::ber::parse_length(input)?;
        let (remaining, mut content) = nom::bytes::streaming::take(length)(input)?;

        let mut application_context_name = None;
        let mut called_ap_title = None;
        let mut called_ae_qualifier = None;
        let mut calling_ap_title = None;
        let mut calling_ae_qualifier = None;
        let mut sender_acse_requirements = None;
        let mut mechanism_name = None;
        let mut calling_authentication_value = None;
        let mut user_information = None;

        while !content.is_empty() {
            let (rest, (field_tag, field)) = parse_field(content)?;
            content = rest;

            match field_tag {
                // A0: protocol-version, version1 assumed
                0xA0 => {}
                0xA1 => {
                    let (_, oid) = parse_object_identifier(field)?;
                    application_context_name = ApplicationContextName::from_oid_bytes(oid);
                }
                0xA2 => {
                    let (_, octets) = parse_octet_string(field)?;
                    called_ap_title = Some(octets.to_vec());
                }
                0xA3 => {
                    let (_, octets) = parse_octet_string(field)?;
                    called_ae_qualifier = Some(octets.to_vec());
                }
                0xA6 => {
                    let (_, octets) = parse_octet_string(field)?;
                    calling_ap_title = Some(octets.to_vec());
                }
                0xA7 => {
                    let (_, octets) = parse_octet_string(field)?;
                    calling_ae_qualifier = Some(octets.to_vec());
                }
                0x8A => {
                    // Bit string content: unused-bit count then the bits.
                    // Functional unit 0 (authentication) selected when the
                    // data byte is non-zero.
                    let last = field.last().copied().unwrap_or(0);
                    sender_acse_requirements = Some(last != 0);
                }
                0x8B => {
                    mechanism_name = AuthenticationMechanism::from_oid_bytes(field);
                }
                0xAC => {
                    let (_, (choice_tag, choice)) = parse_field(field)?;
                    calling_authentication_value = match choice_tag {
                        0x80 => Some(AuthenticationValue::CharString(choice.to_vec())),
                        0x81 => {
                            let (_, (bits, _unused)) = super::ber::parse_bit_string(choice)?;
                            Some(AuthenticationValue::BitString(bits.to_vec()))
                        }
                        _ => {
                            return Err(nom::Err::Error(NomError::new(field, ErrorKind::Tag)));
                        }
                    };
                }
                0xBE => {
                    let (_, octets) = parse_octet_string(field)?;
                    let (_, info) = RequestUserInformation::parse(octets)?;
                    user_information = Some(info);
                }
                // Unknown optional field, skip it
                _ => {}
            }
        }

        let application_context_name = application_context_name
            .ok_or(nom::Err::Error(NomError::new(remaining, ErrorKind::Tag)))?;

        Ok((
            remaining,
            Self {
                application_context_name,
                called_ap_title,
                called_ae_qualifier,
                calling_ap_title,
                calling_ae_qualifier,
                sender_acse_requirements,
                mechanism_name,
                calling_authentication_value,
                user_information,
            },
        ))
    }
}

impl fmt::Display for AarqApdu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AARQ(ctx={}, mech={:?})", self.application_context_name, self.mechanism_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::association::Conformance;
    use crate::association::initiate::{GlobalCipherInitiateRequest, InitiateRequest};
    use crate::security_control::SecurityControl;
    use crate::test_support::hex;

    #[test]
    fn test_encode_minimal_ln_green_book_vector() {
        let aarq = AarqApdu::new_simple_ln(RequestUserInformation::Initiate(
            InitiateRequest::new_ln(0xFFFF),
        ));
        assert_eq!(
            aarq.encode(),
            hex("601DA109060760857405080101BE10040E01000000065F1F0400001E1DFFFF")
        );
    }

    #[test]
    fn test_parse_minimal_ln_green_book_vector() {
        let bytes = hex("601DA109060760857405080101BE10040E01000000065F1F0400001E1DFFFF");
        let (rest, aarq) = AarqApdu::parse(&bytes).unwrap();
        assert!(rest.is_empty());
        assert!(!aarq.ciphered());
        assert_eq!(aarq.mechanism_name, None);
        assert_eq!(
            aarq.application_context_name,
            ApplicationContextName::LogicalNameReferencing
        );
        let Some(RequestUserInformation::Initiate(request)) = &aarq.user_information else {
            panic!("expected cleartext InitiateRequest");
        };
        assert_eq!(request.client_max_receive_pdu_size, 0xFFFF);
        assert_eq!(request.proposed_conformance, Conformance::DEFAULT_CLIENT);
    }

    #[test]
    fn test_parse_lls_vector() {
        let bytes = hex(
            "6036A1090607608574050801018A0207808B0760857405080201AC0A80083132333435363738\
             BE10040E01000000065F1F0400007E1F04B0",
        );
        let (_, aarq) = AarqApdu::parse(&bytes).unwrap();
        assert!(!aarq.ciphered());
        assert_eq!(aarq.mechanism_name, Some(AuthenticationMechanism::Lls));
        assert_eq!(aarq.sender_acse_requirements, Some(true));
        assert_eq!(
            aarq.calling_authentication_value,
            Some(AuthenticationValue::CharString(b"12345678".to_vec()))
        );
    }

    #[test]
    fn test_parse_hls_gmac_vector() {
        let bytes = hex(
            "6036A1090607608574050801018A0207808B0760857405080205AC0A80084B35366956616759\
             BE10040E01000000065F1F0400007E1F04B0",
        );
        let (_, aarq) = AarqApdu::parse(&bytes).unwrap();
        assert_eq!(aarq.mechanism_name, Some(AuthenticationMechanism::HlsGmac));
        assert!(aarq.calling_authentication_value.is_some());
    }

    #[test]
    fn test_parse_ciphered_vector_roundtrip() {
        // Ciphered AARQ: context LN-ciphered, system title in A6, ciphered
        // InitiateRequest (tag 33) in BE.
        let bytes = hex(
            "6066a109060760857405080103a60a04084D4D4D0000BC614E8a0207808b0760857405080201\
             ac0a80083132333435363738be34043221303001234567801302FF8A7874133D414CED25B425\
             34D28DB0047720606B175BD52211BE6841DB204D39EE6FDB8E356855",
        );
        let (rest, aarq) = AarqApdu::parse(&bytes).unwrap();
        assert!(rest.is_empty());
        assert!(aarq.ciphered());
        assert_eq!(
            aarq.system_title(),
            Some([0x4D, 0x4D, 0x4D, 0x00, 0x00, 0xBC, 0x61, 0x4E])
        );
        assert_eq!(aarq.mechanism_name, Some(AuthenticationMechanism::Lls));
        let Some(RequestUserInformation::Ciphered(ciphered)) = &aarq.user_information else {
            panic!("expected ciphered InitiateRequest");
        };
        assert_eq!(ciphered.invocation_counter, 0x01234567);
        assert_eq!(ciphered.security_control.to_byte(), 0x30);

        assert_eq!(aarq.encode(), bytes);
    }

    #[test]
    fn test_roundtrip_with_password() {
        let aarq = AarqApdu::new_with_password(
            RequestUserInformation::Initiate(InitiateRequest::new_ln(0x0400)),
            b"secret123".to_vec(),
        );
        let encoded = aarq.encode();
        let (rest, parsed) = AarqApdu::parse(&encoded).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, aarq);
    }

    #[test]
    fn test_roundtrip_ciphered() {
        let mut aarq = AarqApdu::new_simple_ln(RequestUserInformation::Ciphered(
            GlobalCipherInitiateRequest {
                security_control: SecurityControl::with_protection(0, true, true),
                invocation_counter: 1,
                ciphered_text: alloc::vec![0x55; 30],
            },
        ));
        aarq.application_context_name =
            ApplicationContextName::LogicalNameReferencingWithCiphering;
        aarq.calling_ap_title = Some(alloc::vec![1, 2, 3, 4, 5, 6, 7, 8]);

        let encoded = aarq.encode();
        let (rest, parsed) = AarqApdu::parse(&encoded).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, aarq);
    }

    #[test]
    fn test_missing_context_name_is_rejected() {
        // Valid outer structure but no A1 field.
        let bytes = [0x60, 0x04, 0xA2, 0x02, 0x04, 0x00];
        assert!(AarqApdu::parse(&bytes).is_err());
    }
}
