//! AARE APDU (A-Associate Response)
//!
//! Sent by the meter to accept or reject an application association. On a
//! protected association the responding AP title carries the meter system
//! title and the user-information field holds a ciphered InitiateResponse.
//!
//! Reference: DLMS Green Book Ed. 12, Section 11.4 and Tables 138-139

use alloc::vec::Vec;
use core::fmt;

use nom::{
    IResult,
    error::{Error as NomError, ErrorKind},
};

use super::ResponseUserInformation;
use super::ber::{
    TagClass, TagType, encode_application, encode_context_specific, encode_integer,
    encode_object_identifier, encode_octet_string, encode_tlv, parse_field, parse_integer,
    parse_object_identifier, parse_octet_string, parse_tag,
};
use super::enums::{
    AcseDiagnostics, AcseServiceUserDiagnostics, ApplicationContextName, AuthenticationValue,
};
use crate::enumerations::{AssociationResult, AuthenticationMechanism};

/// AARE APDU (A-Associate Response) - Tag 0x61
///
/// ```text
/// 61 (APPLICATION 1 CONSTRUCTED) - AARE
///   A1 (CONTEXT 1) - application-context-name
///   A2 (CONTEXT 2) - result
///   A3 (CONTEXT 3) - result-source-diagnostic
///   A4 (CONTEXT 4) - responding-AP-title (meter system title) [OPTIONAL]
///   88 (CONTEXT 8 PRIMITIVE) - responder-acse-requirements [OPTIONAL]
///   89 (CONTEXT 9 PRIMITIVE) - mechanism-name [OPTIONAL]
///   AA (CONTEXT 10) - responding-authentication-value [OPTIONAL]
///   BE (CONTEXT 30) - user-information [OPTIONAL]
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AareApdu {
    pub application_context_name: ApplicationContextName,
    pub result: AssociationResult,
    pub result_source_diagnostic: AcseDiagnostics,
    /// Responding AP title; the meter system title when ciphering is used
    pub responding_ap_title: Option<Vec<u8>>,
    /// Responder ACSE requirements: authentication functional unit selected
    pub responder_acse_requirements: Option<bool>,
    /// Confirmed authentication mechanism
    pub mechanism_name: Option<AuthenticationMechanism>,
    /// Meter-to-client challenge for HLS
    pub responding_authentication_value: Option<AuthenticationValue>,
    /// xDLMS InitiateResponse (cleartext or ciphered) or a
    /// ConfirmedServiceError when the xDLMS context was not accepted
    pub user_information: Option<ResponseUserInformation>,
}

impl AareApdu {
    /// An AARE accepting the association.
    pub fn new_accepted(
        context: ApplicationContextName,
        user_information: ResponseUserInformation,
    ) -> Self {
        Self {
            application_context_name: context,
            result: AssociationResult::Accepted,
            result_source_diagnostic: AcseDiagnostics::NULL,
            responding_ap_title: None,
            responder_acse_requirements: None,
            mechanism_name: None,
            responding_authentication_value: None,
            user_information: Some(user_information),
        }
    }

    /// An AARE rejecting the association.
    pub fn new_rejected(
        context: ApplicationContextName,
        result: AssociationResult,
        diagnostic: AcseServiceUserDiagnostics,
    ) -> Self {
        Self {
            application_context_name: context,
            result,
            result_source_diagnostic: AcseDiagnostics::User(diagnostic),
            responding_ap_title: None,
            responder_acse_requirements: None,
            mechanism_name: None,
            responding_authentication_value: None,
            user_information: None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.result.is_accepted()
    }

    /// Whether the application context selects ciphered APDUs.
    pub fn ciphered(&self) -> bool {
        self.application_context_name.uses_ciphering()
    }

    /// Responding AP title as an 8-byte system title.
    pub fn system_title(&self) -> Option<[u8; 8]> {
        self.responding_ap_title.as_deref().and_then(|title| title.try_into().ok())
    }

    /// Encode to ASN.1 BER, including the outer tag and length.
    pub fn encode(&self) -> Vec<u8> {
        let mut content = Vec::new();

        // A1: application-context-name
        let app_context_oid = encode_object_identifier(self.application_context_name.oid_bytes());
        content.extend(encode_context_specific(1, TagType::Constructed, &app_context_oid));

        // A2: result (INTEGER)
        content.extend(encode_context_specific(
            2,
            TagType::Constructed,
            &encode_integer(self.result as u8),
        ));

        // A3: result-source-diagnostic, CHOICE of acse-service-user (A1) or
        // acse-service-provider (A2), each wrapping an INTEGER
        let diagnostic = match self.result_source_diagnostic {
            AcseDiagnostics::User(user) => {
                encode_context_specific(1, TagType::Constructed, &encode_integer(user as u8))
            }
            AcseDiagnostics::Provider(provider) => {
                encode_context_specific(2, TagType::Constructed, &encode_integer(provider))
            }
        };
        content.extend(encode_context_specific(3, TagType::Constructed, &diagnostic));

        // A4: responding-AP-title
        if let Some(ref title) = self.responding_ap_title {
            let title_encoded = encode_octet_string(title);
            content.extend(encode_context_specific(4, TagType::Constructed, &title_encoded));
        }

        // 88: responder-acse-requirements
        if self.responder_acse_requirements == Some(true) {
            content.extend(encode_context_specific(8, TagType::Primitive, &[0x07, 0x80]));
        }

        // 89: mechanism-name, raw OID bytes
        if let Some(ref mechanism) = self.mechanism_name {
            content.extend(encode_context_specific(9, TagType::Primitive, &mechanism.oid_bytes()));
        }

        // AA: responding-authentication-value
        if let Some(ref auth_value) = self.responding_authentication_value {
            let choice = match auth_value {
                AuthenticationValue::CharString(challenge) => encode_tlv(0x80, challenge),
                AuthenticationValue::BitString(bits) => {
                    encode_tlv(0x81, &super::ber::encode_bit_string(bits, 0))
                }
            };
            content.extend(encode_context_specific(10, TagType::Constructed, &choice));
        }

        // BE: user-information
        if let Some(ref user_info) = self.user_information {
            let user_info_octets = encode_octet_string(&user_info.encode());
            content.extend(encode_context_specific(30, TagType::Constructed, &user_info_octets));
        }

        encode_application(1, TagType::Constructed, &content)
    }

    /// Parse from ASN.1 BER.
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, (class, tag_type, tag_number)) = parse_tag(input)?;
        if class != TagClass::Application || tag_type != TagType::Constructed || tag_number != 1 {
            return Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag)));
        }

        let (input, length) = super::ber::parse_length(input)?;
        let (remaining, mut content) = nom::bytes::streaming::take(length)(input)?;

        let mut application_context_name = None;
        let mut result = None;
        let mut result_source_diagnostic = None;
        let mut responding_ap_title = None;
        let mut responder_acse_requirements = None;
        let mut mechanism_name = None;
        let mut responding_authentication_value = None;
        let mut user_information = None;

        while !content.is_empty() {
            let (rest, (field_tag, field)) = parse_field(content)?;
            content = rest;

            match field_tag {
                0xA0 => {} // protocol-version, version1 assumed
                0xA1 => {
                    let (_, oid) = parse_object_identifier(field)?;
                    application_context_name = ApplicationContextName::from_oid_bytes(oid);
                }
                0xA2 => {
                    let (_, value) = parse_integer(field)?;
                    result = AssociationResult::try_from(value).ok();
                }
                0xA3 => {
                    let (_, (choice_tag, choice)) = parse_field(field)?;
                    let (_, value) = parse_integer(choice)?;
                    result_source_diagnostic = match choice_tag {
                        0xA1 => AcseServiceUserDiagnostics::try_from(value)
                            .ok()
                            .map(AcseDiagnostics::User),
                        0xA2 => Some(AcseDiagnostics::Provider(value)),
                        _ => None,
                    };
                }
                0xA4 => {
                    let (_, octets) = parse_octet_string(field)?;
                    responding_ap_title = Some(octets.to_vec());
                }
                0x88 => {
                    let last = field.last().copied().unwrap_or(0);
                    responder_acse_requirements = Some(last != 0);
                }
                0x89 => {
                    mechanism_name = AuthenticationMechanism::from_oid_bytes(field);
                }
                0xAA => {
                    let (_, (choice_tag, choice)) = parse_field(field)?;
                    responding_authentication_value = match choice_tag {
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
                    let (_, info) = ResponseUserInformation::parse(octets)?;
                    user_information = Some(info);
                }
                _ => {}
            }
        }

        let application_context_name = application_context_name
            .ok_or(nom::Err::Error(NomError::new(remaining, ErrorKind::Tag)))?;
        let result =
            result.ok_or(nom::Err::Error(NomError::new(remaining, ErrorKind::Tag)))?;
        let result_source_diagnostic = result_source_diagnostic
            .ok_or(nom::Err::Error(NomError::new(remaining, ErrorKind::Tag)))?;

        Ok((
            remaining,
            Self {
                application_context_name,
                result,
                result_source_diagnostic,
                responding_ap_title,
                responder_acse_requirements,
                mechanism_name,
                responding_authentication_value,
                user_information,
            },
        ))
    }
}

impl fmt::Display for AareApdu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AARE(ctx={}, result={:?}, mech={:?})",
            self.application_context_name, self.result, self.mechanism_name
        )
    }
}
