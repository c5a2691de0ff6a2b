//! The sans-I/O DLMS connection.
//!
//! A [`DlmsConnection`] owns everything one metering session needs: keys,
//! system titles, invocation counters, the negotiated conformance and the
//! state machine. It never touches I/O; callers move bytes with
//! [`DlmsConnection::send`] and [`DlmsConnection::receive_data`] /
//! [`DlmsConnection::next_event`] and an I/O collaborator carries them.
//!
//! Exactly one request is outstanding at a time; pairing of requests and
//! responses is enforced by the state machine.

use alloc::format;
use alloc::vec::Vec;

use log::{debug, info};

use crate::apdu::Apdu;
use crate::association::{
    AarqApdu, ApplicationContextName, AuthenticationValue, Conformance,
    GlobalCipherInitiateRequest, InitiateRequest, RequestUserInformation,
    ResponseUserInformation, RlrqApdu,
};
use crate::authentication;
use crate::data::DeviationConvention;
use crate::enumerations::{ActionResult, AuthenticationMechanism};
use crate::error::Error;
use crate::general_glo_ciphering::{CipherKey, GeneralGlobalCipher};
use crate::security;
use crate::security_control::SecurityControl;
use crate::state::{self, DlmsState, FlowEvent};

/// What [`DlmsConnection::next_event`] produced: a complete APDU or a
/// request for more bytes from the link layer.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Apdu(Apdu),
    NeedData,
}

/// Construction parameters for a [`DlmsConnection`].
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Client system title; a random one with a non-FLAG prefix is
    /// generated when left out.
    pub client_system_title: Option<[u8; 8]>,
    /// Global unicast encryption key. Present together with the
    /// authentication key on protected connections.
    pub global_encryption_key: Option<Vec<u8>>,
    pub global_authentication_key: Option<Vec<u8>>,
    /// Generate a dedicated session key at association and protect the
    /// data exchange with it instead of the global key.
    pub use_dedicated_ciphering: bool,
    /// Security suite id (0, 1 or 2), deciding the key lengths.
    pub security_suite: u8,
    pub authentication_method: Option<AuthenticationMechanism>,
    /// Low Level Security password.
    pub password: Option<Vec<u8>>,
    /// HLS challenge length, 8-64 bytes.
    pub challenge_length: usize,
    /// Initial client invocation counter, for meters that persist it.
    pub client_invocation_counter: u32,
    /// Last invocation counter accepted from the meter.
    pub meter_invocation_counter: u32,
    pub max_pdu_size: u16,
    /// Sign convention for datetime deviations reported by this meter.
    pub deviation_convention: DeviationConvention,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            client_system_title: None,
            global_encryption_key: None,
            global_authentication_key: None,
            use_dedicated_ciphering: false,
            security_suite: 0,
            authentication_method: None,
            password: None,
            challenge_length: 32,
            client_invocation_counter: 0,
            meter_invocation_counter: 0,
            max_pdu_size: 65535,
            deviation_convention: DeviationConvention::BlueBook,
        }
    }
}

/// A random system title: a non-FLAG-registered "uti" prefix plus five
/// random octets.
fn default_system_title() -> Result<[u8; 8], Error> {
    let mut title = [0u8; 8];
    title[..3].copy_from_slice(b"uti");
    getrandom::getrandom(&mut title[3..])
        .map_err(|err| Error::Protection(format!("system title generation failed: {err}")))?;
    Ok(title)
}

/// A client-side DLMS connection.
pub struct DlmsConnection {
    client_system_title: [u8; 8],
    global_encryption_key: Option<Vec<u8>>,
    global_authentication_key: Option<Vec<u8>>,
    use_dedicated_ciphering: bool,
    dedicated_key: Option<Vec<u8>>,
    security_suite: u8,
    authentication_method: Option<AuthenticationMechanism>,
    password: Option<Vec<u8>>,
    client_to_meter_challenge: Option<Vec<u8>>,
    meter_to_client_challenge: Option<Vec<u8>>,
    meter_system_title: Option<[u8; 8]>,
    // Counter bookkeeping: the client counter is incremented once per
    // protected APDU sent; the meter counters hold the last accepted value
    // and received APDUs must carry a strictly greater one.
    client_invocation_counter: u32,
    meter_invocation_counter: u32,
    dedicated_invocation_counter: u32,
    dedicated_meter_invocation_counter: u32,
    conformance: Conformance,
    max_pdu_size: u16,
    is_pre_established: bool,
    deviation_convention: DeviationConvention,
    buffer: Vec<u8>,
    state: DlmsState,
}

impl DlmsConnection {
    pub fn new(settings: ConnectionSettings) -> Result<Self, Error> {
        if let Some(key) = settings.global_encryption_key.as_deref() {
            security::validate_key(settings.security_suite, key)?;
        }
        if let Some(key) = settings.global_authentication_key.as_deref() {
            security::validate_key(settings.security_suite, key)?;
        }

        let client_system_title = match settings.client_system_title {
            Some(title) => title,
            None => default_system_title()?,
        };

        // HLS connections need a client-to-meter challenge up front; it is
        // sent in the AARQ.
        let client_to_meter_challenge = match settings.authentication_method {
            Some(method) if method.is_hls() => {
                Some(authentication::make_client_to_server_challenge(settings.challenge_length)?)
            }
            _ => None,
        };

        let mut conformance = Conformance::DEFAULT_CLIENT;
        if settings.global_encryption_key.is_some() {
            conformance |= Conformance::GENERAL_PROTECTION;
        }

        Ok(Self {
            client_system_title,
            global_encryption_key: settings.global_encryption_key,
            global_authentication_key: settings.global_authentication_key,
            use_dedicated_ciphering: settings.use_dedicated_ciphering,
            dedicated_key: None,
            security_suite: settings.security_suite,
            authentication_method: settings.authentication_method,
            password: settings.password,
            client_to_meter_challenge,
            meter_to_client_challenge: None,
            meter_system_title: None,
            client_invocation_counter: settings.client_invocation_counter,
            meter_invocation_counter: settings.meter_invocation_counter,
            dedicated_invocation_counter: 0,
            dedicated_meter_invocation_counter: 0,
            conformance,
            max_pdu_size: settings.max_pdu_size,
            is_pre_established: false,
            deviation_convention: settings.deviation_convention,
            buffer: Vec::new(),
            state: DlmsState::NoAssociation,
        })
    }

    /// A connection whose association is set up out of band. It starts in
    /// READY with the given conformance and refuses ACSE APDUs.
    pub fn with_pre_established_association(
        settings: ConnectionSettings,
        conformance: Conformance,
    ) -> Result<Self, Error> {
        let mut connection = Self::new(settings)?;
        connection.conformance = conformance;
        connection.is_pre_established = true;
        connection.state = DlmsState::Ready;
        Ok(connection)
    }

    pub fn state(&self) -> DlmsState {
        self.state
    }

    pub fn conformance(&self) -> Conformance {
        self.conformance
    }

    pub fn max_pdu_size(&self) -> u16 {
        self.max_pdu_size
    }

    pub fn client_system_title(&self) -> [u8; 8] {
        self.client_system_title
    }

    pub fn meter_system_title(&self) -> Option<[u8; 8]> {
        self.meter_system_title
    }

    pub fn client_invocation_counter(&self) -> u32 {
        self.client_invocation_counter
    }

    pub fn meter_invocation_counter(&self) -> u32 {
        self.meter_invocation_counter
    }

    pub fn deviation_convention(&self) -> DeviationConvention {
        self.deviation_convention
    }

    /// Flips the datetime deviation interpretation for meters reporting
    /// the opposite sign. Affects only interpretation helpers, never the
    /// stored bytes.
    pub fn set_deviation_convention(&mut self, convention: DeviationConvention) {
        self.deviation_convention = convention;
    }

    /// The security control applied to protected APDUs: authenticated when
    /// an authentication key is present, encrypted when an encryption key
    /// is.
    pub fn security_control(&self) -> SecurityControl {
        SecurityControl::with_protection(
            self.security_suite,
            self.global_authentication_key.is_some(),
            self.global_encryption_key.is_some(),
        )
    }

    /// Either key present means APDUs are protected.
    fn use_protection(&self) -> bool {
        self.global_encryption_key.is_some() || self.global_authentication_key.is_some()
    }

    fn effective_authentication(&self) -> Option<AuthenticationMechanism> {
        self.authentication_method.filter(|method| *method != AuthenticationMechanism::None)
    }

    /// Validates, advances the state machine, applies protection and
    /// serializes the event.
    pub fn send(&mut self, event: Apdu) -> Result<Vec<u8>, Error> {
        if self.is_pre_established && matches!(event, Apdu::Aarq(_) | Apdu::Rlrq(_)) {
            return Err(Error::PreEstablishedAssociation(format!(
                "cannot send {event} on a pre-established association"
            )));
        }

        self.validate_event_conformance(&event)?;
        self.state = state::transition_on_send(self.state, &event)?;
        debug!("client wants to send {event}");

        let event = if self.use_protection() { self.protect(event)? } else { event };

        info!("sending {event}");
        Ok(event.encode())
    }

    /// Appends received bytes to the connection buffer.
    pub fn receive_data(&mut self, data: &[u8]) {
        if !data.is_empty() {
            debug!("received {} bytes of DLMS data", data.len());
            self.buffer.extend_from_slice(data);
        }
    }

    /// Parses the buffered bytes into an APDU, removes protection,
    /// validates the event and advances the state machine.
    ///
    /// The lower layers deliver complete application payloads, so
    /// [`ConnectionEvent::NeedData`] only shows up when the buffer is empty
    /// or short.
    pub fn next_event(&mut self) -> Result<ConnectionEvent, Error> {
        if self.buffer.is_empty() {
            return Ok(ConnectionEvent::NeedData);
        }

        let apdu = match Apdu::from_bytes(&self.buffer) {
            Ok(apdu) => apdu,
            Err(Error::Incomplete) => return Ok(ConnectionEvent::NeedData),
            Err(err) => {
                // A malformed APDU aborts the current operation.
                self.buffer.clear();
                return Err(err);
            }
        };
        self.buffer.clear();

        let apdu = if self.use_protection() { self.unprotect(apdu)? } else { apdu };

        self.update_negotiated_parameters(&apdu);
        self.validate_event_conformance(&apdu)?;
        self.state = state::transition_on_receive(self.state, &apdu)?;

        if let Apdu::Aare(aare) = &apdu {
            if !aare.is_accepted() {
                // Reset the association on a reject.
                self.state = state::transition_on_flow(self.state, FlowEvent::RejectAssociation)?;
            } else if aare.mechanism_name.is_some_and(AuthenticationMechanism::is_hls) {
                self.state = state::transition_on_flow(self.state, FlowEvent::HlsStart)?;
            }
        }

        if self.state == DlmsState::HlsDone {
            self.finish_hls(&apdu)?;
        }

        Ok(ConnectionEvent::Apdu(apdu))
    }

    /// Verifies the meter's reply to the client challenge and settles the
    /// HLS procedure.
    fn finish_hls(&mut self, apdu: &Apdu) -> Result<(), Error> {
        let Apdu::ActionResponse(crate::action::ActionResponse::NormalWithData(response)) = apdu
        else {
            return Err(Error::LocalProtocol(format!(
                "received a non ACTION response while finishing HLS"
            )));
        };

        let valid = response.status == ActionResult::Success
            && match &response.data {
                crate::data::Data::OctetString(reply) => self.hls_response_valid(reply)?,
                _ => false,
            };

        let event = if valid { FlowEvent::HlsSuccess } else { FlowEvent::HlsFailed };
        self.state = state::transition_on_flow(self.state, event)?;
        Ok(())
    }

    /// Checks an APDU against the association parameters and the negotiated
    /// conformance.
    fn validate_event_conformance(&self, event: &Apdu) -> Result<(), Error> {
        match event {
            Apdu::Aarq(aarq) => {
                if self.global_encryption_key.is_some() {
                    if !aarq.ciphered() {
                        return Err(Error::Conformance(format!(
                            "connection is ciphered but AARQ does not indicate ciphering"
                        )));
                    }
                    match &aarq.user_information {
                        None => {
                            return Err(Error::Conformance(format!(
                                "connection is ciphered but AARQ does not contain an \
                                 InitiateRequest"
                            )));
                        }
                        Some(RequestUserInformation::Initiate(initiate))
                            if !initiate
                                .proposed_conformance
                                .contains(Conformance::GENERAL_PROTECTION) =>
                        {
                            return Err(Error::Conformance(format!(
                                "connection is ciphered but the proposed conformance does not \
                                 indicate general-protection"
                            )));
                        }
                        Some(_) => {}
                    }
                } else if aarq.ciphered() {
                    return Err(Error::Conformance(format!(
                        "connection is not ciphered, but the AARQ indicates ciphering"
                    )));
                }
            }
            Apdu::Aare(aare) => {
                if self.global_encryption_key.is_some() && !aare.ciphered() {
                    return Err(Error::Conformance(format!(
                        "connection is ciphered but AARE does not indicate ciphering"
                    )));
                }
            }
            Apdu::GetRequest(request) => {
                if !self.conformance.contains(Conformance::GET) {
                    return Err(Error::Conformance(format!(
                        "the association does not support the GET service"
                    )));
                }
                if request.uses_selective_access()
                    && !self.conformance.contains(Conformance::SELECTIVE_ACCESS)
                {
                    return Err(Error::Conformance(format!(
                        "the association does not support selective access"
                    )));
                }
            }
            Apdu::SetRequest(request) => {
                if !self.conformance.contains(Conformance::SET) {
                    return Err(Error::Conformance(format!(
                        "the association does not support the SET service"
                    )));
                }
                if request.uses_selective_access()
                    && !self.conformance.contains(Conformance::SELECTIVE_ACCESS)
                {
                    return Err(Error::Conformance(format!(
                        "the association does not support selective access"
                    )));
                }
            }
            Apdu::ActionRequest(_) => {
                if !self.conformance.contains(Conformance::ACTION) {
                    return Err(Error::Conformance(format!(
                        "the association does not support the ACTION service"
                    )));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Applies protection to an outgoing APDU and bumps the invocation
    /// counter of the key that was used.
    fn protect(&mut self, event: Apdu) -> Result<Apdu, Error> {
        let event = match event {
            // ACSE envelopes stay BER; only their embedded InitiateRequest
            // is replaced with a ciphered variant.
            Apdu::Aarq(mut aarq) => {
                if let Some(user_information) = aarq.user_information.take() {
                    aarq.user_information =
                        Some(self.protect_initiate_request(user_information)?);
                }
                self.client_invocation_counter += 1;
                Apdu::Aarq(aarq)
            }
            Apdu::Rlrq(mut rlrq) => {
                if let Some(user_information) = rlrq.user_information.take() {
                    rlrq.user_information =
                        Some(self.protect_initiate_request(user_information)?);
                }
                self.client_invocation_counter += 1;
                Apdu::Rlrq(rlrq)
            }
            Apdu::Aare(_) | Apdu::Rlre(_) => {
                return Err(Error::LocalProtocol(format!(
                    "a client never sends {event}, cannot protect it"
                )));
            }
            // Everything else is an xDLMS APDU and is wrapped whole.
            event => {
                info!("protecting a {event} with general ciphering");
                if let Some(dedicated_key) = self.dedicated_key.clone() {
                    let ciphered_text = security::encrypt(
                        self.security_control(),
                        &self.client_system_title,
                        self.dedicated_invocation_counter,
                        &dedicated_key,
                        self.global_authentication_key.as_deref().ok_or_else(|| {
                            Error::Protection(format!(
                                "unable to encrypt, missing global authentication key"
                            ))
                        })?,
                        &event.encode(),
                    )?;
                    let wrapped = GeneralGlobalCipher::new(
                        CipherKey::Dedicated,
                        self.client_system_title,
                        self.security_control(),
                        self.dedicated_invocation_counter,
                        ciphered_text,
                    );
                    self.dedicated_invocation_counter += 1;
                    Apdu::GeneralGlobalCipher(wrapped)
                } else {
                    let ciphered_text = self.encrypt(&event.encode())?;
                    let wrapped = GeneralGlobalCipher::new(
                        CipherKey::Global,
                        self.client_system_title,
                        self.security_control(),
                        self.client_invocation_counter,
                        ciphered_text,
                    );
                    self.client_invocation_counter += 1;
                    Apdu::GeneralGlobalCipher(wrapped)
                }
            }
        };
        Ok(event)
    }

    /// Encrypts the embedded InitiateRequest of an AARQ/RLRQ with the
    /// global key and replaces it with the tag-33 wrapper.
    fn protect_initiate_request(
        &self,
        user_information: RequestUserInformation,
    ) -> Result<RequestUserInformation, Error> {
        let initiate = match user_information {
            RequestUserInformation::Initiate(initiate) => initiate,
            // Already ciphered, nothing to do.
            ciphered => return Ok(ciphered),
        };
        let ciphered_text = self.encrypt(&initiate.encode())?;
        Ok(RequestUserInformation::Ciphered(GlobalCipherInitiateRequest {
            security_control: self.security_control(),
            invocation_counter: self.client_invocation_counter,
            ciphered_text,
        }))
    }

    /// Encrypts with the global key, the client system title and the
    /// current client invocation counter.
    fn encrypt(&self, plain_text: &[u8]) -> Result<Vec<u8>, Error> {
        let key = self.global_encryption_key.as_deref().ok_or_else(|| {
            Error::Protection(format!("unable to encrypt plain text, missing encryption key"))
        })?;
        let auth_key = self.global_authentication_key.as_deref().ok_or_else(|| {
            Error::Protection(format!("unable to encrypt plain text, missing authentication key"))
        })?;
        security::encrypt(
            self.security_control(),
            &self.client_system_title,
            self.client_invocation_counter,
            key,
            auth_key,
            plain_text,
        )
    }

    /// Removes protection from a received APDU, verifying the invocation
    /// counter first.
    fn unprotect(&mut self, event: Apdu) -> Result<Apdu, Error> {
        match event {
            Apdu::Aare(mut aare) => {
                if let Some(ResponseUserInformation::Ciphered(ciphered)) = &aare.user_information {
                    let plain = self.decrypt_initiate_response(
                        ciphered.security_control,
                        ciphered.invocation_counter,
                        &ciphered.ciphered_text,
                        aare.system_title(),
                    )?;
                    let (_, grafted) = ResponseUserInformation::parse(&plain)
                        .map_err(crate::error::map_nom("ciphered initiate-response"))?;
                    aare.user_information = Some(grafted);
                }
                Ok(Apdu::Aare(aare))
            }
            Apdu::Rlre(mut rlre) => {
                if let Some(ResponseUserInformation::Ciphered(ciphered)) = &rlre.user_information {
                    let plain = self.decrypt_initiate_response(
                        ciphered.security_control,
                        ciphered.invocation_counter,
                        &ciphered.ciphered_text,
                        None,
                    )?;
                    let (_, grafted) = ResponseUserInformation::parse(&plain)
                        .map_err(crate::error::map_nom("ciphered initiate-response"))?;
                    rlre.user_information = Some(grafted);
                }
                Ok(Apdu::Rlre(rlre))
            }
            Apdu::GeneralGlobalCipher(wrapped) => {
                let key = match wrapped.key {
                    CipherKey::Global => {
                        self.validate_received_invocation_counter(wrapped.invocation_counter)?;
                        self.meter_invocation_counter = wrapped.invocation_counter;
                        self.global_encryption_key.as_deref()
                    }
                    CipherKey::Dedicated => {
                        if wrapped.invocation_counter <= self.dedicated_meter_invocation_counter {
                            return Err(Error::LocalProtocol(format!(
                                "received invocation counter is not larger than the previous \
                                 received one"
                            )));
                        }
                        self.dedicated_meter_invocation_counter = wrapped.invocation_counter;
                        self.dedicated_key.as_deref()
                    }
                };
                let key = key.ok_or_else(|| {
                    Error::Protection(format!("unable to decrypt, missing encryption key"))
                })?;
                let auth_key = self.global_authentication_key.as_deref().ok_or_else(|| {
                    Error::Protection(format!("unable to decrypt, missing authentication key"))
                })?;

                let plain = security::decrypt(
                    wrapped.security_control,
                    &wrapped.system_title,
                    wrapped.invocation_counter,
                    key,
                    auth_key,
                    &wrapped.ciphered_text,
                )?;
                Apdu::from_bytes(&plain)
            }
            // Cleartext APDUs pass through; the meter may legitimately send
            // unprotected errors.
            event => Ok(event),
        }
    }

    /// Decrypts a GlobalCipherInitiateResponse payload using the meter
    /// system title from memory or, during association setup, from the
    /// AARE itself.
    fn decrypt_initiate_response(
        &mut self,
        security_control: SecurityControl,
        invocation_counter: u32,
        ciphered_text: &[u8],
        carried_title: Option<[u8; 8]>,
    ) -> Result<Vec<u8>, Error> {
        self.validate_received_invocation_counter(invocation_counter)?;
        self.meter_invocation_counter = invocation_counter;

        let system_title = self.meter_system_title.or(carried_title).ok_or_else(|| {
            Error::Protection(format!(
                "unable to decrypt, have not received the meter system title"
            ))
        })?;
        let key = self.global_encryption_key.as_deref().ok_or_else(|| {
            Error::Protection(format!("unable to decrypt, missing encryption key"))
        })?;
        let auth_key = self.global_authentication_key.as_deref().ok_or_else(|| {
            Error::Protection(format!("unable to decrypt, missing authentication key"))
        })?;

        security::decrypt(
            security_control,
            &system_title,
            invocation_counter,
            key,
            auth_key,
            ciphered_text,
        )
    }

    /// On an accepted AARE the connection takes over the parameters granted
    /// by the meter.
    fn update_negotiated_parameters(&mut self, event: &Apdu) {
        if self.state != DlmsState::AwaitingAssociationResponse {
            return;
        }
        let Apdu::Aare(aare) = event else {
            return;
        };

        if let Some(ResponseUserInformation::Initiate(response)) = &aare.user_information {
            self.conformance = response.negotiated_conformance;
            self.max_pdu_size = response.server_max_receive_pdu_size;
        }
        if let Some(title) = aare.system_title() {
            self.meter_system_title = Some(title);
        }
        self.authentication_method = aare.mechanism_name;
        self.meter_to_client_challenge = aare
            .responding_authentication_value
            .as_ref()
            .map(|value| value.as_bytes().to_vec());
    }

    /// An AARQ matching the connection configuration.
    pub fn get_aarq(&mut self) -> Result<AarqApdu, Error> {
        let ciphered = self.global_encryption_key.is_some();

        let mut initiate = InitiateRequest::new(self.conformance, self.max_pdu_size);
        if self.use_dedicated_ciphering {
            if !ciphered {
                return Err(Error::Protection(format!(
                    "dedicated ciphering requires a global encryption key"
                )));
            }
            let key_length = if self.security_suite == 2 { 32 } else { 16 };
            let mut dedicated_key = alloc::vec![0u8; key_length];
            getrandom::getrandom(&mut dedicated_key).map_err(|err| {
                Error::Protection(format!("dedicated key generation failed: {err}"))
            })?;
            initiate.dedicated_key = Some(dedicated_key.clone());
            self.dedicated_key = Some(dedicated_key);
            self.dedicated_invocation_counter = 0;
            self.dedicated_meter_invocation_counter = 0;
        }

        let authentication = self.effective_authentication();
        let authentication_value = match authentication {
            None => None,
            Some(AuthenticationMechanism::Lls) => {
                self.password.clone().map(AuthenticationValue::CharString)
            }
            Some(_) => {
                self.client_to_meter_challenge.clone().map(AuthenticationValue::CharString)
            }
        };

        Ok(AarqApdu {
            application_context_name: ApplicationContextName::logical_name(ciphered),
            called_ap_title: None,
            called_ae_qualifier: None,
            calling_ap_title: ciphered.then(|| self.client_system_title.to_vec()),
            calling_ae_qualifier: None,
            sender_acse_requirements: authentication.map(|_| true),
            mechanism_name: authentication,
            calling_authentication_value: authentication_value,
            user_information: Some(RequestUserInformation::Initiate(initiate)),
        })
    }

    /// An RLRQ to release the current association.
    pub fn get_rlrq(&self) -> RlrqApdu {
        RlrqApdu {
            reason: Some(crate::enumerations::ReleaseRequestReason::Normal),
            user_information: Some(RequestUserInformation::Initiate(InitiateRequest::new(
                self.conformance,
                self.max_pdu_size,
            ))),
        }
    }

    /// The payload of the reply-to-HLS ACTION request: the client's proof
    /// over the meter-to-client challenge.
    ///
    /// For HLS-GMAC the reply is SC ‖ IC ‖ GMAC(SC ‖ AK ‖ challenge) keyed
    /// with the encryption key and the client title/counter as IV.
    pub fn get_hls_reply(&self) -> Result<Vec<u8>, Error> {
        let challenge = self.meter_to_client_challenge.as_deref().ok_or_else(|| {
            Error::LocalProtocol(format!("meter has not sent a challenge"))
        })?;

        match self.effective_authentication() {
            Some(AuthenticationMechanism::HlsGmac) => {
                let key = self.global_encryption_key.as_deref().ok_or_else(|| {
                    Error::Protection(format!("unable to create GMAC, missing encryption key"))
                })?;
                let auth_key = self.global_authentication_key.as_deref().ok_or_else(|| {
                    Error::Protection(format!("unable to create GMAC, missing authentication key"))
                })?;

                let security_control =
                    SecurityControl::with_protection(self.security_suite, true, false);
                let gmac_result = security::gmac(
                    security_control,
                    &self.client_system_title,
                    self.client_invocation_counter,
                    key,
                    auth_key,
                    challenge,
                )?;

                let mut reply = Vec::with_capacity(1 + 4 + gmac_result.len());
                reply.push(security_control.to_byte());
                reply.extend_from_slice(&self.client_invocation_counter.to_be_bytes());
                reply.extend_from_slice(&gmac_result);
                Ok(reply)
            }
            Some(AuthenticationMechanism::Hls) => {
                let secret = self.password.as_deref().ok_or_else(|| {
                    Error::Protection(format!("common HLS needs a shared secret"))
                })?;
                authentication::common_hls_digest(secret, challenge)
            }
            method => Err(Error::Protection(format!(
                "no HLS implementation for {method:?}"
            ))),
        }
    }

    /// Verifies the meter's response to the client challenge.
    pub fn hls_response_valid(&self, response: &[u8]) -> Result<bool, Error> {
        let challenge = self.client_to_meter_challenge.as_deref().ok_or_else(|| {
            Error::Protection(format!("connection has no client-to-meter challenge"))
        })?;

        match self.effective_authentication() {
            Some(AuthenticationMechanism::HlsGmac) => {
                if response.len() != 1 + 4 + security::TAG_LENGTH {
                    return Ok(false);
                }
                let key = self.global_encryption_key.as_deref().ok_or_else(|| {
                    Error::Protection(format!("unable to verify GMAC, missing encryption key"))
                })?;
                let auth_key = self.global_authentication_key.as_deref().ok_or_else(|| {
                    Error::Protection(format!("unable to verify GMAC, missing authentication key"))
                })?;
                let meter_system_title = self.meter_system_title.ok_or_else(|| {
                    Error::Protection(format!(
                        "unable to verify GMAC, have not received the meter system title"
                    ))
                })?;

                let security_control = SecurityControl::from_byte(response[0]);
                let invocation_counter =
                    u32::from_be_bytes(response[1..5].try_into().expect("length checked"));
                let gmac_result = &response[5..];

                let correct = security::gmac(
                    security_control,
                    &meter_system_title,
                    invocation_counter,
                    key,
                    auth_key,
                    challenge,
                )?;
                Ok(gmac_result == correct)
            }
            Some(AuthenticationMechanism::Hls) => {
                let secret = self.password.as_deref().ok_or_else(|| {
                    Error::Protection(format!("common HLS needs a shared secret"))
                })?;
                Ok(response == authentication::common_hls_digest(secret, challenge)?)
            }
            method => Err(Error::Protection(format!(
                "no HLS implementation for {method:?}"
            ))),
        }
    }

    /// A received invocation counter must be strictly larger than the last
    /// one accepted from the meter.
    pub fn validate_received_invocation_counter(&self, received: u32) -> Result<(), Error> {
        if received <= self.meter_invocation_counter {
            return Err(Error::LocalProtocol(format!(
                "received invocation counter {received} is not larger than the previous \
                 received one {}",
                self.meter_invocation_counter
            )));
        }
        Ok(())
    }
}
