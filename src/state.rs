//! The DLMS connection state machine.
//!
//! Every event passing through a [`crate::connection::DlmsConnection`] is
//! checked against this table before it takes effect. An event with no
//! transition from the current state is a local protocol error and leaves
//! the state untouched - the engine never guesses.

use alloc::format;

use log::debug;

use crate::apdu::Apdu;
use crate::error::Error;
use crate::get::{GetRequest, GetResponse};
use crate::set::{SetRequest, SetResponse};

/// Client-side DLMS connection states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DlmsState {
    /// No application association established.
    NoAssociation,
    /// AARQ sent, waiting for the AARE.
    AwaitingAssociationResponse,
    /// Association established, no request outstanding.
    Ready,
    /// RLRQ sent, waiting for the RLRE.
    AwaitingReleaseResponse,
    /// GET request sent.
    AwaitingGetResponse,
    /// GET-Next sent during block transfer.
    AwaitingGetBlockResponse,
    /// A block arrived and must be acknowledged with GET-Next.
    ShouldAckLastGetBlock,
    /// SET request sent.
    AwaitingSetResponse,
    /// ACTION request sent.
    AwaitingActionResponse,
    /// The accepted AARE selected HLS; the challenge reply is due.
    ShouldSendHlsChallengeResult,
    /// HLS reply sent, waiting for the meter's proof.
    AwaitingHlsClientChallengeResult,
    /// The meter's HLS proof arrived and awaits verification.
    HlsDone,
}

/// Internal flow-control events that move the state machine without a wire
/// APDU of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FlowEvent {
    HlsStart,
    HlsSuccess,
    HlsFailed,
    RejectAssociation,
}

fn local_protocol_error(direction: &str, state: DlmsState, event: &Apdu) -> Error {
    Error::LocalProtocol(format!("cannot {direction} {event} in state {state:?}"))
}

/// Transition taken when the client sends `event`.
pub(crate) fn transition_on_send(state: DlmsState, event: &Apdu) -> Result<DlmsState, Error> {
    let new_state = match (state, event) {
        (DlmsState::NoAssociation, Apdu::Aarq(_)) => DlmsState::AwaitingAssociationResponse,

        (DlmsState::Ready, Apdu::Rlrq(_)) => DlmsState::AwaitingReleaseResponse,
        (DlmsState::Ready, Apdu::GetRequest(GetRequest::Normal(_)))
        | (DlmsState::Ready, Apdu::GetRequest(GetRequest::WithList(_))) => {
            DlmsState::AwaitingGetResponse
        }
        (DlmsState::Ready, Apdu::SetRequest(SetRequest::Normal(_))) => {
            DlmsState::AwaitingSetResponse
        }
        (DlmsState::Ready, Apdu::ActionRequest(_)) => DlmsState::AwaitingActionResponse,

        // A received block is acknowledged by requesting the next one.
        (DlmsState::ShouldAckLastGetBlock, Apdu::GetRequest(GetRequest::Next(_))) => {
            DlmsState::AwaitingGetBlockResponse
        }

        // The HLS reply is an ordinary ACTION request, but only valid from
        // the dedicated state.
        (DlmsState::ShouldSendHlsChallengeResult, Apdu::ActionRequest(_)) => {
            DlmsState::AwaitingHlsClientChallengeResult
        }

        _ => return Err(local_protocol_error("send", state, event)),
    };
    debug!("DLMS state transitioned from {state:?} to {new_state:?}");
    Ok(new_state)
}

/// Transition taken when `event` is received from the meter.
pub(crate) fn transition_on_receive(state: DlmsState, event: &Apdu) -> Result<DlmsState, Error> {
    let new_state = match (state, event) {
        (DlmsState::AwaitingAssociationResponse, Apdu::Aare(_)) => DlmsState::Ready,
        (DlmsState::AwaitingAssociationResponse, Apdu::ExceptionResponse(_)) => {
            DlmsState::NoAssociation
        }

        (
            DlmsState::AwaitingGetResponse | DlmsState::AwaitingGetBlockResponse,
            Apdu::GetResponse(response),
        ) => match response {
            GetResponse::WithBlock(_) => DlmsState::ShouldAckLastGetBlock,
            GetResponse::Normal(_)
            | GetResponse::NormalWithError(_)
            | GetResponse::WithList(_)
            | GetResponse::LastBlock(_)
            | GetResponse::LastBlockWithError(_) => DlmsState::Ready,
        },
        (
            DlmsState::AwaitingGetResponse | DlmsState::AwaitingGetBlockResponse,
            Apdu::ExceptionResponse(_),
        ) => DlmsState::Ready,

        (DlmsState::AwaitingSetResponse, Apdu::SetResponse(SetResponse::Normal(_))) => {
            DlmsState::Ready
        }

        (DlmsState::AwaitingActionResponse, Apdu::ActionResponse(_)) => DlmsState::Ready,

        (DlmsState::AwaitingHlsClientChallengeResult, Apdu::ActionResponse(response)) => {
            match response {
                crate::action::ActionResponse::NormalWithData(_) => DlmsState::HlsDone,
                _ => DlmsState::NoAssociation,
            }
        }

        (DlmsState::AwaitingReleaseResponse, Apdu::Rlre(_)) => DlmsState::NoAssociation,
        (DlmsState::AwaitingReleaseResponse, Apdu::ExceptionResponse(_)) => DlmsState::Ready,

        // Unsolicited push data does not disturb the association.
        (DlmsState::Ready, Apdu::DataNotification(_)) => DlmsState::Ready,

        _ => return Err(local_protocol_error("receive", state, event)),
    };
    debug!("DLMS state transitioned from {state:?} to {new_state:?}");
    Ok(new_state)
}

/// Transition taken for an internal flow-control event.
pub(crate) fn transition_on_flow(state: DlmsState, event: FlowEvent) -> Result<DlmsState, Error> {
    let new_state = match (state, event) {
        (DlmsState::Ready, FlowEvent::HlsStart) => DlmsState::ShouldSendHlsChallengeResult,
        (DlmsState::Ready, FlowEvent::RejectAssociation) => DlmsState::NoAssociation,
        (DlmsState::HlsDone, FlowEvent::HlsSuccess) => DlmsState::Ready,
        (DlmsState::HlsDone, FlowEvent::HlsFailed) => DlmsState::NoAssociation,
        _ => {
            return Err(Error::LocalProtocol(format!(
                "cannot handle {event:?} in state {state:?}"
            )));
        }
    };
    debug!("DLMS state transitioned from {state:?} to {new_state:?}");
    Ok(new_state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::association::{
        AarqApdu, Conformance, InitiateRequest, InitiateResponse, RequestUserInformation,
        ResponseUserInformation, RlrqApdu,
    };
    use crate::cosem::CosemAttribute;
    use crate::enumerations::{ServiceException, StateException};
    use crate::get::{GetRequestNext, GetRequestNormal, GetResponseNormal, GetResponseWithBlock};
    use crate::invoke_id::InvokeIdAndPriority;

    fn aarq() -> Apdu {
        Apdu::Aarq(AarqApdu::new_simple_ln(RequestUserInformation::Initiate(
            InitiateRequest::new_ln(0xFFFF),
        )))
    }

    fn aare() -> Apdu {
        Apdu::Aare(crate::association::AareApdu::new_accepted(
            crate::association::ApplicationContextName::LogicalNameReferencing,
            ResponseUserInformation::Initiate(InitiateResponse::new(
                Conformance::DEFAULT_CLIENT,
                0xFFFF,
            )),
        ))
    }

    fn get_request() -> Apdu {
        Apdu::GetRequest(GetRequest::Normal(GetRequestNormal::new(
            CosemAttribute::invocation_counter(),
        )))
    }

    fn get_response() -> Apdu {
        Apdu::GetResponse(GetResponse::Normal(GetResponseNormal {
            invoke_id_and_priority: InvokeIdAndPriority::default(),
            data: alloc::vec![0x00],
        }))
    }

    fn exception() -> Apdu {
        Apdu::ExceptionResponse(crate::exception_response::ExceptionResponse {
            state_error: StateException::ServiceNotAllowed,
            service_error: ServiceException::OperationNotPossible,
            invocation_counter_data: None,
        })
    }

    #[test]
    fn test_association_flow() {
        let state = transition_on_send(DlmsState::NoAssociation, &aarq()).unwrap();
        assert_eq!(state, DlmsState::AwaitingAssociationResponse);
        let state = transition_on_receive(state, &aare()).unwrap();
        assert_eq!(state, DlmsState::Ready);
    }

    #[test]
    fn test_get_flow() {
        let state = transition_on_send(DlmsState::Ready, &get_request()).unwrap();
        assert_eq!(state, DlmsState::AwaitingGetResponse);
        let state = transition_on_receive(state, &get_response()).unwrap();
        assert_eq!(state, DlmsState::Ready);
    }

    #[test]
    fn test_get_block_flow() {
        let block = Apdu::GetResponse(GetResponse::WithBlock(GetResponseWithBlock {
            invoke_id_and_priority: InvokeIdAndPriority::default(),
            block_number: 1,
            data: alloc::vec![0x01],
        }));
        let next = Apdu::GetRequest(GetRequest::Next(GetRequestNext {
            invoke_id_and_priority: InvokeIdAndPriority::default(),
            block_number: 1,
        }));

        let state = transition_on_send(DlmsState::Ready, &get_request()).unwrap();
        let state = transition_on_receive(state, &block).unwrap();
        assert_eq!(state, DlmsState::ShouldAckLastGetBlock);
        let state = transition_on_send(state, &next).unwrap();
        assert_eq!(state, DlmsState::AwaitingGetBlockResponse);
        let state = transition_on_receive(state, &block).unwrap();
        assert_eq!(state, DlmsState::ShouldAckLastGetBlock);
    }

    #[test]
    fn test_get_next_only_valid_after_block() {
        let next = Apdu::GetRequest(GetRequest::Next(GetRequestNext {
            invoke_id_and_priority: InvokeIdAndPriority::default(),
            block_number: 1,
        }));
        assert!(matches!(
            transition_on_send(DlmsState::Ready, &next),
            Err(Error::LocalProtocol(_))
        ));
    }

    #[test]
    fn test_invalid_event_does_not_change_state() {
        // GET before association is a caller bug.
        let result = transition_on_send(DlmsState::NoAssociation, &get_request());
        assert!(matches!(result, Err(Error::LocalProtocol(_))));

        // Receiving an AARE while READY makes no sense either.
        let result = transition_on_receive(DlmsState::Ready, &aare());
        assert!(matches!(result, Err(Error::LocalProtocol(_))));
    }

    #[test]
    fn test_release_flow() {
        let state = transition_on_send(DlmsState::Ready, &Apdu::Rlrq(RlrqApdu::new())).unwrap();
        assert_eq!(state, DlmsState::AwaitingReleaseResponse);
        let state = transition_on_receive(
            state,
            &Apdu::Rlre(crate::association::RlreApdu {
                reason: Some(crate::enumerations::ReleaseResponseReason::Normal),
                user_information: None,
            }),
        )
        .unwrap();
        assert_eq!(state, DlmsState::NoAssociation);
    }

    #[test]
    fn test_release_interrupted_by_exception_returns_ready() {
        let state = transition_on_receive(DlmsState::AwaitingReleaseResponse, &exception()).unwrap();
        assert_eq!(state, DlmsState::Ready);
    }

    #[test]
    fn test_exception_while_awaiting_association() {
        let state =
            transition_on_receive(DlmsState::AwaitingAssociationResponse, &exception()).unwrap();
        assert_eq!(state, DlmsState::NoAssociation);
    }

    #[test]
    fn test_hls_flow_events() {
        let state = transition_on_flow(DlmsState::Ready, FlowEvent::HlsStart).unwrap();
        assert_eq!(state, DlmsState::ShouldSendHlsChallengeResult);
        assert_eq!(
            transition_on_flow(DlmsState::HlsDone, FlowEvent::HlsSuccess).unwrap(),
            DlmsState::Ready
        );
        assert_eq!(
            transition_on_flow(DlmsState::HlsDone, FlowEvent::HlsFailed).unwrap(),
            DlmsState::NoAssociation
        );
        assert!(transition_on_flow(DlmsState::Ready, FlowEvent::HlsSuccess).is_err());
    }

    #[test]
    fn test_data_notification_keeps_ready() {
        let notification = Apdu::DataNotification(crate::data_notification::DataNotification {
            long_invoke_id_and_priority: crate::invoke_id::LongInvokeIdAndPriority::new(1),
            date_time: None,
            body: alloc::vec![0x00],
        });
        assert_eq!(
            transition_on_receive(DlmsState::Ready, &notification).unwrap(),
            DlmsState::Ready
        );
    }
}
