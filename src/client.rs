//! Blocking client façade.
//!
//! Drives a [`DlmsConnection`] through a [`Transport`]: association
//! including the HLS round trip, GET with automatic block reassembly,
//! with-list reads, SET, ACTION and release. Everything here is policy-free
//! glue; the protocol rules live in the sans-I/O core.

use alloc::format;
use alloc::vec::Vec;

use log::debug;

use crate::action::{ActionRequest, ActionRequestNormal, ActionResponse};
use crate::apdu::Apdu;
use crate::connection::{ConnectionEvent, DlmsConnection};
use crate::cosem::{CosemAttribute, CosemAttributeWithSelection, CosemMethod};
use crate::data::Data;
use crate::enumerations::{ActionResult, DataAccessResult};
use crate::error::{Error, map_nom};
use crate::get::{GetDataResult, GetRequest, GetRequestNext, GetRequestNormal, GetRequestWithList,
    GetResponse};
use crate::invoke_id::InvokeIdAndPriority;
use crate::io::Transport;
use crate::selective_access::AccessDescriptor;
use crate::set::{SetRequest, SetRequestNormal, SetResponse};
use crate::state::DlmsState;

/// A blocking DLMS client over any [`Transport`].
pub struct DlmsClient<T: Transport> {
    connection: DlmsConnection,
    transport: T,
}

impl<T: Transport> DlmsClient<T> {
    pub fn new(connection: DlmsConnection, transport: T) -> Self {
        Self { connection, transport }
    }

    pub fn connection(&self) -> &DlmsConnection {
        &self.connection
    }

    /// Opens the transport (for HDLC this runs the SNRM/UA handshake).
    pub fn connect(&mut self) -> Result<(), Error> {
        self.transport.connect()
    }

    pub fn disconnect(&mut self) -> Result<(), Error> {
        self.transport.disconnect()
    }

    /// Establishes the application association, running the HLS
    /// challenge/response when the meter asks for it.
    pub fn associate(&mut self) -> Result<(), Error> {
        let aarq = self.connection.get_aarq()?;
        let aare = match self.exchange(Apdu::Aarq(aarq))? {
            Apdu::Aare(aare) => aare,
            other => {
                return Err(Error::LocalProtocol(format!(
                    "expected an AARE in response to the AARQ, got {other}"
                )));
            }
        };
        if !aare.is_accepted() {
            return Err(Error::LocalProtocol(format!(
                "association rejected: {:?}, diagnostics {:?}",
                aare.result, aare.result_source_diagnostic
            )));
        }

        if self.connection.state() == DlmsState::ShouldSendHlsChallengeResult {
            debug!("association requires HLS, answering the meter challenge");
            self.run_hls()?;
        }
        Ok(())
    }

    fn run_hls(&mut self) -> Result<(), Error> {
        let reply = self.connection.get_hls_reply()?;
        let request = ActionRequest::Normal(ActionRequestNormal::new(
            CosemMethod::reply_to_hls(),
            Some(Data::OctetString(reply)),
        ));
        let response = self.exchange(Apdu::ActionRequest(request))?;

        // The connection verified the meter's proof while processing the
        // response; READY means both sides passed.
        if self.connection.state() == DlmsState::Ready {
            Ok(())
        } else {
            Err(Error::LocalProtocol(format!("HLS authentication failed, got {response}")))
        }
    }

    /// Reads one attribute, transparently acknowledging and reassembling
    /// block transfers.
    pub fn get(&mut self, attribute: CosemAttribute) -> Result<Data, Error> {
        self.get_with_selection(attribute, None)
    }

    /// Reads one attribute with a selective-access descriptor, e.g. a time
    /// range of a profile buffer.
    pub fn get_with_selection(
        &mut self,
        attribute: CosemAttribute,
        access_selection: Option<AccessDescriptor>,
    ) -> Result<Data, Error> {
        let request = GetRequest::Normal(GetRequestNormal {
            invoke_id_and_priority: InvokeIdAndPriority::default(),
            cosem_attribute: attribute,
            access_selection,
        });
        let mut response = self.exchange(Apdu::GetRequest(request))?;

        let mut buffer: Vec<u8> = Vec::new();
        loop {
            match response {
                Apdu::GetResponse(GetResponse::Normal(normal)) => {
                    buffer.extend_from_slice(&normal.data);
                    break;
                }
                Apdu::GetResponse(GetResponse::WithBlock(block)) => {
                    debug!("received block {}, requesting the next one", block.block_number);
                    buffer.extend_from_slice(&block.data);
                    let next = GetRequest::Next(GetRequestNext {
                        invoke_id_and_priority: InvokeIdAndPriority::default(),
                        block_number: block.block_number,
                    });
                    response = self.exchange(Apdu::GetRequest(next))?;
                }
                Apdu::GetResponse(GetResponse::LastBlock(block)) => {
                    buffer.extend_from_slice(&block.data);
                    break;
                }
                Apdu::GetResponse(GetResponse::NormalWithError(error)) => {
                    return Err(Error::DataAccess(error.error));
                }
                Apdu::GetResponse(GetResponse::LastBlockWithError(error)) => {
                    return Err(Error::DataAccess(error.error));
                }
                Apdu::ExceptionResponse(exception) => {
                    return Err(Error::Exception {
                        state_error: exception.state_error,
                        service_error: exception.service_error,
                        invocation_counter: exception.invocation_counter_data,
                    });
                }
                other => {
                    return Err(Error::LocalProtocol(format!(
                        "unexpected response to a GET request: {other}"
                    )));
                }
            }
        }

        let (_, value) = Data::parse(&buffer).map_err(map_nom("reassembled get response"))?;
        Ok(value)
    }

    /// Reads several attributes in one request.
    pub fn get_many(
        &mut self,
        attributes: Vec<CosemAttributeWithSelection>,
    ) -> Result<Vec<GetDataResult>, Error> {
        let request = GetRequest::WithList(GetRequestWithList {
            invoke_id_and_priority: InvokeIdAndPriority::default(),
            cosem_attributes: attributes,
        });
        let response = self.exchange(Apdu::GetRequest(request))?;
        match response {
            Apdu::GetResponse(GetResponse::WithList(list)) => Ok(list.results),
            Apdu::ExceptionResponse(exception) => Err(Error::Exception {
                state_error: exception.state_error,
                service_error: exception.service_error,
                invocation_counter: exception.invocation_counter_data,
            }),
            other => Err(Error::LocalProtocol(format!(
                "unexpected response to a GET-with-list request: {other}"
            ))),
        }
    }

    /// Writes one attribute.
    pub fn set(&mut self, attribute: CosemAttribute, value: &Data) -> Result<(), Error> {
        let request = SetRequest::Normal(SetRequestNormal::new(attribute, value));
        let response = self.exchange(Apdu::SetRequest(request))?;
        match response {
            Apdu::SetResponse(SetResponse::Normal(normal)) => {
                if normal.result == DataAccessResult::Success {
                    Ok(())
                } else {
                    Err(Error::DataAccess(normal.result))
                }
            }
            other => Err(Error::LocalProtocol(format!(
                "unexpected response to a SET request: {other}"
            ))),
        }
    }

    /// Invokes a method and returns its optional result data.
    pub fn action(
        &mut self,
        method: CosemMethod,
        parameters: Option<Data>,
    ) -> Result<Option<Data>, Error> {
        let request = ActionRequest::Normal(ActionRequestNormal::new(method, parameters));
        let response = self.exchange(Apdu::ActionRequest(request))?;
        match response {
            Apdu::ActionResponse(response) => {
                if response.status() != ActionResult::Success {
                    return Err(Error::Action(response.status()));
                }
                match response {
                    ActionResponse::Normal(_) => Ok(None),
                    ActionResponse::NormalWithData(with_data) => Ok(Some(with_data.data)),
                    ActionResponse::NormalWithError(with_error) => {
                        Err(Error::DataAccess(with_error.error))
                    }
                }
            }
            other => Err(Error::LocalProtocol(format!(
                "unexpected response to an ACTION request: {other}"
            ))),
        }
    }

    /// Releases the association.
    pub fn release(&mut self) -> Result<(), Error> {
        let rlrq = self.connection.get_rlrq();
        let response = self.exchange(Apdu::Rlrq(rlrq))?;
        match response {
            Apdu::Rlre(_) => Ok(()),
            other => Err(Error::LocalProtocol(format!(
                "unexpected response to a release request: {other}"
            ))),
        }
    }

    /// One request/response round trip through the connection and the
    /// transport.
    fn exchange(&mut self, apdu: Apdu) -> Result<Apdu, Error> {
        let bytes = self.connection.send(apdu)?;
        let response = self.transport.request(&bytes)?;
        self.connection.receive_data(&response);
        match self.connection.next_event()? {
            ConnectionEvent::Apdu(apdu) => Ok(apdu),
            ConnectionEvent::NeedData => Err(Error::Incomplete),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::collections::VecDeque;
    use crate::connection::ConnectionSettings;
    use crate::enumerations::{ServiceException, StateException};
    use crate::obis_code::ObisCode;
    use crate::test_support::hex;

    /// A transport answering every request from a scripted queue.
    struct ScriptedTransport {
        responses: VecDeque<Vec<u8>>,
        sent: Vec<Vec<u8>>,
    }

    impl ScriptedTransport {
        fn new(responses: &[Vec<u8>]) -> Self {
            Self { responses: responses.iter().cloned().collect(), sent: Vec::new() }
        }
    }

    impl Transport for ScriptedTransport {
        fn connect(&mut self) -> Result<(), Error> {
            Ok(())
        }

        fn disconnect(&mut self) -> Result<(), Error> {
            Ok(())
        }

        fn request(&mut self, pdu: &[u8]) -> Result<Vec<u8>, Error> {
            self.sent.push(pdu.to_vec());
            self.responses.pop_front().ok_or(Error::Incomplete)
        }
    }

    fn accepted_aare() -> Vec<u8> {
        hex(
            "6129A109060760857405080101A203020100A305A103020100BE10040E0800065F1F04000050\
             1F01F40007",
        )
    }

    fn client(responses: &[Vec<u8>]) -> DlmsClient<ScriptedTransport> {
        let connection = DlmsConnection::new(ConnectionSettings::default()).unwrap();
        DlmsClient::new(connection, ScriptedTransport::new(responses))
    }

    #[test]
    fn test_associate_and_get() {
        let mut client = client(&[accepted_aare(), hex("C401C1000600001391")]);
        client.connect().unwrap();
        client.associate().unwrap();
        assert_eq!(client.connection().max_pdu_size(), 500);

        let value = client.get(CosemAttribute::invocation_counter()).unwrap();
        assert_eq!(value, Data::DoubleLongUnsigned(5009));
        assert_eq!(client.transport.sent[1], hex("C001C1000100002B0100FF0200"));
    }

    #[test]
    fn test_association_rejected() {
        let rejected = hex(
            "6129A109060760857405080101A203020101A305A103020102BE10040E0800065F1F04000050\
             1F01F40007",
        );
        let mut client = client(&[rejected]);
        assert!(matches!(client.associate(), Err(Error::LocalProtocol(_))));
        assert_eq!(client.connection().state(), DlmsState::NoAssociation);
    }

    #[test]
    fn test_get_reassembles_blocks() {
        // The u32 value 5009 split across two blocks.
        let block_one = {
            let response = GetResponse::WithBlock(crate::get::GetResponseWithBlock {
                invoke_id_and_priority: InvokeIdAndPriority::default(),
                block_number: 1,
                data: hex("0600"),
            });
            Apdu::GetResponse(response).encode()
        };
        let block_two = {
            let response = GetResponse::LastBlock(crate::get::GetResponseLastBlock {
                invoke_id_and_priority: InvokeIdAndPriority::default(),
                block_number: 2,
                data: hex("001391"),
            });
            Apdu::GetResponse(response).encode()
        };

        let mut client = client(&[accepted_aare(), block_one, block_two]);
        client.associate().unwrap();
        let value = client.get(CosemAttribute::invocation_counter()).unwrap();
        assert_eq!(value, Data::DoubleLongUnsigned(5009));

        // The second request was a GET-Next acknowledging block 1.
        assert_eq!(client.transport.sent[2], hex("C002C100000001"));
    }

    #[test]
    fn test_get_surfaces_data_access_error() {
        let mut client = client(&[accepted_aare(), hex("C401C10103")]);
        client.associate().unwrap();
        let result = client.get(CosemAttribute::invocation_counter());
        assert!(matches!(result, Err(Error::DataAccess(DataAccessResult::ReadWriteDenied))));
        // The failed operation leaves the association usable.
        assert_eq!(client.connection().state(), DlmsState::Ready);
    }

    #[test]
    fn test_get_many() {
        let list_response = {
            let response = GetResponse::WithList(crate::get::GetResponseWithList {
                invoke_id_and_priority: InvokeIdAndPriority::default(),
                results: alloc::vec![
                    GetDataResult::Data(Data::DoubleLongUnsigned(5009)),
                    GetDataResult::Error(DataAccessResult::ObjectUndefined),
                ],
            });
            Apdu::GetResponse(response).encode()
        };
        let mut client = client(&[accepted_aare(), list_response]);
        client.associate().unwrap();

        let results = client
            .get_many(alloc::vec![
                CosemAttributeWithSelection {
                    attribute: CosemAttribute::invocation_counter(),
                    access_selection: None,
                },
                CosemAttributeWithSelection {
                    attribute: CosemAttribute::new(8, ObisCode::new(0, 0, 1, 0, 0, 255), 2),
                    access_selection: None,
                },
            ])
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(matches!(results[1], GetDataResult::Error(DataAccessResult::ObjectUndefined)));
    }

    #[test]
    fn test_set_success_and_failure() {
        let mut client = client(&[accepted_aare(), hex("C501C100"), hex("C501C103")]);
        client.associate().unwrap();

        let attribute = CosemAttribute::new(8, ObisCode::new(0, 0, 1, 0, 0, 255), 2);
        client.set(attribute, &Data::Unsigned(1)).unwrap();
        assert!(matches!(
            client.set(attribute, &Data::Unsigned(1)),
            Err(Error::DataAccess(DataAccessResult::ReadWriteDenied))
        ));
    }

    #[test]
    fn test_action_with_data() {
        let action_response = {
            let response = ActionResponse::NormalWithData(crate::action::ActionResponseNormalWithData {
                invoke_id_and_priority: InvokeIdAndPriority::default(),
                status: ActionResult::Success,
                data: Data::Unsigned(1),
            });
            Apdu::ActionResponse(response).encode()
        };
        let mut client = client(&[accepted_aare(), action_response]);
        client.associate().unwrap();

        let result = client
            .action(CosemMethod::new(70, ObisCode::new(0, 0, 96, 3, 10, 255), 1), None)
            .unwrap();
        assert_eq!(result, Some(Data::Unsigned(1)));
    }

    #[test]
    fn test_action_failure() {
        let mut client = client(&[accepted_aare(), hex("C701C10B00")]);
        client.associate().unwrap();
        let result = client.action(CosemMethod::new(70, ObisCode::new(0, 0, 96, 3, 10, 255), 1), None);
        assert!(matches!(result, Err(Error::Action(ActionResult::ObjectUnavailable))));
    }

    #[test]
    fn test_release() {
        let mut client = client(&[accepted_aare(), hex("6303800100")]);
        client.associate().unwrap();
        client.release().unwrap();
        assert_eq!(client.connection().state(), DlmsState::NoAssociation);
    }

    #[test]
    fn test_exception_response_carries_counter() {
        let mut client = client(&[accepted_aare(), hex("D80106 00001391")]);
        client.associate().unwrap();
        match client.get(CosemAttribute::invocation_counter()) {
            Err(Error::Exception { state_error, service_error, invocation_counter }) => {
                assert_eq!(state_error, StateException::ServiceNotAllowed);
                assert_eq!(service_error, ServiceException::InvocationCounterError);
                assert_eq!(invocation_counter, Some(5009));
            }
            other => panic!("expected an exception response, got {other:?}"),
        }
    }
}
