//! Async adaptor targeting the same sans-I/O core (tokio, TCP + IP
//! wrapper).
//!
//! Only the byte-moving edge is async; the protocol state machines are the
//! exact same types the blocking adaptor drives. HDLC stays on the
//! blocking side, matching its serial-line habitat.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::time::Duration;

use log::debug;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::action::{ActionRequest, ActionRequestNormal, ActionResponse};
use crate::apdu::Apdu;
use crate::connection::{ConnectionEvent, DlmsConnection};
use crate::cosem::{CosemAttribute, CosemMethod};
use crate::data::Data;
use crate::enumerations::{ActionResult, DataAccessResult};
use crate::error::{Error, map_nom};
use crate::get::{GetRequest, GetRequestNext, GetRequestNormal, GetResponse};
use crate::invoke_id::InvokeIdAndPriority;
use crate::selective_access::AccessDescriptor;
use crate::set::{SetRequest, SetRequestNormal, SetResponse};
use crate::state::DlmsState;
use crate::wrapper::WrapperHeader;

/// Async byte-moving collaborator, the [`crate::io::Io`] contract with
/// async methods.
pub trait AsyncIo {
    fn connect(&mut self) -> impl Future<Output = Result<(), Error>>;
    fn disconnect(&mut self) -> impl Future<Output = Result<(), Error>>;
    fn send(&mut self, data: &[u8]) -> impl Future<Output = Result<(), Error>>;
    fn recv(&mut self, amount: usize) -> impl Future<Output = Result<Vec<u8>, Error>>;
}

/// Async TCP I/O on tokio.
pub struct AsyncTcpIo {
    host: String,
    port: u16,
    timeout: Duration,
    stream: Option<TcpStream>,
}

impl AsyncTcpIo {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port, timeout: Duration::from_secs(10), stream: None }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn stream(&mut self) -> Result<&mut TcpStream, Error> {
        self.stream
            .as_mut()
            .ok_or_else(|| Error::LocalProtocol(format!("TCP transport not connected")))
    }
}

impl AsyncIo for AsyncTcpIo {
    async fn connect(&mut self) -> Result<(), Error> {
        if self.stream.is_some() {
            return Err(Error::LocalProtocol(format!(
                "there is already an active socket to {}:{}",
                self.host, self.port
            )));
        }
        let connect = TcpStream::connect((self.host.as_str(), self.port));
        let stream = tokio::time::timeout(self.timeout, connect)
            .await
            .map_err(|_| Error::LocalProtocol(format!("connect timed out")))??;
        debug!("connected to {}:{}", self.host, self.port);
        self.stream = Some(stream);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), Error> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
            debug!("connection to {}:{} is closed", self.host, self.port);
        }
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<(), Error> {
        self.stream()?.write_all(data).await?;
        Ok(())
    }

    async fn recv(&mut self, amount: usize) -> Result<Vec<u8>, Error> {
        let timeout = self.timeout;
        let stream = self.stream()?;
        let mut data = alloc::vec![0u8; amount];
        tokio::time::timeout(timeout, stream.read_exact(&mut data))
            .await
            .map_err(|_| Error::LocalProtocol(format!("receive timed out")))??;
        Ok(data)
    }
}

/// The IP wrapper link over an [`AsyncIo`].
pub struct AsyncWrapperLink<I: AsyncIo> {
    io: I,
    source_wport: u16,
    destination_wport: u16,
}

impl<I: AsyncIo> AsyncWrapperLink<I> {
    pub fn new(io: I, source_wport: u16, destination_wport: u16) -> Self {
        Self { io, source_wport, destination_wport }
    }

    pub async fn connect(&mut self) -> Result<(), Error> {
        self.io.connect().await
    }

    pub async fn disconnect(&mut self) -> Result<(), Error> {
        self.io.disconnect().await
    }

    pub async fn request(&mut self, pdu: &[u8]) -> Result<Vec<u8>, Error> {
        self.io
            .send(&WrapperHeader::wrap(self.source_wport, self.destination_wport, pdu))
            .await?;

        let header_bytes = self.io.recv(WrapperHeader::LENGTH).await?;
        let (_, header) =
            WrapperHeader::parse(&header_bytes).map_err(map_nom("wrapper header"))?;
        self.io.recv(header.length as usize).await
    }
}

/// Async DLMS client over the IP wrapper, mirroring
/// [`crate::client::DlmsClient`].
pub struct AsyncDlmsClient<I: AsyncIo> {
    connection: DlmsConnection,
    link: AsyncWrapperLink<I>,
}

impl<I: AsyncIo> AsyncDlmsClient<I> {
    pub fn new(connection: DlmsConnection, link: AsyncWrapperLink<I>) -> Self {
        Self { connection, link }
    }

    pub fn connection(&self) -> &DlmsConnection {
        &self.connection
    }

    pub async fn connect(&mut self) -> Result<(), Error> {
        self.link.connect().await
    }

    pub async fn disconnect(&mut self) -> Result<(), Error> {
        self.link.disconnect().await
    }

    pub async fn associate(&mut self) -> Result<(), Error> {
        let aarq = self.connection.get_aarq()?;
        let aare = match self.exchange(Apdu::Aarq(aarq)).await? {
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
            let reply = self.connection.get_hls_reply()?;
            let request = ActionRequest::Normal(ActionRequestNormal::new(
                CosemMethod::reply_to_hls(),
                Some(Data::OctetString(reply)),
            ));
            let response = self.exchange(Apdu::ActionRequest(request)).await?;
            if self.connection.state() != DlmsState::Ready {
                return Err(Error::LocalProtocol(format!(
                    "HLS authentication failed, got {response}"
                )));
            }
        }
        Ok(())
    }

    pub async fn get(&mut self, attribute: CosemAttribute) -> Result<Data, Error> {
        self.get_with_selection(attribute, None).await
    }

    pub async fn get_with_selection(
        &mut self,
        attribute: CosemAttribute,
        access_selection: Option<AccessDescriptor>,
    ) -> Result<Data, Error> {
        let request = GetRequest::Normal(GetRequestNormal {
            invoke_id_and_priority: InvokeIdAndPriority::default(),
            cosem_attribute: attribute,
            access_selection,
        });
        let mut response = self.exchange(Apdu::GetRequest(request)).await?;

        let mut buffer: Vec<u8> = Vec::new();
        loop {
            match response {
                Apdu::GetResponse(GetResponse::Normal(normal)) => {
                    buffer.extend_from_slice(&normal.data);
                    break;
                }
                Apdu::GetResponse(GetResponse::WithBlock(block)) => {
                    buffer.extend_from_slice(&block.data);
                    let next = GetRequest::Next(GetRequestNext {
                        invoke_id_and_priority: InvokeIdAndPriority::default(),
                        block_number: block.block_number,
                    });
                    response = self.exchange(Apdu::GetRequest(next)).await?;
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

    pub async fn set(&mut self, attribute: CosemAttribute, value: &Data) -> Result<(), Error> {
        let request = SetRequest::Normal(SetRequestNormal::new(attribute, value));
        let response = self.exchange(Apdu::SetRequest(request)).await?;
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

    pub async fn action(
        &mut self,
        method: CosemMethod,
        parameters: Option<Data>,
    ) -> Result<Option<Data>, Error> {
        let request = ActionRequest::Normal(ActionRequestNormal::new(method, parameters));
        let response = self.exchange(Apdu::ActionRequest(request)).await?;
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

    pub async fn release(&mut self) -> Result<(), Error> {
        let rlrq = self.connection.get_rlrq();
        let response = self.exchange(Apdu::Rlrq(rlrq)).await?;
        match response {
            Apdu::Rlre(_) => Ok(()),
            other => Err(Error::LocalProtocol(format!(
                "unexpected response to a release request: {other}"
            ))),
        }
    }

    async fn exchange(&mut self, apdu: Apdu) -> Result<Apdu, Error> {
        let bytes = self.connection.send(apdu)?;
        let response = self.link.request(&bytes).await?;
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
    use crate::connection::ConnectionSettings;
    use crate::test_support::hex;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    /// A one-shot meter: accepts one connection, answers each wrapped
    /// request from a script.
    async fn scripted_meter(responses: Vec<Vec<u8>>) -> (u16, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            for response in responses {
                // Read the wrapper header, then the request body.
                let mut header = [0u8; 8];
                socket.read_exact(&mut header).await.unwrap();
                let length = u16::from_be_bytes([header[6], header[7]]) as usize;
                let mut body = alloc::vec![0u8; length];
                socket.read_exact(&mut body).await.unwrap();

                let wrapped = WrapperHeader::wrap(1, 16, &response);
                socket.write_all(&wrapped).await.unwrap();
            }
        });
        (port, handle)
    }

    fn accepted_aare() -> Vec<u8> {
        hex(
            "6129A109060760857405080101A203020100A305A103020100BE10040E0800065F1F04000050\
             1F01F40007",
        )
    }

    #[tokio::test]
    async fn test_async_associate_and_get() {
        let (port, meter) =
            scripted_meter(alloc::vec![accepted_aare(), hex("C401C1000600001391")]).await;

        let connection = DlmsConnection::new(ConnectionSettings::default()).unwrap();
        let link = AsyncWrapperLink::new(AsyncTcpIo::new("127.0.0.1", port), 16, 1);
        let mut client = AsyncDlmsClient::new(connection, link);

        client.connect().await.unwrap();
        client.associate().await.unwrap();
        assert_eq!(client.connection().max_pdu_size(), 500);

        let value = client.get(CosemAttribute::invocation_counter()).await.unwrap();
        assert_eq!(value, Data::DoubleLongUnsigned(5009));

        client.disconnect().await.unwrap();
        meter.await.unwrap();
    }

    #[tokio::test]
    async fn test_async_get_error_result() {
        let (port, meter) = scripted_meter(alloc::vec![accepted_aare(), hex("C401C10103")]).await;

        let connection = DlmsConnection::new(ConnectionSettings::default()).unwrap();
        let link = AsyncWrapperLink::new(AsyncTcpIo::new("127.0.0.1", port), 16, 1);
        let mut client = AsyncDlmsClient::new(connection, link);

        client.connect().await.unwrap();
        client.associate().await.unwrap();
        let result = client.get(CosemAttribute::invocation_counter()).await;
        assert!(matches!(
            result,
            Err(Error::DataAccess(DataAccessResult::ReadWriteDenied))
        ));

        client.disconnect().await.unwrap();
        meter.await.unwrap();
    }
}
