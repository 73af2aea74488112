//! QUIC plumbing. Every call owns one bidirectional stream; each direction
//! carries a single length-delimited frame and is finished after it.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use quinn::{ConnectionError, RecvStream, SendStream};
use rustls::pki_types::CertificateDer;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use tracing::{debug, warn};

use crate::config::RpcConfig;
use crate::errors::RpcError;

#[async_trait]
pub(crate) trait StreamAdapter: Send {
    async fn send_frame(&mut self, data: Bytes) -> Result<(), RpcError>;
    async fn receive_frame(&mut self) -> Result<Option<Bytes>, RpcError>;
    fn finish(&mut self) -> Result<(), RpcError>;
}

#[async_trait]
impl<T> StreamAdapter for Box<T>
where
    T: StreamAdapter + ?Sized,
{
    async fn send_frame(&mut self, data: Bytes) -> Result<(), RpcError> {
        (**self).send_frame(data).await
    }

    async fn receive_frame(&mut self) -> Result<Option<Bytes>, RpcError> {
        (**self).receive_frame().await
    }

    fn finish(&mut self) -> Result<(), RpcError> {
        (**self).finish()
    }
}

pub(crate) struct QuinnStream {
    writer: FramedWrite<SendStream, LengthDelimitedCodec>,
    reader: FramedRead<RecvStream, LengthDelimitedCodec>,
}

impl QuinnStream {
    fn new(send: SendStream, recv: RecvStream, max_frame_length: usize) -> Self {
        Self {
            writer: FramedWrite::new(send, frame_codec(max_frame_length)),
            reader: FramedRead::new(recv, frame_codec(max_frame_length)),
        }
    }
}

fn frame_codec(max_frame_length: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(max_frame_length)
        .new_codec()
}

#[async_trait]
impl StreamAdapter for QuinnStream {
    async fn send_frame(&mut self, data: Bytes) -> Result<(), RpcError> {
        self.writer
            .send(data)
            .await
            .map_err(|err| RpcError::StreamError(err.to_string()))
    }

    async fn receive_frame(&mut self) -> Result<Option<Bytes>, RpcError> {
        match self.reader.next().await {
            Some(Ok(frame)) => Ok(Some(frame.freeze())),
            Some(Err(err)) => Err(RpcError::StreamError(err.to_string())),
            None => Ok(None),
        }
    }

    fn finish(&mut self) -> Result<(), RpcError> {
        self.writer
            .get_mut()
            .finish()
            .map_err(|err| RpcError::StreamError(err.to_string()))
    }
}

/// Client side of a connection.
#[async_trait]
pub(crate) trait ConnectionAdapter: Send + Sync {
    async fn open_bidirectional_stream(&self) -> Result<Box<dyn StreamAdapter>, RpcError>;
    fn close(&self);
}

pub(crate) struct QuinnConnection {
    inner: quinn::Connection,
    max_frame_length: usize,
}

impl QuinnConnection {
    pub(crate) fn new(inner: quinn::Connection, max_frame_length: usize) -> Self {
        Self {
            inner,
            max_frame_length,
        }
    }
}

#[async_trait]
impl ConnectionAdapter for QuinnConnection {
    async fn open_bidirectional_stream(&self) -> Result<Box<dyn StreamAdapter>, RpcError> {
        let (send, recv) = self
            .inner
            .open_bi()
            .await
            .map_err(|e| RpcError::ConnectionError(e.to_string()))?;
        Ok(Box::new(QuinnStream::new(send, recv, self.max_frame_length)))
    }

    fn close(&self) {
        self.inner.close(quinn::VarInt::from_u32(0), b"client closed");
    }
}

/// Server side of a connection.
#[async_trait]
pub(crate) trait ServerConnectionAdapter: Send {
    async fn accept_bidirectional_stream(
        &mut self,
    ) -> Result<Option<Box<dyn StreamAdapter>>, RpcError>;
}

/// Handshake is completed lazily so the accept loop never waits on a slow peer.
pub(crate) struct QuinnServerConnection {
    incoming: Option<quinn::Incoming>,
    connection: Option<quinn::Connection>,
    max_frame_length: usize,
}

#[async_trait]
impl ServerConnectionAdapter for QuinnServerConnection {
    async fn accept_bidirectional_stream(
        &mut self,
    ) -> Result<Option<Box<dyn StreamAdapter>>, RpcError> {
        if let Some(incoming) = self.incoming.take() {
            let connection = incoming
                .await
                .map_err(|e| RpcError::ConnectionError(e.to_string()))?;
            debug!(remote = %connection.remote_address(), "connection established");
            self.connection = Some(connection);
        }

        let Some(connection) = self.connection.as_ref() else {
            return Ok(None);
        };

        match connection.accept_bi().await {
            Ok((send, recv)) => Ok(Some(Box::new(QuinnStream::new(
                send,
                recv,
                self.max_frame_length,
            )))),
            Err(ConnectionError::ApplicationClosed(_)) | Err(ConnectionError::LocallyClosed) => {
                Ok(None)
            }
            Err(e) => Err(RpcError::ConnectionError(e.to_string())),
        }
    }
}

#[async_trait]
pub(crate) trait ServerAdapter: Send {
    async fn accept(&mut self) -> Option<Box<dyn ServerConnectionAdapter>>;
}

pub(crate) struct QuinnServer {
    endpoint: quinn::Endpoint,
    max_frame_length: usize,
}

impl QuinnServer {
    pub(crate) fn new(endpoint: quinn::Endpoint, max_frame_length: usize) -> Self {
        Self {
            endpoint,
            max_frame_length,
        }
    }
}

#[async_trait]
impl ServerAdapter for QuinnServer {
    async fn accept(&mut self) -> Option<Box<dyn ServerConnectionAdapter>> {
        let incoming = self.endpoint.accept().await?;
        Some(Box::new(QuinnServerConnection {
            incoming: Some(incoming),
            connection: None,
            max_frame_length: self.max_frame_length,
        }))
    }
}

fn transport_config(config: &RpcConfig) -> Arc<quinn::TransportConfig> {
    let mut transport = quinn::TransportConfig::default();
    transport.keep_alive_interval(config.keep_alive_interval);
    Arc::new(transport)
}

fn parse_addr(raw: &str) -> Result<SocketAddr, RpcError> {
    raw.parse()
        .map_err(|e| RpcError::ConfigError(format!("Invalid bind address {raw}: {e}")))
}

pub(crate) fn server_endpoint(config: &RpcConfig) -> Result<quinn::Endpoint, RpcError> {
    let identity = config
        .identity
        .as_ref()
        .ok_or_else(|| RpcError::ConfigError("Server identity not configured".to_string()))?;

    let mut server_config =
        quinn::ServerConfig::with_single_cert(identity.cert_chain(), identity.private_key())
            .map_err(|e| RpcError::TlsError(e.to_string()))?;
    server_config.transport_config(transport_config(config));

    let endpoint = quinn::Endpoint::server(server_config, parse_addr(&config.bind_address)?)?;
    Ok(endpoint)
}

pub(crate) fn client_endpoint(config: &RpcConfig) -> Result<quinn::Endpoint, RpcError> {
    let mut roots = rustls::RootCertStore::empty();
    for der in &config.trusted_certificates {
        if let Err(e) = roots.add(CertificateDer::from(der.clone())) {
            warn!("ignoring unusable trusted certificate: {e}");
        }
    }
    if roots.is_empty() {
        return Err(RpcError::ConfigError(
            "No trusted certificates configured".to_string(),
        ));
    }

    let mut client_config = quinn::ClientConfig::with_root_certificates(Arc::new(roots))
        .map_err(|e| RpcError::TlsError(e.to_string()))?;
    client_config.transport_config(transport_config(config));

    let mut endpoint = quinn::Endpoint::client(parse_addr(&config.bind_address)?)?;
    endpoint.set_default_client_config(client_config);
    Ok(endpoint)
}
