use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::config::RpcConfig;
use crate::connection::{client_endpoint, ConnectionAdapter, QuinnConnection};
use crate::errors::RpcError;
use crate::request::RpcRequest;
use crate::response::RpcResponse;

pub struct RpcClient {
    connection: Arc<dyn ConnectionAdapter>,
    endpoint: Option<quinn::Endpoint>,
    config: RpcConfig,
    pub next_id: Arc<AtomicU64>,
}

impl RpcClient {
    pub async fn connect(connect_addr: SocketAddr, config: RpcConfig) -> Result<Self, RpcError> {
        let endpoint = client_endpoint(&config)?;

        let connection = endpoint
            .connect(connect_addr, &config.server_name)
            .map_err(|e| RpcError::ConnectionError(e.to_string()))?
            .await
            .map_err(|e| RpcError::ConnectionError(e.to_string()))?;
        debug!(remote = %connect_addr, "connected");

        Ok(Self {
            connection: Arc::new(QuinnConnection::new(connection, config.max_frame_length)),
            endpoint: Some(endpoint),
            config,
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_connection(connection: Arc<dyn ConnectionAdapter>) -> Self {
        Self {
            connection,
            endpoint: None,
            config: RpcConfig::new("127.0.0.1:0"),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    pub async fn call(&self, method: &str, params: Vec<u8>) -> Result<Vec<u8>, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let req = RpcRequest::new(id, method.to_string(), params);
        let req_data = rmp_serde::to_vec(&req)?;

        let mut stream = self.connection.open_bidirectional_stream().await?;
        stream.send_frame(Bytes::from(req_data)).await?;
        stream.finish()?;

        let read_future = async {
            let frame = stream.receive_frame().await?.ok_or_else(|| {
                RpcError::ConnectionError("Stream closed unexpectedly".into())
            })?;
            let response: RpcResponse = rmp_serde::from_slice(&frame)?;
            if response.id() != id {
                return Err(RpcError::StreamError(format!(
                    "Response id {} does not match request id {}",
                    response.id(),
                    id
                )));
            }
            response.into_result()
        };

        match tokio::time::timeout(self.config.request_timeout, read_future).await {
            Ok(res) => res,
            Err(_) => Err(RpcError::Timeout),
        }
    }

    pub async fn call_typed<Req, Resp>(&self, method: &str, request: &Req) -> Result<Resp, RpcError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let params = rmp_serde::to_vec(request)?;
        let response_data = self.call(method, params).await?;
        Ok(rmp_serde::from_slice(&response_data)?)
    }

    /// Closes the connection and waits for the endpoint to flush.
    pub async fn close(&self) {
        self.connection.close();
        if let Some(endpoint) = &self.endpoint {
            endpoint.wait_idle().await;
        }
    }
}
