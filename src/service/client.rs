use std::net::SocketAddr;
use std::time::Duration;

use super::types::{methods, EchoRequest, EchoResponse};
use crate::client::RpcClient;
use crate::errors::RpcError;
use crate::task::{RemoteTask, SortTask, TaskEnvelope, TaskOutput};
use crate::RpcConfig;

/// Typed client for the compute service.
pub struct ComputeClient {
    inner: RpcClient,
}

impl ComputeClient {
    /// Connects to the service at the given address.
    pub async fn connect(addr: SocketAddr, config: RpcConfig) -> Result<Self, RpcError> {
        let inner = RpcClient::connect(addr, config).await?;
        Ok(Self { inner })
    }

    pub fn from_rpc_client(inner: RpcClient) -> Self {
        Self { inner }
    }

    pub async fn ping(&self) -> Result<(), RpcError> {
        self.inner.call_typed(methods::PING, &()).await
    }

    /// Echoes `text` back with the `ECHO:` prefix. `None` is rejected by the
    /// server with an argument fault.
    pub async fn echo(&self, text: Option<&str>) -> Result<String, RpcError> {
        let request = EchoRequest {
            text: text.map(str::to_string),
        };
        let response: EchoResponse = self.inner.call_typed(methods::ECHO, &request).await?;
        Ok(response.text)
    }

    /// Runs `task` on the server and returns its typed result.
    pub async fn execute_task<T: RemoteTask>(&self, task: T) -> Result<T::Output, RpcError> {
        let envelope: TaskEnvelope = task.into();
        let kind = envelope.kind();
        let output: TaskOutput = self
            .inner
            .call_typed(methods::EXECUTE_TASK, &envelope)
            .await?;
        T::from_output(output).ok_or_else(|| {
            RpcError::InternalError(format!("server returned a result for another task than `{kind}`"))
        })
    }

    /// Runs a sort on the server and returns how long the sort took, without
    /// shipping the sorted payload back.
    pub async fn time_sort_execution(&self, task: SortTask) -> Result<Duration, RpcError> {
        self.inner
            .call_typed(methods::TIME_SORT_EXECUTION, &task)
            .await
    }

    pub async fn close(&self) {
        self.inner.close().await;
    }
}
