use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::types::{methods, EchoRequest, EchoResponse, ECHO_PREFIX, REGISTRY_NAME, SERVICE_NAME};
use crate::errors::{ComputeError, RpcError};
use crate::server::RpcServer;
use crate::task::{execute_blocking, SortTask, TaskEnvelope, TaskOutput};
use crate::RpcConfig;

/// Server-side operations of the compute service.
#[async_trait]
pub trait ComputeHandler: Send + Sync + 'static {
    async fn ping(&self) -> Result<(), ComputeError>;
    async fn echo(&self, request: EchoRequest) -> Result<EchoResponse, ComputeError>;
    async fn execute_task(&self, task: TaskEnvelope) -> Result<TaskOutput, ComputeError>;
    /// Executes a sort and returns only the time the sort took.
    async fn time_sort_execution(&self, task: SortTask) -> Result<Duration, ComputeError>;
}

/// Stock handler. Tasks run on the blocking pool, one per request, so
/// nothing is shared between concurrent calls.
#[derive(Debug, Default, Clone, Copy)]
pub struct ComputeEngine;

impl ComputeEngine {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ComputeHandler for ComputeEngine {
    async fn ping(&self) -> Result<(), ComputeError> {
        debug!("ping");
        Ok(())
    }

    async fn echo(&self, request: EchoRequest) -> Result<EchoResponse, ComputeError> {
        match request.text {
            Some(text) => Ok(EchoResponse {
                text: format!("{ECHO_PREFIX}{text}"),
            }),
            None => Err(ComputeError::argument("text", "echo text must not be null")),
        }
    }

    async fn execute_task(&self, task: TaskEnvelope) -> Result<TaskOutput, ComputeError> {
        let kind = task.kind();
        info!(kind, "executing task");
        let result = execute_blocking(task).await;
        if let Err(fault) = &result {
            warn!(kind, "task failed: {fault}");
        }
        result
    }

    async fn time_sort_execution(&self, task: SortTask) -> Result<Duration, ComputeError> {
        info!(source = task.source_name(), "timing sort");
        execute_blocking(task.timed()).await
    }
}

/// Wires a [`ComputeHandler`] into an [`RpcServer`].
pub struct ComputeServer<H: ComputeHandler> {
    handler: Arc<H>,
    rpc_server: RpcServer,
}

impl<H: ComputeHandler> ComputeServer<H> {
    pub fn new(handler: H, config: RpcConfig) -> Self {
        Self {
            handler: Arc::new(handler),
            rpc_server: RpcServer::new(config),
        }
    }

    /// Registers all service methods with the RPC server.
    pub async fn register_all(&self) {
        {
            let handler = self.handler.clone();
            self.rpc_server
                .register_typed(methods::PING, move |_: ()| {
                    let handler = handler.clone();
                    async move { handler.ping().await }
                })
                .await;
        }
        {
            let handler = self.handler.clone();
            self.rpc_server
                .register_typed(methods::ECHO, move |request: EchoRequest| {
                    let handler = handler.clone();
                    async move { handler.echo(request).await }
                })
                .await;
        }
        {
            let handler = self.handler.clone();
            self.rpc_server
                .register_typed(methods::EXECUTE_TASK, move |task: TaskEnvelope| {
                    let handler = handler.clone();
                    async move { handler.execute_task(task).await }
                })
                .await;
        }
        {
            let handler = self.handler.clone();
            self.rpc_server
                .register_typed(methods::TIME_SORT_EXECUTION, move |task: SortTask| {
                    let handler = handler.clone();
                    async move { handler.time_sort_execution(task).await }
                })
                .await;
        }
    }

    /// Registers the service and hands back the configured RPC server.
    pub async fn into_rpc_server(self) -> RpcServer {
        self.register_all().await;
        self.rpc_server
    }

    /// Starts the server and begins accepting connections.
    pub async fn serve(self) -> Result<(), RpcError> {
        let mut rpc_server = self.into_rpc_server().await;
        let endpoint = rpc_server.bind()?;
        info!(
            registry = REGISTRY_NAME,
            service = SERVICE_NAME,
            addr = ?rpc_server.socket_addr,
            "compute service published"
        );
        rpc_server.start(endpoint).await
    }
}
