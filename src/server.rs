use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::RpcConfig;
use crate::connection::{server_endpoint, QuinnServer, ServerAdapter, StreamAdapter};
use crate::errors::{ComputeError, RpcError};
use crate::request::RpcRequest;
use crate::response::RpcResponse;

type AsyncHandlerFn = Arc<
    dyn Fn(Vec<u8>) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, RpcError>> + Send>>
        + Send
        + Sync,
>;

#[derive(Clone)]
pub struct RpcServer {
    handlers: Arc<RwLock<HashMap<String, AsyncHandlerFn>>>,

    pub socket_addr: Option<SocketAddr>,

    pub config: RpcConfig,
}

impl RpcServer {
    pub fn new(config: RpcConfig) -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
            socket_addr: None,
            config,
        }
    }

    pub async fn register<F, Fut>(&self, method: &str, handler: F)
    where
        F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<u8>, RpcError>> + Send + 'static,
    {
        let mut handlers = self.handlers.write().await;
        handlers.insert(
            method.to_string(),
            Arc::new(move |params: Vec<u8>| {
                Box::pin(handler(params)) as Pin<Box<dyn Future<Output = _> + Send>>
            }),
        );
    }

    /// Registers a handler that works on decoded values. Parameters that do
    /// not decode into `Req` are reported as an argument fault on `params`.
    pub async fn register_typed<Req, Resp, F, Fut>(&self, method: &str, handler: F)
    where
        Req: serde::de::DeserializeOwned + Send + 'static,
        Resp: serde::Serialize + Send + 'static,
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, ComputeError>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let method_name = method.to_string();
        self.register(method, move |params: Vec<u8>| {
            let handler = handler.clone();
            let method_name = method_name.clone();
            async move {
                let request: Req = rmp_serde::from_slice(&params).map_err(|e| {
                    ComputeError::argument(
                        "params",
                        format!("cannot decode {method_name} parameters: {e}"),
                    )
                })?;

                let response = handler(request).await?;

                Ok(rmp_serde::to_vec(&response)?)
            }
        })
        .await;
    }

    pub async fn has_method(&self, method: &str) -> bool {
        self.handlers.read().await.contains_key(method)
    }

    pub fn bind(&mut self) -> Result<quinn::Endpoint, RpcError> {
        let endpoint = server_endpoint(&self.config)?;
        let local_addr = endpoint.local_addr()?;

        self.socket_addr = Some(local_addr);
        info!("RPC server listening on {local_addr}");
        Ok(endpoint)
    }

    pub async fn start(&mut self, endpoint: quinn::Endpoint) -> Result<(), RpcError> {
        let mut adapter = QuinnServer::new(endpoint, self.config.max_frame_length);
        self.start_with_adapter(&mut adapter).await
    }

    pub(crate) async fn start_with_adapter<A>(&mut self, server: &mut A) -> Result<(), RpcError>
    where
        A: ServerAdapter,
    {
        while let Some(mut connection) = server.accept().await {
            let handlers = self.handlers.clone();

            tokio::spawn(async move {
                loop {
                    match connection.accept_bidirectional_stream().await {
                        Ok(Some(stream)) => {
                            tokio::spawn(Self::handle_stream(handlers.clone(), stream));
                        }
                        Ok(None) => {
                            debug!("connection closed by peer");
                            break;
                        }
                        Err(e) => {
                            debug!("connection ended: {e}");
                            break;
                        }
                    }
                }
            });
        }

        Ok(())
    }

    async fn handle_stream(
        handlers: Arc<RwLock<HashMap<String, AsyncHandlerFn>>>,
        mut stream: Box<dyn StreamAdapter>,
    ) {
        let request_data = match stream.receive_frame().await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!("stream closed before a request arrived");
                return;
            }
            Err(e) => {
                debug!("stream error: {e}");
                return;
            }
        };

        let response = Self::dispatch(&handlers, &request_data).await;

        let response_data = match rmp_serde::to_vec(&response) {
            Ok(data) => data,
            Err(e) => {
                warn!(id = response.id(), "failed to encode response: {e}");
                return;
            }
        };

        if let Err(e) = stream.send_frame(Bytes::from(response_data)).await {
            debug!(id = response.id(), "failed to send response: {e}");
            return;
        }
        if let Err(e) = stream.finish() {
            debug!(id = response.id(), "failed to finish stream: {e}");
        }
    }

    async fn dispatch(
        handlers: &RwLock<HashMap<String, AsyncHandlerFn>>,
        request_data: &[u8],
    ) -> RpcResponse {
        let request: RpcRequest = match rmp_serde::from_slice(request_data) {
            Ok(request) => request,
            Err(e) => {
                warn!("malformed request ({} bytes): {e}", request_data.len());
                return RpcResponse::from_result(0, Err(RpcError::DecodeError(e)));
            }
        };

        let id = request.id();
        let method = request.method().to_string();
        debug!(id, method = %method, "dispatching request");

        let handler = handlers.read().await.get(&method).cloned();
        match handler {
            Some(handler) => RpcResponse::from_result(id, handler(request.into_params()).await),
            None => {
                warn!(id, method = %method, "unknown method");
                RpcResponse::from_result(id, Err(RpcError::UnknownMethod(method)))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::connection::ServerConnectionAdapter;
    use crate::response::WireError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio::sync::Mutex;

    pub(crate) struct MockStreamState {
        pub read_plan: VecDeque<Result<Option<Vec<u8>>, RpcError>>,
        pub writes: Vec<Vec<u8>>,
        pub finished: bool,
    }

    impl MockStreamState {
        pub(crate) fn with_frame(frame: Vec<u8>) -> Arc<Mutex<Self>> {
            let mut read_plan = VecDeque::new();
            read_plan.push_back(Ok(Some(frame)));
            Arc::new(Mutex::new(Self {
                read_plan,
                writes: Vec::new(),
                finished: false,
            }))
        }
    }

    #[derive(Clone)]
    pub(crate) struct MockStream {
        pub state: Arc<Mutex<MockStreamState>>,
    }

    #[async_trait]
    impl StreamAdapter for MockStream {
        async fn send_frame(&mut self, data: Bytes) -> Result<(), RpcError> {
            self.state.lock().await.writes.push(data.to_vec());
            Ok(())
        }

        async fn receive_frame(&mut self) -> Result<Option<Bytes>, RpcError> {
            let mut state = self.state.lock().await;
            match state.read_plan.pop_front() {
                Some(Ok(Some(frame))) => Ok(Some(Bytes::from(frame))),
                Some(Ok(None)) | None => Ok(None),
                Some(Err(err)) => Err(err),
            }
        }

        fn finish(&mut self) -> Result<(), RpcError> {
            if let Ok(mut state) = self.state.try_lock() {
                state.finished = true;
            }
            Ok(())
        }
    }

    struct MockServerConnection {
        streams: VecDeque<MockStream>,
    }

    #[async_trait]
    impl ServerConnectionAdapter for MockServerConnection {
        async fn accept_bidirectional_stream(
            &mut self,
        ) -> Result<Option<Box<dyn StreamAdapter>>, RpcError> {
            Ok(self
                .streams
                .pop_front()
                .map(|stream| Box::new(stream) as Box<dyn StreamAdapter>))
        }
    }

    struct MockServerAdapter {
        connections: VecDeque<Box<dyn ServerConnectionAdapter>>,
    }

    #[async_trait]
    impl ServerAdapter for MockServerAdapter {
        async fn accept(&mut self) -> Option<Box<dyn ServerConnectionAdapter>> {
            self.connections.pop_front()
        }
    }

    pub(crate) fn request_frame<T: serde::Serialize>(id: u64, method: &str, params: &T) -> Vec<u8> {
        let params = rmp_serde::to_vec(params).unwrap();
        rmp_serde::to_vec(&RpcRequest::new(id, method.to_string(), params)).unwrap()
    }

    pub(crate) async fn wait_for_response(state: &Arc<Mutex<MockStreamState>>) -> RpcResponse {
        for _ in 0..200 {
            if let Some(frame) = state.lock().await.writes.first() {
                return rmp_serde::from_slice(frame).unwrap();
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("no response was written");
    }

    /// Runs every frame through a server on its own mock stream and
    /// returns the responses in order.
    pub(crate) async fn serve_frames(server: &RpcServer, frames: Vec<Vec<u8>>) -> Vec<RpcResponse> {
        let states: Vec<_> = frames.into_iter().map(MockStreamState::with_frame).collect();
        let connection = MockServerConnection {
            streams: states
                .iter()
                .map(|state| MockStream {
                    state: state.clone(),
                })
                .collect(),
        };
        let mut adapter = MockServerAdapter {
            connections: VecDeque::from(vec![Box::new(connection) as Box<dyn ServerConnectionAdapter>]),
        };

        let mut server = server.clone();
        server.start_with_adapter(&mut adapter).await.unwrap();

        let mut responses = Vec::new();
        for state in &states {
            responses.push(wait_for_response(state).await);
        }
        responses
    }

    /// In-memory client connection that dispatches straight into a server's
    /// handler table.
    pub(crate) struct LoopbackConnection {
        handlers: Arc<RwLock<HashMap<String, AsyncHandlerFn>>>,
    }

    impl LoopbackConnection {
        pub(crate) fn new(server: &RpcServer) -> Self {
            Self {
                handlers: server.handlers.clone(),
            }
        }
    }

    struct LoopbackStream {
        handlers: Arc<RwLock<HashMap<String, AsyncHandlerFn>>>,
        request: Option<Bytes>,
    }

    #[async_trait]
    impl StreamAdapter for LoopbackStream {
        async fn send_frame(&mut self, data: Bytes) -> Result<(), RpcError> {
            self.request = Some(data);
            Ok(())
        }

        async fn receive_frame(&mut self) -> Result<Option<Bytes>, RpcError> {
            let Some(request) = self.request.take() else {
                return Ok(None);
            };
            let response = RpcServer::dispatch(&self.handlers, &request).await;
            Ok(Some(Bytes::from(rmp_serde::to_vec(&response)?)))
        }

        fn finish(&mut self) -> Result<(), RpcError> {
            Ok(())
        }
    }

    #[async_trait]
    impl crate::connection::ConnectionAdapter for LoopbackConnection {
        async fn open_bidirectional_stream(&self) -> Result<Box<dyn StreamAdapter>, RpcError> {
            Ok(Box::new(LoopbackStream {
                handlers: self.handlers.clone(),
                request: None,
            }))
        }

        fn close(&self) {}
    }

    fn config() -> RpcConfig {
        RpcConfig::new("127.0.0.1:0")
    }

    #[tokio::test]
    async fn register_inserts_handler() {
        let server = RpcServer::new(config());
        server.register("raw", |params| async move { Ok(params) }).await;
        assert!(server.has_method("raw").await);
        assert!(!server.has_method("other").await);
    }

    #[tokio::test]
    async fn dispatches_raw_handler() {
        let server = RpcServer::new(config());
        server
            .register("upper", |params: Vec<u8>| async move {
                Ok(params.to_ascii_uppercase())
            })
            .await;

        let frame = rmp_serde::to_vec(&RpcRequest::new(5, "upper".into(), b"abc".to_vec())).unwrap();
        let responses = serve_frames(&server, vec![frame]).await;

        assert_eq!(responses[0].id(), 5);
        assert_eq!(responses[0].result(), Some(&b"ABC".to_vec()));
    }

    #[tokio::test]
    async fn typed_handler_round_trip() {
        let server = RpcServer::new(config());
        server
            .register_typed("double", |n: i64| async move { Ok::<_, ComputeError>(n * 2) })
            .await;

        let responses = serve_frames(&server, vec![request_frame(1, "double", &21i64)]).await;
        let value: i64 = rmp_serde::from_slice(responses[0].result().unwrap()).unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn typed_handler_reports_undecodable_params_as_argument_fault() {
        let server = RpcServer::new(config());
        server
            .register_typed("double", |n: i64| async move { Ok::<_, ComputeError>(n * 2) })
            .await;

        let responses =
            serve_frames(&server, vec![request_frame(1, "double", &"not a number")]).await;
        match responses[0].error() {
            Some(WireError::Fault(fault)) => assert_eq!(fault.argument_name(), Some("params")),
            other => panic!("expected argument fault, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn handler_fault_is_returned_intact() {
        let server = RpcServer::new(config());
        server
            .register_typed("deny", |_: ()| async move {
                Err::<(), _>(ComputeError::auth("session expired"))
            })
            .await;

        let responses = serve_frames(&server, vec![request_frame(3, "deny", &())]).await;
        assert_eq!(
            responses[0].error(),
            Some(&WireError::Fault(ComputeError::auth("session expired")))
        );
    }

    #[tokio::test]
    async fn unknown_method_is_reported() {
        let server = RpcServer::new(config());
        let responses = serve_frames(&server, vec![request_frame(8, "missing", &())]).await;
        assert_eq!(responses[0].id(), 8);
        assert_eq!(
            responses[0].error(),
            Some(&WireError::UnknownMethod("missing".to_string()))
        );
    }

    #[tokio::test]
    async fn malformed_request_gets_internal_error() {
        let server = RpcServer::new(config());
        let responses = serve_frames(&server, vec![vec![0xc1, 0xc1, 0xc1]]).await;
        assert_eq!(responses[0].id(), 0);
        assert!(matches!(responses[0].error(), Some(WireError::Internal(_))));
    }

    #[tokio::test]
    async fn each_stream_gets_its_own_response() {
        let server = RpcServer::new(config());
        server
            .register_typed("inc", |n: i64| async move { Ok::<_, ComputeError>(n + 1) })
            .await;

        let frames = (0..5).map(|i| request_frame(i, "inc", &(i as i64))).collect();
        let responses = serve_frames(&server, frames).await;

        for (i, response) in responses.iter().enumerate() {
            assert_eq!(response.id(), i as u64);
            let value: i64 = rmp_serde::from_slice(response.result().unwrap()).unwrap();
            assert_eq!(value, i as i64 + 1);
        }
    }

    #[tokio::test]
    async fn stream_closed_without_request_writes_nothing() {
        let state = Arc::new(Mutex::new(MockStreamState {
            read_plan: VecDeque::from(vec![Ok(None)]),
            writes: Vec::new(),
            finished: false,
        }));
        let server = RpcServer::new(config());
        RpcServer::handle_stream(
            server.handlers.clone(),
            Box::new(MockStream {
                state: state.clone(),
            }),
        )
        .await;
        assert!(state.lock().await.writes.is_empty());
    }

    #[tokio::test]
    async fn response_stream_is_finished() {
        let server = RpcServer::new(config());
        server.register("raw", |params| async move { Ok(params) }).await;
        let state = MockStreamState::with_frame(request_frame(1, "raw", &()));
        RpcServer::handle_stream(
            server.handlers.clone(),
            Box::new(MockStream {
                state: state.clone(),
            }),
        )
        .await;
        assert!(state.lock().await.finished);
    }
}
