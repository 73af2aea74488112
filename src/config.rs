use std::time::Duration;

use crate::tls::Identity;
use crate::DEFAULT_TIMEOUT;

/// Largest frame either side accepts unless configured otherwise.
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct RpcConfig {
    pub bind_address: String,

    pub server_name: String,

    pub keep_alive_interval: Option<Duration>,

    pub request_timeout: Duration,

    pub max_frame_length: usize,

    pub identity: Option<Identity>,

    pub trusted_certificates: Vec<Vec<u8>>,
}

impl RpcConfig {
    pub fn new(bind_address: impl Into<String>) -> Self {
        Self {
            bind_address: bind_address.into(),
            server_name: "localhost".to_string(),
            keep_alive_interval: Some(Duration::from_secs(30)),
            request_timeout: DEFAULT_TIMEOUT,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            identity: None,
            trusted_certificates: Vec::new(),
        }
    }

    pub fn with_server_name(mut self, server_name: impl Into<String>) -> Self {
        self.server_name = server_name.into();
        self
    }

    pub fn with_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = Some(interval);
        self
    }

    pub fn without_keep_alive(mut self) -> Self {
        self.keep_alive_interval = None;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_frame_length(mut self, len: usize) -> Self {
        self.max_frame_length = len;
        self
    }

    /// Certificate and key the server presents.
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Adds a DER certificate the client accepts as a root of trust.
    pub fn with_trusted_certificate(mut self, cert_der: impl Into<Vec<u8>>) -> Self {
        self.trusted_certificates.push(cert_der.into());
        self
    }
}
