use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Transport and communication failures, plus faults raised by the remote
/// service and carried back over the wire.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Stream error: {0}")]
    StreamError(String),

    #[error("TLS error: {0}")]
    TlsError(String),

    #[error("Encode error: {0}")]
    EncodeError(#[from] rmp_serde::encode::Error),

    #[error("Decode error: {0}")]
    DecodeError(#[from] rmp_serde::decode::Error),

    #[error("Request timeout")]
    Timeout,

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Remote fault: {0}")]
    Fault(#[from] ComputeError),
}

impl RpcError {
    /// Returns the application fault if this error came from the service
    /// rather than from the transport.
    pub fn fault(&self) -> Option<&ComputeError> {
        match self {
            RpcError::Fault(fault) => Some(fault),
            _ => None,
        }
    }

    pub fn is_fault(&self) -> bool {
        self.fault().is_some()
    }
}

/// Fault kinds a compute service reports to its callers.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ComputeError {
    /// Unexpected failure while serving a request.
    #[error("server fault: {message}")]
    Server {
        message: String,
        cause: Option<String>,
    },

    /// A caller-supplied argument failed validation.
    #[error("invalid argument `{argument}`: {message}")]
    Argument { argument: String, message: String },

    /// Credential or session rejection.
    #[error("authentication failed: {message}")]
    Auth { message: String },
}

impl ComputeError {
    pub fn server(message: impl Into<String>) -> Self {
        ComputeError::Server {
            message: message.into(),
            cause: None,
        }
    }

    pub fn server_with_cause(message: impl Into<String>, cause: impl fmt::Display) -> Self {
        ComputeError::Server {
            message: message.into(),
            cause: Some(cause.to_string()),
        }
    }

    pub fn argument(argument: impl Into<String>, message: impl Into<String>) -> Self {
        ComputeError::Argument {
            argument: argument.into(),
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        ComputeError::Auth {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ComputeError::Server { message, .. }
            | ComputeError::Argument { message, .. }
            | ComputeError::Auth { message } => message,
        }
    }

    /// Name of the argument that did not pass validation.
    pub fn argument_name(&self) -> Option<&str> {
        match self {
            ComputeError::Argument { argument, .. } => Some(argument),
            _ => None,
        }
    }

    pub fn cause(&self) -> Option<&str> {
        match self {
            ComputeError::Server { cause, .. } => cause.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argument_fault_exposes_name_and_message() {
        let fault = ComputeError::argument("text", "must not be null");
        assert_eq!(fault.argument_name(), Some("text"));
        assert_eq!(fault.message(), "must not be null");
        assert_eq!(fault.to_string(), "invalid argument `text`: must not be null");
    }

    #[test]
    fn server_fault_keeps_cause() {
        let fault = ComputeError::server_with_cause("task panicked", "index out of bounds");
        assert_eq!(fault.cause(), Some("index out of bounds"));
        assert_eq!(fault.argument_name(), None);
    }

    #[test]
    fn faults_survive_msgpack_round_trip() {
        let faults = vec![
            ComputeError::server_with_cause("boom", "disk full"),
            ComputeError::argument("input_payload", "bad token"),
            ComputeError::auth("session expired"),
        ];
        for fault in faults {
            let bytes = rmp_serde::to_vec(&fault).unwrap();
            let decoded: ComputeError = rmp_serde::from_slice(&bytes).unwrap();
            assert_eq!(decoded, fault);
        }
    }

    #[test]
    fn rpc_error_distinguishes_faults_from_transport() {
        let fault: RpcError = ComputeError::auth("nope").into();
        assert!(fault.is_fault());
        assert_eq!(fault.to_string(), "Remote fault: authentication failed: nope");

        let transport = RpcError::ConnectionError("reset".into());
        assert!(!transport.is_fault());
    }
}
