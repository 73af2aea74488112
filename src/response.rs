use serde::{Deserialize, Serialize};

use crate::errors::{ComputeError, RpcError};

/// Error half of a response. Application faults keep their structure;
/// everything else is flattened to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireError {
    Fault(ComputeError),
    UnknownMethod(String),
    Internal(String),
}

impl From<RpcError> for WireError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Fault(fault) => WireError::Fault(fault),
            RpcError::UnknownMethod(method) => WireError::UnknownMethod(method),
            other => WireError::Internal(other.to_string()),
        }
    }
}

impl From<WireError> for RpcError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::Fault(fault) => RpcError::Fault(fault),
            WireError::UnknownMethod(method) => RpcError::UnknownMethod(method),
            WireError::Internal(message) => RpcError::InternalError(message),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RpcResponse {
    id: u64,
    result: Option<Vec<u8>>,
    error: Option<WireError>,
}

impl RpcResponse {
    pub fn new(id: u64, result: Option<Vec<u8>>, error: Option<WireError>) -> Self {
        Self { id, result, error }
    }

    pub fn from_result(id: u64, result: Result<Vec<u8>, RpcError>) -> Self {
        match result {
            Ok(data) => Self::new(id, Some(data), None),
            Err(e) => Self::new(id, None, Some(e.into())),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn result(&self) -> Option<&Vec<u8>> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&WireError> {
        self.error.as_ref()
    }

    pub fn into_result(self) -> Result<Vec<u8>, RpcError> {
        match (self.result, self.error) {
            (Some(data), None) => Ok(data),
            (None, Some(err)) => Err(err.into()),
            _ => Err(RpcError::StreamError("Invalid response".into())),
        }
    }
}
