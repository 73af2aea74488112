//! Remote task execution over QUIC.
//!
//! A client hands a [`task::Task`] to a [`service::ComputeServer`], which runs
//! it and sends back either the typed result or a [`ComputeError`]. The
//! transport pieces ([`RpcServer`], [`RpcClient`]) are generic over method
//! names and byte payloads; the compute service sits on top of them.

use std::time::Duration;

pub mod client;
pub mod config;
pub(crate) mod connection;
pub mod errors;
pub mod request;
pub mod response;
pub mod runtime;
pub mod server;
pub mod service;
pub mod task;
pub mod tls;

pub use client::RpcClient;
pub use config::RpcConfig;
pub use errors::{ComputeError, RpcError};
pub use request::RpcRequest;
pub use response::{RpcResponse, WireError};
pub use server::RpcServer;
pub use service::{ComputeClient, ComputeEngine, ComputeHandler, ComputeServer};
pub use task::{
    AddTask, RemoteTask, SortTask, SortedPayload, Task, TaskEnvelope, TaskOutput, TimedSort,
};
pub use tls::Identity;

#[cfg(not(test))]
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[cfg(test)]
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);
