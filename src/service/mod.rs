//! The compute service: liveness, echo and remote task execution.

pub mod client;
pub mod server;
pub mod types;

pub use client::ComputeClient;
pub use server::{ComputeEngine, ComputeHandler, ComputeServer};
pub use types::*;
