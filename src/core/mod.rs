// src/core/mod.rs

//! The central module containing the routing logic and data structures of the gateway.

pub mod errors;
pub mod events;
pub mod hooks;
pub mod hub;
pub mod ingress;
pub mod metrics;
pub mod protocol;
pub mod pubsub;
pub mod state;
pub mod tasks;
pub mod upstream;

pub use errors::RelayError;
pub use protocol::DispatchCommand;

/// Identifies one client connection for its whole lifetime. Never reused.
pub type ClientId = u64;
