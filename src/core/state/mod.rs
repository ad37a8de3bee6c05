// src/core/state/mod.rs

//! Defines the gateway core, the single owner of all routing state, and the
//! handle other tasks use to reach it.

mod core;
mod handle;

pub use self::core::{CoreSettings, GatewayCore};
pub use self::handle::GatewayHandle;
