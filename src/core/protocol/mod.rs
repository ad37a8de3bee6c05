// src/core/protocol/mod.rs

//! Wire formats spoken on upstream links.

pub mod codec;
pub mod dispatch;
pub use codec::{DEFAULT_MAX_LINE_LENGTH, DispatchCodec};
pub use dispatch::{DispatchCommand, Payload};
