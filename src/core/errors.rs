// src/core/errors.rs

//! Defines the primary error types for the gateway.

use crate::core::ClientId;
use std::sync::Arc;
use thiserror::Error;

/// Failures produced while decoding a dispatch command from an upstream link.
///
/// A `DecodeError` never tears down the link it was read from; the offending
/// line is dropped and the next one is processed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("dispatch command must be a JSON object")]
    NotAnObject,

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("unknown dispatch type '{0}'")]
    UnknownType(String),

    #[error("field 'tags' must be a string or an array of strings")]
    InvalidTags,

    #[error("line is not valid UTF-8")]
    InvalidUtf8,
}

/// The main error enum, representing all possible failures within the gateway.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Dispatch command exceeds the maximum line length")]
    FrameTooLarge,

    /// No upstream link is currently connected. The caller may retry later.
    #[error("NOTREADY no upstream link is connected")]
    NotReady,

    #[error("Client {0} is gone")]
    ClientGone(ClientId),

    #[error("Client {0} is not keeping up with its outbound queue")]
    SlowConsumer(ClientId),

    #[error("Failed to connect to {address}: {reason}")]
    ConnectFailed { address: String, reason: String },

    #[error("Gateway core is not running")]
    GatewayStopped,
}

// Manual implementation of Clone because `std::io::Error` is not cloneable.
impl Clone for RelayError {
    fn clone(&self) -> Self {
        match self {
            RelayError::Io(e) => RelayError::Io(Arc::clone(e)),
            RelayError::FrameTooLarge => RelayError::FrameTooLarge,
            RelayError::NotReady => RelayError::NotReady,
            RelayError::ClientGone(id) => RelayError::ClientGone(*id),
            RelayError::SlowConsumer(id) => RelayError::SlowConsumer(*id),
            RelayError::ConnectFailed { address, reason } => RelayError::ConnectFailed {
                address: address.clone(),
                reason: reason.clone(),
            },
            RelayError::GatewayStopped => RelayError::GatewayStopped,
        }
    }
}

impl PartialEq for RelayError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RelayError::Io(e1), RelayError::Io(e2)) => e1.kind() == e2.kind(),
            (RelayError::ClientGone(a), RelayError::ClientGone(b)) => a == b,
            (RelayError::SlowConsumer(a), RelayError::SlowConsumer(b)) => a == b,
            (
                RelayError::ConnectFailed {
                    address: a1,
                    reason: r1,
                },
                RelayError::ConnectFailed {
                    address: a2,
                    reason: r2,
                },
            ) => a1 == a2 && r1 == r2,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for RelayError {
    fn from(e: std::io::Error) -> Self {
        RelayError::Io(Arc::new(e))
    }
}

impl From<tokio_util::codec::LinesCodecError> for RelayError {
    fn from(e: tokio_util::codec::LinesCodecError) -> Self {
        match e {
            tokio_util::codec::LinesCodecError::MaxLineLengthExceeded => RelayError::FrameTooLarge,
            tokio_util::codec::LinesCodecError::Io(io) => RelayError::from(io),
        }
    }
}
