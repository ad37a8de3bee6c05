// src/core/upstream/connector.rs

//! The connector capability used to open upstream links.

use crate::core::errors::{DecodeError, RelayError};
use crate::core::protocol::{DispatchCodec, DispatchCommand};
use async_trait::async_trait;
use futures::{Sink, Stream, StreamExt};
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::debug;

pub type CommandSink = Pin<Box<dyn Sink<DispatchCommand, Error = RelayError> + Send>>;

/// Yields one item per line. The inner `Result` carries per-command decode
/// failures; the outer one carries failures that end the link.
pub type CommandStream =
    Pin<Box<dyn Stream<Item = Result<Result<DispatchCommand, DecodeError>, RelayError>> + Send>>;

/// Both halves of an established link.
pub struct LinkTransport {
    pub sink: CommandSink,
    pub stream: CommandStream,
}

impl LinkTransport {
    /// Frames any byte stream with the dispatch codec.
    pub fn framed<T>(io: T, codec: DispatchCodec) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (sink, stream) = Framed::new(io, codec).split::<DispatchCommand>();
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }
}

impl std::fmt::Debug for LinkTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkTransport").finish_non_exhaustive()
    }
}

/// Opens a connection to a backend worker.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, address: &str) -> Result<LinkTransport, RelayError>;
}

/// Connects over plain TCP, one JSON command per line.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    max_line_length: usize,
}

impl TcpConnector {
    pub fn new(max_line_length: usize) -> Self {
        Self { max_line_length }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, address: &str) -> Result<LinkTransport, RelayError> {
        let stream =
            TcpStream::connect(address)
                .await
                .map_err(|e| RelayError::ConnectFailed {
                    address: address.to_string(),
                    reason: e.to_string(),
                })?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY on link to {}: {}", address, e);
        }
        Ok(LinkTransport::framed(
            stream,
            DispatchCodec::new(self.max_line_length),
        ))
    }
}
