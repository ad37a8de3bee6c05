// src/core/protocol/codec.rs

//! A newline-delimited `Encoder`/`Decoder` for dispatch commands.

use super::dispatch::DispatchCommand;
use crate::core::errors::{DecodeError, RelayError};
use bytes::BytesMut;
use std::io;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

/// Upper bound on a single encoded command, guarding against unbounded buffering.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Frames dispatch commands as one JSON object per line.
///
/// Decoding yields `Ok(Err(DecodeError))` for a well-framed but malformed line,
/// including one that is not valid UTF-8, so a link can drop the bad command
/// and keep reading. Oversized lines and I/O failures are returned as
/// `Err(RelayError)` and end the link.
#[derive(Debug, Clone)]
pub struct DispatchCodec {
    lines: LinesCodec,
}

impl DispatchCodec {
    pub fn new(max_line_length: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_line_length),
        }
    }
}

impl Default for DispatchCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LENGTH)
    }
}

impl Decoder for DispatchCodec {
    type Item = Result<DispatchCommand, DecodeError>;
    type Error = RelayError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match read_line(self.lines.decode(src))? {
                Line::Command(command) => return Ok(Some(command)),
                Line::Blank => continue,
                Line::Pending => return Ok(None),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match read_line(self.lines.decode_eof(src))? {
                Line::Command(command) => return Ok(Some(command)),
                Line::Blank => continue,
                Line::Pending => return Ok(None),
            }
        }
    }
}

enum Line {
    Command(Result<DispatchCommand, DecodeError>),
    Blank,
    Pending,
}

// `LinesCodec` consumes a non-UTF-8 line before reporting it, so that case is a
// per-frame decode error rather than a link failure.
fn read_line(result: Result<Option<String>, LinesCodecError>) -> Result<Line, RelayError> {
    match result {
        Ok(Some(line)) if line.trim().is_empty() => Ok(Line::Blank),
        Ok(Some(line)) => Ok(Line::Command(DispatchCommand::decode(line.trim()))),
        Ok(None) => Ok(Line::Pending),
        Err(LinesCodecError::Io(e)) if e.kind() == io::ErrorKind::InvalidData => {
            Ok(Line::Command(Err(DecodeError::InvalidUtf8)))
        }
        Err(e) => Err(e.into()),
    }
}

impl Encoder<DispatchCommand> for DispatchCodec {
    type Error = RelayError;

    fn encode(&mut self, item: DispatchCommand, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.lines.encode(item.encode(), dst)?;
        Ok(())
    }
}
