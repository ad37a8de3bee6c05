// src/core/protocol/dispatch.rs

//! The dispatch command exchanged with backend workers.
//!
//! On the wire a command is a single JSON object:
//!
//! ```text
//! {"type":"send_to_all","content":"..."}
//! {"type":"send_by_tag","tags":"sports,news","content":"..."}
//! ```
//!
//! `publish` is accepted as an alias of `send_by_tag`, and `tags` may also be
//! an array of strings.

use crate::core::errors::DecodeError;
use crate::core::pubsub::split_topic_keys;
use serde_json::{Map, Value, json};
use std::sync::Arc;

/// The opaque payload relayed to clients. Shared between every recipient of
/// a single command.
pub type Payload = Arc<str>;

const TYPE_SEND_TO_ALL: &str = "send_to_all";
const TYPE_SEND_BY_TAG: &str = "send_by_tag";
const TYPE_PUBLISH: &str = "publish";

/// An inbound instruction telling the gateway what to deliver and to whom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchCommand {
    /// Deliver `content` to every registered connection.
    SendToAll { content: Payload },
    /// Deliver `content` to the subscribers of `tags`. An empty tag list
    /// falls back to `SendToAll`.
    SendByTags { tags: Vec<String>, content: Payload },
}

impl DispatchCommand {
    pub fn send_to_all(content: impl Into<Payload>) -> Self {
        DispatchCommand::SendToAll {
            content: content.into(),
        }
    }

    pub fn send_by_tags<I, S>(tags: I, content: impl Into<Payload>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut keys = Vec::new();
        for tag in tags {
            for key in split_topic_keys(tag.as_ref()) {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        DispatchCommand::SendByTags {
            tags: keys,
            content: content.into(),
        }
    }

    pub fn content(&self) -> &Payload {
        match self {
            DispatchCommand::SendToAll { content } => content,
            DispatchCommand::SendByTags { content, .. } => content,
        }
    }

    /// A short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchCommand::SendToAll { .. } => TYPE_SEND_TO_ALL,
            DispatchCommand::SendByTags { .. } => TYPE_SEND_BY_TAG,
        }
    }

    /// Parses one JSON-encoded command, validating every required field.
    pub fn decode(line: &str) -> Result<Self, DecodeError> {
        let value: Value =
            serde_json::from_str(line).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
        let Value::Object(mut fields) = value else {
            return Err(DecodeError::NotAnObject);
        };

        let kind = match fields.remove("type") {
            Some(Value::String(kind)) => kind,
            _ => return Err(DecodeError::MissingField("type")),
        };
        let content = take_content(&mut fields)?;

        match kind.as_str() {
            TYPE_SEND_TO_ALL => Ok(DispatchCommand::SendToAll { content }),
            TYPE_SEND_BY_TAG | TYPE_PUBLISH => {
                let tags = take_tags(&mut fields)?;
                Ok(DispatchCommand::SendByTags { tags, content })
            }
            _ => Err(DecodeError::UnknownType(kind)),
        }
    }

    /// Serializes the command into its single-line JSON form.
    pub fn encode(&self) -> String {
        let value = match self {
            DispatchCommand::SendToAll { content } => json!({
                "type": TYPE_SEND_TO_ALL,
                "content": content.as_ref(),
            }),
            DispatchCommand::SendByTags { tags, content } => json!({
                "type": TYPE_SEND_BY_TAG,
                "tags": tags.join(","),
                "content": content.as_ref(),
            }),
        };
        value.to_string()
    }
}

// A string payload is relayed verbatim. Anything else is relayed as its JSON text.
fn take_content(fields: &mut Map<String, Value>) -> Result<Payload, DecodeError> {
    match fields.remove("content") {
        None | Some(Value::Null) => Err(DecodeError::MissingField("content")),
        Some(Value::String(s)) => Ok(Payload::from(s)),
        Some(other) => Ok(Payload::from(other.to_string())),
    }
}

// A missing tag list is treated as empty, which later resolves to a broadcast.
fn take_tags(fields: &mut Map<String, Value>) -> Result<Vec<String>, DecodeError> {
    let raw: Vec<String> = match fields.remove("tags") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::String(s)) => vec![s],
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                _ => Err(DecodeError::InvalidTags),
            })
            .collect::<Result<_, _>>()?,
        Some(_) => return Err(DecodeError::InvalidTags),
    };

    let mut tags = Vec::new();
    for entry in &raw {
        for key in split_topic_keys(entry) {
            if !tags.contains(&key) {
                tags.push(key);
            }
        }
    }
    Ok(tags)
}
