// src/core/ingress.rs

//! Interprets inbound client messages as subscription requests.
//!
//! A key list can arrive two ways: as a query-style field supplied by the
//! transport when the connection is opened (`?tags=sports,news`), or inside a
//! JSON message body:
//!
//! ```text
//! {"type":"subscribe","tags":"sports,news"}
//! {"tags":["sports","news"]}
//! ```

use crate::core::pubsub::split_topic_keys;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

const SUBSCRIBE_TYPE: &str = "subscribe";

/// How strictly client messages are checked.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum IngressPolicy {
    /// Messages without a key list are accepted and have no subscription effect.
    #[default]
    Lenient,
    /// Every message must be a JSON object with `"type": "subscribe"`;
    /// anything else closes the connection with a protocol error.
    Strict,
}

/// How a new key list combines with the keys a connection already holds.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionMode {
    /// Keys accumulate until the connection closes.
    #[default]
    Merge,
    /// The new list replaces the current one.
    Replace,
}

/// What the gateway should do with one client message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngressOutcome {
    /// Apply this key list. An empty list adds nothing; in replace mode it clears.
    Subscribe(IndexSet<String>),
    /// The message carries no subscription.
    Ignore,
    /// Strict mode rejected the message; close the connection with this reason.
    Violation(String),
}

#[derive(Debug, Clone)]
pub struct Ingress {
    policy: IngressPolicy,
    tags_field: String,
}

impl Default for Ingress {
    fn default() -> Self {
        Self::new(IngressPolicy::default(), "tags")
    }
}

impl Ingress {
    pub fn new(policy: IngressPolicy, tags_field: impl Into<String>) -> Self {
        Self {
            policy,
            tags_field: tags_field.into(),
        }
    }

    pub fn policy(&self) -> IngressPolicy {
        self.policy
    }

    /// Reads the key list from transport-supplied query parameters, if present.
    pub fn from_query(&self, query: &HashMap<String, String>) -> Option<IndexSet<String>> {
        query.get(&self.tags_field).map(|raw| split_topic_keys(raw))
    }

    /// Interprets a message body according to the configured policy.
    pub fn interpret(&self, body: &str) -> IngressOutcome {
        let object = match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(fields)) => Some(fields),
            _ => None,
        };

        match self.policy {
            IngressPolicy::Lenient => match object.map(|fields| self.keys_in(&fields)) {
                Some(Ok(Some(keys))) => IngressOutcome::Subscribe(keys),
                _ => IngressOutcome::Ignore,
            },
            IngressPolicy::Strict => {
                let Some(fields) = object else {
                    return IngressOutcome::Violation("expected a JSON subscribe message".into());
                };
                match fields.get("type") {
                    Some(Value::String(kind)) if kind == SUBSCRIBE_TYPE => {}
                    _ => {
                        return IngressOutcome::Violation(
                            "message type must be 'subscribe'".into(),
                        );
                    }
                }
                match self.keys_in(&fields) {
                    Ok(Some(keys)) => IngressOutcome::Subscribe(keys),
                    Ok(None) => IngressOutcome::Ignore,
                    Err(reason) => IngressOutcome::Violation(reason),
                }
            }
        }
    }

    // Ok(None) when the field is absent; Err when it has the wrong shape.
    fn keys_in(&self, fields: &Map<String, Value>) -> Result<Option<IndexSet<String>>, String> {
        match fields.get(&self.tags_field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(raw)) => Ok(Some(split_topic_keys(raw))),
            Some(Value::Array(items)) => {
                let mut keys = IndexSet::new();
                for item in items {
                    let Value::String(raw) = item else {
                        return Err(format!("'{}' must contain only strings", self.tags_field));
                    };
                    keys.extend(split_topic_keys(raw));
                }
                Ok(Some(keys))
            }
            Some(_) => Err(format!(
                "'{}' must be a string or an array of strings",
                self.tags_field
            )),
        }
    }
}
