// src/core/pubsub/dispatcher.rs

//! Resolves dispatch commands into deliveries, at most once per connection per command.

use super::registry::ClientRecord;
use super::{ConnectionRegistry, SubscriptionIndex};
use crate::core::ClientId;
use crate::core::errors::RelayError;
use crate::core::protocol::{DispatchCommand, Payload};

/// The outcome of delivering one command or heartbeat.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DeliveryReport {
    /// The sequence number assigned to the command (0 for unsequenced sends).
    pub seq: u64,
    /// Connections that accepted the payload.
    pub delivered: usize,
    /// Repeat matches collapsed by the sequence check.
    pub deduplicated: usize,
    /// Connections whose send failed. The caller must clean these up.
    pub failed: Vec<(ClientId, RelayError)>,
}

/// Owns the global dispatch sequence counter.
#[derive(Debug, Default)]
pub struct Dispatcher {
    seq: u64,
}

impl Dispatcher {
    pub fn new() -> Self {
        Default::default()
    }

    /// The sequence number of the most recent command, or 0 if none was dispatched.
    pub fn last_seq(&self) -> u64 {
        self.seq
    }

    /// Delivers `command` to its resolved recipients.
    ///
    /// The sequence counter advances exactly once per call. A failed send is
    /// recorded in the report and does not stop delivery to the others.
    pub fn dispatch(
        &mut self,
        command: &DispatchCommand,
        index: &SubscriptionIndex,
        registry: &mut ConnectionRegistry,
    ) -> DeliveryReport {
        self.seq += 1;
        let mut report = DeliveryReport {
            seq: self.seq,
            ..Default::default()
        };

        match command {
            DispatchCommand::SendByTags { tags, content } if !tags.is_empty() => {
                for id in index.resolve_iter(tags) {
                    if let Some(record) = registry.get_mut(id) {
                        deliver_once(record, report.seq, content, &mut report);
                    }
                }
            }
            // Broadcast, and the empty-tag fallback.
            _ => {
                let content = command.content();
                for record in registry.records_mut() {
                    deliver_once(record, report.seq, content, &mut report);
                }
            }
        }
        report
    }
}

fn deliver_once(record: &mut ClientRecord, seq: u64, content: &Payload, report: &mut DeliveryReport) {
    if record.last_delivered_seq == seq {
        report.deduplicated += 1;
        return;
    }
    record.last_delivered_seq = seq;
    match record.sink.send(content) {
        Ok(()) => report.delivered += 1,
        Err(e) => report.failed.push((record.id, e)),
    }
}

/// Sends `payload` to every registered connection without touching the
/// sequence counter. Used by the heartbeat.
pub fn deliver_unsequenced(payload: &Payload, registry: &ConnectionRegistry) -> DeliveryReport {
    let mut report = DeliveryReport::default();
    for id in registry.resolve_all() {
        if let Some(record) = registry.get(id) {
            match record.sink.send(payload) {
                Ok(()) => report.delivered += 1,
                Err(e) => report.failed.push((id, e)),
            }
        }
    }
    report
}
