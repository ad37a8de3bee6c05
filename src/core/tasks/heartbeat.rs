// src/core/tasks/heartbeat.rs

use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::core::events::GatewayEvent;

/// A task that asks the gateway core to send the heartbeat payload to every
/// client at a fixed interval.
pub struct HeartbeatTask {
    interval: Duration,
    events_tx: mpsc::Sender<GatewayEvent>,
}

impl HeartbeatTask {
    pub fn new(interval: Duration, events_tx: mpsc::Sender<GatewayEvent>) -> Self {
        Self {
            interval,
            events_tx,
        }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Heartbeat task started ({:?} interval).", self.interval);
        // The first beat goes out one full interval after startup.
        let mut interval =
            tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    // A full event queue means the core is busy; skip this beat.
                    match self.events_tx.try_send(GatewayEvent::Heartbeat) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            debug!("Gateway core is busy; skipping heartbeat.");
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => {
                            info!("Gateway core stopped; heartbeat task exiting.");
                            return;
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Heartbeat task shutting down.");
                    return;
                }
            }
        }
    }
}
