// SPDX-License-Identifier: MIT

//! Fan-out of committed snapshots to connected devices.
//!
//! Every committed write is published to the user's channel. Subscribers
//! that fall behind lose intermediate snapshots, which is harmless: each
//! snapshot is the complete state.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::models::{LiveActivitySnapshot, Source};
use crate::services::pedometer::{CalorieEstimator, Pedometer};

/// Per-user channel depth.
pub const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Publisher unavailable: {0}")]
    Unavailable(String),
}

/// Sink for committed snapshots.
///
/// A failure here never undoes the write; the engine logs it and moves on.
pub trait LivePublisher: Send + Sync {
    fn publish(&self, user_id: &str, snapshot: &LiveActivitySnapshot) -> Result<(), PublishError>;
}

/// In-process pub/sub keyed by user.
#[derive(Clone)]
pub struct BroadcastHub {
    channels: Arc<DashMap<String, broadcast::Sender<LiveActivitySnapshot>>>,
    capacity: usize,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(CHANNEL_CAPACITY)
    }
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Receive every snapshot committed for `user_id` from now on.
    pub fn subscribe(&self, user_id: &str) -> broadcast::Receiver<LiveActivitySnapshot> {
        self.channels
            .entry(user_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub fn subscriber_count(&self, user_id: &str) -> usize {
        self.channels
            .get(user_id)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

impl LivePublisher for BroadcastHub {
    fn publish(&self, user_id: &str, snapshot: &LiveActivitySnapshot) -> Result<(), PublishError> {
        let delivered = match self.channels.get(user_id) {
            Some(tx) => tx.send(snapshot.clone()).unwrap_or(0),
            None => 0,
        };

        if delivered == 0 {
            // Nobody listening; drop the channel unless someone subscribed meanwhile.
            self.channels
                .remove_if(user_id, |_, tx| tx.receiver_count() == 0);
        }

        tracing::debug!(user_id, revision = snapshot.revision, delivered, "Published snapshot");
        Ok(())
    }
}

/// One connected producer device.
///
/// Applies published snapshots to local state, skipping the device's own
/// writes so they are not processed twice. For a phone this is what keeps
/// the pedometer's suppression window in step with the watch.
pub struct DeviceSession<E: CalorieEstimator> {
    source: Source,
    pedometer: Pedometer<E>,
    latest: Option<LiveActivitySnapshot>,
}

impl<E: CalorieEstimator> DeviceSession<E> {
    pub fn new(source: Source, pedometer: Pedometer<E>) -> Self {
        Self {
            source,
            pedometer,
            latest: None,
        }
    }

    pub fn pedometer(&self) -> &Pedometer<E> {
        &self.pedometer
    }

    pub fn pedometer_mut(&mut self) -> &mut Pedometer<E> {
        &mut self.pedometer
    }

    /// Last snapshot seen, including the device's own.
    pub fn latest(&self) -> Option<&LiveActivitySnapshot> {
        self.latest.as_ref()
    }

    /// Handle a published snapshot. Returns false for the device's own echo.
    pub fn on_snapshot(&mut self, snapshot: LiveActivitySnapshot) -> bool {
        let stale = self
            .latest
            .as_ref()
            .is_some_and(|seen| seen.date == snapshot.date && seen.revision >= snapshot.revision);
        if stale {
            return false;
        }

        let echo = snapshot.last_source == self.source;
        if !echo {
            self.pedometer.observe_snapshot(&snapshot);
        }
        self.latest = Some(snapshot);
        !echo
    }

    /// Drain everything queued on `rx`. Returns how many snapshots were applied.
    pub fn drain(&mut self, rx: &mut broadcast::Receiver<LiveActivitySnapshot>) -> usize {
        let mut applied = 0;
        loop {
            match rx.try_recv() {
                Ok(snapshot) => {
                    if self.on_snapshot(snapshot) {
                        applied += 1;
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Device session lagged");
                }
                Err(_) => break,
            }
        }
        applied
    }
}
