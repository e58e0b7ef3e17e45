//! App-level notification broadcasting and cache reset wiring.
//!
//! Domain code posts events such as "transaction-completed" on a shared
//! [`NotificationHub`]. A store configured with matching reset events marks
//! its whole cache stale when one of them arrives, so the next `Cached`
//! request refetches.

use std::sync::Arc;

use larder_core::{Cacheable, NotificationEvent, ResetConfig, StoreKey};
use larder_storage::Cache;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default broadcast buffer for a hub.
pub const DEFAULT_HUB_CAPACITY: usize = 256;

/// Broadcast channel for notification events, shared across stores.
#[derive(Debug, Clone)]
pub struct NotificationHub {
    tx: broadcast::Sender<NotificationEvent>,
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(DEFAULT_HUB_CAPACITY)
    }
}

impl NotificationHub {
    /// Create a hub with the specified channel capacity.
    ///
    /// A receiver that falls more than `capacity` events behind is lagged;
    /// reset listeners treat that as a reset.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Post an event to every subscriber.
    ///
    /// Non-blocking. Without subscribers the event is dropped.
    pub fn post(&self, event: impl Into<NotificationEvent>) {
        let event = event.into();
        match self.tx.send(event.clone()) {
            Ok(receiver_count) => {
                debug!(event = %event, receivers = receiver_count, "Posted notification");
            }
            Err(_) => {
                debug!(event = %event, "No receivers for notification");
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Background task marking a cache stale on reset events.
///
/// Aborted when dropped.
#[derive(Debug)]
pub struct ResetListener {
    handle: JoinHandle<()>,
}

impl ResetListener {
    /// Spawn a listener on the current Tokio runtime.
    ///
    /// Returns `None` for [`ResetConfig::never`], which needs no task.
    pub fn spawn<K, T>(
        hub: &NotificationHub,
        reset: ResetConfig,
        cache: Arc<dyn Cache<K, T>>,
        store_id: String,
    ) -> Option<Self>
    where
        K: StoreKey,
        T: Cacheable,
    {
        if reset.is_never() {
            return None;
        }

        let mut rx = hub.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                let reason = match rx.recv().await {
                    Ok(event) if reset.triggers_on(&event) => event.to_string(),
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(store_id = %store_id, skipped, "Notification receiver lagged, resetting cache");
                        "lagged".to_string()
                    }
                    Err(RecvError::Closed) => {
                        debug!(store_id = %store_id, "Notification hub closed");
                        break;
                    }
                };

                match cache.mark_all_as_stale().await {
                    Ok(marked) => {
                        info!(store_id = %store_id, reason = %reason, marked, "Reset cache on notification");
                    }
                    Err(e) => {
                        warn!(store_id = %store_id, reason = %reason, error = %e, "Failed to reset cache");
                    }
                }
            }
        });

        Some(Self { handle })
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ResetListener {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
