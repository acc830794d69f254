//! Heartbeat monitor and auto-reconnect
//!
//! On every heartbeat tick the bridge looks at the adapters it tracks as
//! connected. An adapter reporting `Error` or `Disconnected` starts one
//! reconnect episode, run as its own task so a slow reconnect never delays
//! the next tick or the evaluation of other adapters. An episode ends with
//! exactly one `adapter.reconnected` or `adapter.reconnect_failed` event.

use portway_core::Context;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn, Instrument};

use crate::adapter::Adapter;
use crate::bridge::{guarded, Bridge, BridgeStatus};
use crate::events::{event_types, BridgeEvent};
use crate::{BridgeError, Result};

impl Bridge {
    /// Evaluate adapter health once; returns how many reconnect episodes started
    pub fn check_health(self: &Arc<Self>) -> usize {
        let tracked: Vec<(String, Arc<dyn Adapter>)> = self
            .adapters
            .read()
            .iter()
            .filter(|(_, entry)| entry.connected)
            .map(|(name, entry)| (name.clone(), entry.adapter.clone()))
            .collect();

        let mut started = 0;
        for (name, adapter) in tracked {
            let status = adapter.status();
            if !status.is_failed() {
                continue;
            }
            if self.reconnecting.lock().contains(&name) {
                continue;
            }

            warn!(
                parent: &self.span,
                adapter = %name,
                status = %status,
                error = ?adapter.last_error(),
                "Adapter unhealthy"
            );

            if !self.config.auto_reconnect {
                self.set_connected(&name, false);
                self.events.raise(
                    BridgeEvent::new(event_types::ADAPTER_DISCONNECTED, name.as_str())
                        .with_data(serde_json::json!({ "status": status })),
                );
                continue;
            }

            if !self.reconnecting.lock().insert(name.clone()) {
                continue;
            }
            let bridge = self.clone();
            tokio::spawn(
                async move { bridge.reconnect(name, adapter).await }.instrument(self.span.clone()),
            );
            started += 1;
        }
        started
    }

    async fn reconnect(self: Arc<Self>, name: String, adapter: Arc<dyn Adapter>) {
        let attempts = self.config.connection_retry_limit.max(1);
        let mut last_error = None;
        let mut succeeded = None;

        for attempt in 1..=attempts {
            if self.root.is_cancelled() {
                break;
            }
            let ctx = Context::with_token(self.root.child_token())
                .with_timeout(self.config.default_timeout);
            match guarded(&ctx, adapter.connect(&ctx)).await {
                Ok(()) => {
                    succeeded = Some(attempt);
                    break;
                }
                Err(e) => {
                    debug!(adapter = %name, attempt, error = %e, "Reconnect attempt failed");
                    last_error = Some(e);
                }
            }
            if attempt < attempts {
                tokio::select! {
                    _ = self.root.cancelled() => break,
                    _ = tokio::time::sleep(self.options.retry_delay) => {}
                }
            }
        }

        if self.root.is_cancelled() {
            self.reconnecting.lock().remove(&name);
            debug!(adapter = %name, "Reconnect abandoned, bridge shutting down");
            return;
        }

        match succeeded {
            Some(attempt) => {
                self.set_connected(&name, true);
                info!(adapter = %name, attempts = attempt, "Adapter reconnected");
                self.events.raise(
                    BridgeEvent::new(event_types::ADAPTER_RECONNECTED, name.as_str())
                        .with_data(serde_json::json!({ "attempts": attempt })),
                );
            }
            None => {
                self.set_connected(&name, false);
                let error = last_error.map(|e| e.to_string()).unwrap_or_default();
                warn!(adapter = %name, attempts, error = %error, "Adapter reconnect failed");
                self.events.raise(
                    BridgeEvent::new(event_types::ADAPTER_RECONNECT_FAILED, name.as_str())
                        .with_data(serde_json::json!({ "attempts": attempts, "error": error })),
                );
            }
        }
        self.reconnecting.lock().remove(&name);
    }

    /// Liveness check used by manager health monitoring.
    ///
    /// Passes when the bridge is `Ready` and every adapter it tracks as
    /// connected reports a healthy status.
    pub fn ping(&self) -> Result<()> {
        match self.status() {
            BridgeStatus::Ready => {}
            BridgeStatus::ShuttingDown => return Err(BridgeError::BridgeShuttingDown),
            BridgeStatus::Error => {
                return Err(BridgeError::Transport(self.last_error().unwrap_or_default()))
            }
            BridgeStatus::Uninitialized | BridgeStatus::Initializing => {
                return Err(BridgeError::BridgeNotInitialized)
            }
        }

        let adapters = self.adapters.read();
        let mut failed: Vec<_> = adapters
            .iter()
            .filter(|(_, entry)| entry.connected && entry.adapter.status().is_failed())
            .map(|(name, entry)| format!("{} is {}", name, entry.adapter.status()))
            .collect();
        if failed.is_empty() {
            return Ok(());
        }
        failed.sort();
        Err(BridgeError::Transport(failed.join(", ")))
    }

    /// Whether a reconnect episode is running for `name`
    pub fn is_reconnecting(&self, name: &str) -> bool {
        self.reconnecting.lock().contains(name)
    }

    pub(crate) fn start_heartbeat(self: &Arc<Self>) {
        let interval = self.config.heartbeat_interval;
        if interval.is_zero() {
            debug!(parent: &self.span, "Heartbeat monitor disabled");
            return;
        }

        let bridge = Arc::downgrade(self);
        let token = self.root.clone();
        let task = async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let Some(bridge) = bridge.upgrade() else {
                    break;
                };
                bridge.check_health();
            }
            debug!("Heartbeat monitor stopped");
        };

        *self.heartbeat.lock() = Some(tokio::spawn(task.instrument(self.span.clone())));
        debug!(parent: &self.span, interval_ms = interval.as_millis() as u64, "Heartbeat monitor started");
    }
}
