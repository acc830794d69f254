//! Manager-level bridge health
//!
//! The manager pings every bridge it owns on a fixed period and keeps one
//! [`BridgeHealth`] record per bridge. A failed ping degrades the bridge;
//! `unhealthy_threshold` consecutive failures make it unhealthy. The first
//! passing check after an unhealthy streak only lifts the bridge back to
//! degraded; the next one makes it healthy.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::config::duration_ms;
use crate::manager::BridgeManager;
use crate::metrics::Tags;
use crate::{BridgeError, Result};

/// Health of one bridge as seen by its manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Not checked yet
    #[default]
    Unknown,
    Healthy,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HealthStatus::Unknown => "unknown",
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        };
        f.write_str(s)
    }
}

/// Result of the most recent health checks of a bridge
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeHealth {
    pub status: HealthStatus,
    /// Consecutive failed checks
    pub failure_count: u32,
    /// Duration of the last check
    #[serde(with = "duration_ms")]
    pub latency: Duration,
    pub last_check: Option<SystemTime>,
    /// Reason of the last failed check, cleared by a passing one
    pub last_error: Option<String>,
}

impl BridgeHealth {
    /// Fold one check outcome into the record
    pub fn record(&mut self, outcome: std::result::Result<(), String>, latency: Duration, threshold: u32) {
        self.latency = latency;
        self.last_check = Some(SystemTime::now());
        match outcome {
            Err(error) => {
                self.failure_count += 1;
                self.status = if self.failure_count >= threshold {
                    HealthStatus::Unhealthy
                } else {
                    HealthStatus::Degraded
                };
                self.last_error = Some(error);
            }
            Ok(()) => {
                self.status = if self.status == HealthStatus::Unhealthy {
                    HealthStatus::Degraded
                } else {
                    HealthStatus::Healthy
                };
                self.failure_count = 0;
                self.last_error = None;
            }
        }
    }
}

impl BridgeManager {
    /// Ping one bridge and update its health record
    pub fn check_bridge_health(&self, id: &str) -> Result<BridgeHealth> {
        let bridge = self.get_bridge(id)?;

        let started = Instant::now();
        let outcome = bridge.ping().map_err(|e| e.to_string());
        let latency = started.elapsed();

        let health = {
            let mut entry = self
                .health
                .get_mut(id)
                .ok_or_else(|| BridgeError::BridgeNotFound(id.to_string()))?;
            entry.record(outcome, latency, self.config.unhealthy_threshold);
            entry.clone()
        };

        match &health.last_error {
            Some(error) => warn!(
                bridge_id = %id,
                error = %error,
                failures = health.failure_count,
                status = %health.status,
                "Bridge health check failed"
            ),
            None => debug!(
                bridge_id = %id,
                latency_us = latency.as_micros() as u64,
                status = %health.status,
                "Bridge health check passed"
            ),
        }

        if bridge.options().enable_metrics {
            let collector = self.metrics.clone().unwrap_or_else(|| bridge.metrics());
            let mut tags = Tags::new();
            tags.insert("bridge_id".to_string(), id.to_string());
            tags.insert("status".to_string(), health.status.to_string());
            collector.collect("bridge", "health_check", latency.as_secs_f64() * 1000.0, &tags);
        }

        Ok(health)
    }

    /// Check every bridge once
    pub fn check_bridges_health(&self) -> HashMap<String, HealthStatus> {
        self.list_bridges()
            .into_iter()
            .filter_map(|id| {
                let status = self.check_bridge_health(&id).ok()?.status;
                Some((id, status))
            })
            .collect()
    }

    /// Latest health record of a bridge
    pub fn bridge_health(&self, id: &str) -> Result<BridgeHealth> {
        self.health
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| BridgeError::BridgeNotFound(id.to_string()))
    }

    /// Spawn the periodic health monitor. Returns false when it is disabled
    /// by a zero interval or already running.
    pub fn start_health_monitor(self: &Arc<Self>) -> bool {
        let interval = self.config.health_check_interval;
        if interval.is_zero() {
            debug!("Bridge health monitor disabled");
            return false;
        }
        let mut monitor = self.monitor.lock();
        if monitor.as_ref().is_some_and(|task| !task.is_finished()) {
            return false;
        }

        let manager = Arc::downgrade(self);
        *monitor = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                manager.check_bridges_health();
            }
            debug!("Bridge health monitor stopped");
        }));
        debug!(interval_ms = interval.as_millis() as u64, "Bridge health monitor started");
        true
    }

    /// Stop the periodic health monitor, if running
    pub fn stop_health_monitor(&self) {
        if let Some(task) = self.monitor.lock().take() {
            task.abort();
        }
    }
}
