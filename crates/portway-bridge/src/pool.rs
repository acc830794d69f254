//! Connection pool over adapter instances
//!
//! A pool opens adapters through an [`AdapterFactory`] on demand and lends
//! each one to a single caller at a time. Every live connection, idle or
//! borrowed, holds one semaphore permit, so at most `max_connections` exist
//! at once. A borrowed connection returns to the pool when its
//! [`PooledConnection`] guard drops.

use futures::future::join_all;
use parking_lot::Mutex;
use portway_core::Context;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::adapter::{Adapter, AdapterConfig, AdapterStatus};
use crate::bridge::guarded;
use crate::config::{duration_ms, BridgeOptions};
use crate::factory::AdapterFactory;
use crate::{BridgeError, Result};

/// Pool sizing and timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Upper bound on live connections, idle plus borrowed
    pub max_connections: usize,
    /// Idle connections older than this are closed by the cleanup sweep
    #[serde(with = "duration_ms")]
    pub max_idle_time: Duration,
    /// Bound on one `acquire`, including opening a new connection
    #[serde(with = "duration_ms")]
    pub acquire_timeout: Duration,
    /// Check an idle connection is still connected before lending it
    pub validate_on_borrow: bool,
    /// Zero disables the background sweep
    #[serde(with = "duration_ms")]
    pub cleanup_interval: Duration,
    /// Most idle connections closed by one sweep
    pub max_burst_size: usize,
    /// Extra connect attempts when opening a connection
    pub connect_retries: u32,
    #[serde(with = "duration_ms")]
    pub retry_delay: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 100,
            max_idle_time: Duration::from_secs(300),
            acquire_timeout: Duration::from_secs(30),
            validate_on_borrow: true,
            cleanup_interval: Duration::from_secs(60),
            max_burst_size: 10,
            connect_retries: 0,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl From<&BridgeOptions> for PoolConfig {
    fn from(options: &BridgeOptions) -> Self {
        Self {
            max_connections: options.max_concurrency,
            acquire_timeout: options.default_timeout,
            connect_retries: options.retry_count,
            retry_delay: options.retry_delay,
            ..Default::default()
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(BridgeError::Config("max_connections must be at least 1".into()));
        }
        if self.acquire_timeout.is_zero() {
            return Err(BridgeError::Config("acquire_timeout must be non-zero".into()));
        }
        if self.max_burst_size == 0 {
            return Err(BridgeError::Config("max_burst_size must be at least 1".into()));
        }
        Ok(())
    }
}

/// Point-in-time pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub total_connections: usize,
    pub idle_connections: usize,
    pub active_connections: usize,
    pub acquisitions: u64,
    pub returns: u64,
    pub creations: u64,
    pub closures: u64,
    pub timeouts: u64,
    pub validation_failures: u64,
    /// Acquisitions that found the pool at capacity and had to wait
    pub exhaustions: u64,
}

struct Idle {
    id: u64,
    adapter: Arc<dyn Adapter>,
    permit: OwnedSemaphorePermit,
    since: Instant,
}

#[derive(Default)]
struct PoolState {
    idle: VecDeque<Idle>,
    in_use: HashMap<u64, Arc<dyn Adapter>>,
    closed: bool,
    next_id: u64,
    stats: PoolStats,
}

struct Shared {
    config: PoolConfig,
    factory: AdapterFactory,
    adapter_config: AdapterConfig,
    permits: Arc<Semaphore>,
    state: Mutex<PoolState>,
    /// Signalled when a connection is returned or a slot frees up
    available: Notify,
}

impl Shared {
    fn give_back(&self, id: u64, adapter: Arc<dyn Adapter>, permit: OwnedSemaphorePermit) {
        {
            let mut state = self.state.lock();
            if state.in_use.remove(&id).is_none() {
                // Already closed by `close`
                return;
            }
            state.stats.returns += 1;
            state.idle.push_back(Idle {
                id,
                adapter,
                permit,
                since: Instant::now(),
            });
        }
        self.available.notify_one();
    }

    fn forget(&self, id: u64) {
        let mut state = self.state.lock();
        if state.in_use.remove(&id).is_some() {
            state.stats.closures += 1;
        }
    }

    async fn close_adapter(&self, adapter: &Arc<dyn Adapter>) {
        let ctx = Context::background().with_timeout(self.config.acquire_timeout);
        if let Err(e) = guarded(&ctx, adapter.disconnect(&ctx)).await {
            debug!(adapter = %adapter.name(), error = %e, "Pooled connection did not close cleanly");
        }
    }

    async fn cleanup_idle(&self) -> usize {
        let expired: Vec<Idle> = {
            let mut state = self.state.lock();
            let mut expired = Vec::new();
            while expired.len() < self.config.max_burst_size {
                let stale = state
                    .idle
                    .front()
                    .is_some_and(|idle| idle.since.elapsed() >= self.config.max_idle_time);
                if !stale {
                    break;
                }
                expired.extend(state.idle.pop_front());
            }
            state.stats.closures += expired.len() as u64;
            expired
        };
        if expired.is_empty() {
            return 0;
        }

        debug!(closing = expired.len(), "Closing idle pooled connections");
        join_all(expired.iter().map(|idle| self.close_adapter(&idle.adapter))).await;
        let closed = expired.len();
        drop(expired);
        self.available.notify_one();
        closed
    }
}

/// Bounded set of reusable adapter connections
pub struct ConnectionPool {
    shared: Arc<Shared>,
    cleanup: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionPool {
    /// Create an empty pool. Connections are opened lazily by `acquire`.
    ///
    /// Must be called within a Tokio runtime when `cleanup_interval` is
    /// non-zero, since the idle sweep runs as a background task.
    pub fn new(
        factory: AdapterFactory,
        adapter_config: AdapterConfig,
        config: PoolConfig,
    ) -> Result<Self> {
        config.validate()?;
        let shared = Arc::new(Shared {
            permits: Arc::new(Semaphore::new(config.max_connections)),
            config,
            factory,
            adapter_config,
            state: Mutex::new(PoolState::default()),
            available: Notify::new(),
        });
        let pool = Self {
            cleanup: Mutex::new(spawn_cleanup(&shared)),
            shared,
        };
        info!(
            adapter = %pool.shared.adapter_config.name,
            max_connections = pool.shared.config.max_connections,
            "Created connection pool"
        );
        Ok(pool)
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Borrow a connection: an idle one if available, a new one while under
    /// `max_connections`, otherwise wait for one to be returned.
    ///
    /// Bounded by `acquire_timeout` and by `ctx`.
    pub async fn acquire(&self, ctx: &Context) -> Result<PooledConnection> {
        let ctx = ctx.with_timeout(self.shared.config.acquire_timeout);
        {
            let mut state = self.shared.state.lock();
            if state.closed {
                return Err(BridgeError::PoolClosed);
            }
            state.stats.acquisitions += 1;
        }

        let mut waited = false;
        loop {
            let idle = {
                let mut state = self.shared.state.lock();
                if state.closed {
                    return Err(BridgeError::PoolClosed);
                }
                state.idle.pop_back()
            };

            if let Some(idle) = idle {
                if self.shared.config.validate_on_borrow
                    && idle.adapter.status() != AdapterStatus::Connected
                {
                    {
                        let mut state = self.shared.state.lock();
                        state.stats.validation_failures += 1;
                        state.stats.closures += 1;
                    }
                    warn!(
                        adapter = %idle.adapter.name(),
                        status = %idle.adapter.status(),
                        "Invalid pooled connection, replacing"
                    );
                    self.shared.close_adapter(&idle.adapter).await;
                    continue;
                }
                return Ok(self.lend(idle.id, idle.adapter, idle.permit));
            }

            match self.shared.permits.clone().try_acquire_owned() {
                Ok(permit) => return self.open(&ctx, permit).await,
                Err(TryAcquireError::Closed) => return Err(BridgeError::PoolClosed),
                Err(TryAcquireError::NoPermits) => {}
            }

            if !waited {
                waited = true;
                self.shared.state.lock().stats.exhaustions += 1;
                debug!("Connection pool exhausted, waiting for a return");
            }
            if let Err(e) = ctx.run(self.shared.available.notified()).await {
                if matches!(e, portway_core::Error::DeadlineExceeded) {
                    self.shared.state.lock().stats.timeouts += 1;
                }
                return Err(e.into());
            }
        }
    }

    async fn open(&self, ctx: &Context, permit: OwnedSemaphorePermit) -> Result<PooledConnection> {
        match self.connect_new(ctx).await {
            Ok(adapter) => {
                let id = {
                    let mut state = self.shared.state.lock();
                    if state.closed {
                        None
                    } else {
                        let id = state.next_id;
                        state.next_id += 1;
                        state.stats.creations += 1;
                        Some(id)
                    }
                };
                match id {
                    Some(id) => Ok(self.lend(id, adapter, permit)),
                    None => {
                        self.shared.close_adapter(&adapter).await;
                        Err(BridgeError::PoolClosed)
                    }
                }
            }
            Err(e) => {
                drop(permit);
                self.shared.available.notify_one();
                Err(e)
            }
        }
    }

    async fn connect_new(&self, ctx: &Context) -> Result<Arc<dyn Adapter>> {
        let config = &self.shared.config;
        let adapter = (self.shared.factory)(self.shared.adapter_config.clone())?;
        guarded(ctx, adapter.initialize(ctx)).await?;

        let attempts = config.connect_retries + 1;
        let mut attempt = 1;
        loop {
            match guarded(ctx, adapter.connect(ctx)).await {
                Ok(()) => {
                    debug!(adapter = %adapter.name(), attempt, "Opened pooled connection");
                    return Ok(adapter);
                }
                Err(e) if attempt < attempts && !ctx.is_done() => {
                    debug!(adapter = %adapter.name(), attempt, error = %e, "Pooled connect failed, retrying");
                    ctx.run(tokio::time::sleep(config.retry_delay)).await?;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn lend(&self, id: u64, adapter: Arc<dyn Adapter>, permit: OwnedSemaphorePermit) -> PooledConnection {
        self.shared.state.lock().in_use.insert(id, adapter.clone());
        PooledConnection {
            id,
            adapter,
            permit: Some(permit),
            pool: Arc::downgrade(&self.shared),
        }
    }

    /// Close idle connections past `max_idle_time`, at most `max_burst_size`
    /// of them; returns how many were closed
    pub async fn cleanup_idle(&self) -> usize {
        self.shared.cleanup_idle().await
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        PoolStats {
            total_connections: state.idle.len() + state.in_use.len(),
            idle_connections: state.idle.len(),
            active_connections: state.in_use.len(),
            ..state.stats
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Close every connection, idle and borrowed. Idempotent.
    ///
    /// Borrowed guards stay usable as handles but no longer return to the
    /// pool; waiting `acquire` calls fail with [`BridgeError::PoolClosed`].
    pub async fn close(&self) {
        let (idle, in_use) = {
            let mut state = self.shared.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            let idle: Vec<Idle> = state.idle.drain(..).collect();
            let in_use: Vec<Arc<dyn Adapter>> = state.in_use.drain().map(|(_, a)| a).collect();
            state.stats.closures += (idle.len() + in_use.len()) as u64;
            (idle, in_use)
        };
        self.shared.permits.close();
        if let Some(task) = self.cleanup.lock().take() {
            task.abort();
        }
        self.shared.available.notify_waiters();

        info!(
            idle = idle.len(),
            in_use = in_use.len(),
            "Shutting down connection pool"
        );
        let adapters = idle.iter().map(|i| &i.adapter).chain(in_use.iter());
        join_all(adapters.map(|adapter| self.shared.close_adapter(adapter))).await;
        info!("Connection pool shutdown complete");
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        if let Some(task) = self.cleanup.lock().take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("adapter", &self.shared.adapter_config.name)
            .field("stats", &self.stats())
            .finish()
    }
}

fn spawn_cleanup(shared: &Arc<Shared>) -> Option<JoinHandle<()>> {
    let interval = shared.config.cleanup_interval;
    if interval.is_zero() {
        return None;
    }
    let shared: Weak<Shared> = Arc::downgrade(shared);
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(shared) = shared.upgrade() else {
                break;
            };
            shared.cleanup_idle().await;
        }
    }))
}

/// A borrowed connection; returns to its pool on drop
pub struct PooledConnection {
    id: u64,
    adapter: Arc<dyn Adapter>,
    permit: Option<OwnedSemaphorePermit>,
    pool: Weak<Shared>,
}

impl PooledConnection {
    pub fn adapter(&self) -> &Arc<dyn Adapter> {
        &self.adapter
    }

    /// Close this connection instead of returning it, freeing its slot
    pub async fn discard(mut self) {
        let permit = self.permit.take();
        if let Some(pool) = self.pool.upgrade() {
            pool.forget(self.id);
            pool.close_adapter(&self.adapter).await;
            drop(permit);
            pool.available.notify_one();
        }
    }
}

impl std::ops::Deref for PooledConnection {
    type Target = dyn Adapter;

    fn deref(&self) -> &Self::Target {
        self.adapter.as_ref()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(permit) = self.permit.take() else {
            return;
        };
        if let Some(pool) = self.pool.upgrade() {
            pool.give_back(self.id, self.adapter.clone(), permit);
        }
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("adapter", &self.adapter.name())
            .finish()
    }
}
