//! Keepalive Task
//!
//! DXLink drops a client that stays silent longer than the keepalive timeout
//! it accepted in `SETUP`. A background task sends `KEEPALIVE` on channel 0
//! at a fixed interval for the lifetime of the connection; the server echoes
//! it back.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Configuration for keepalive behavior.
#[derive(Debug, Clone)]
pub struct KeepaliveConfig {
    /// Interval between keepalive messages.
    pub interval: Duration,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
        }
    }
}

impl KeepaliveConfig {
    /// Create a new configuration.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

/// Destination for keepalive messages.
#[async_trait]
pub trait KeepaliveSink: Send + Sync {
    /// Send one `KEEPALIVE`.
    async fn send_keepalive(&self) -> Result<(), String>;
}

/// Keepalive bookkeeping shared between the task and the read loop.
#[derive(Debug)]
pub struct KeepaliveState {
    last_echo: RwLock<Option<Instant>>,
    sent: AtomicU64,
}

impl Default for KeepaliveState {
    fn default() -> Self {
        Self::new()
    }
}

impl KeepaliveState {
    /// Create empty state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_echo: RwLock::new(None),
            sent: AtomicU64::new(0),
        }
    }

    /// Record a server `KEEPALIVE`.
    pub fn record_echo(&self) {
        *self.last_echo.write() = Some(Instant::now());
    }

    /// Record a sent `KEEPALIVE`.
    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Keepalives sent on this connection.
    #[must_use]
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Time since the last server echo, if any arrived.
    #[must_use]
    pub fn since_last_echo(&self) -> Option<Duration> {
        self.last_echo.read().map(|at| at.elapsed())
    }

    /// Reset for a new connection.
    pub fn reset(&self) {
        *self.last_echo.write() = None;
        self.sent.store(0, Ordering::Relaxed);
    }
}

/// Periodic keepalive sender.
pub struct KeepaliveTask {
    config: KeepaliveConfig,
    state: Arc<KeepaliveState>,
    sink: Arc<dyn KeepaliveSink>,
    cancel: CancellationToken,
}

impl KeepaliveTask {
    /// Create a new keepalive task.
    #[must_use]
    pub fn new(
        config: KeepaliveConfig,
        state: Arc<KeepaliveState>,
        sink: Arc<dyn KeepaliveSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            state,
            sink,
            cancel,
        }
    }

    /// Run until cancelled.
    ///
    /// The first keepalive goes out one interval after start. A failed send
    /// is logged; the read loop detects a dead connection.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        interval.tick().await;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Keepalive task cancelled");
                    break;
                }
                _ = interval.tick() => {
                    match self.sink.send_keepalive().await {
                        Ok(()) => {
                            self.state.record_sent();
                            tracing::trace!(
                                sent = self.state.sent_count(),
                                since_echo_ms = ?self.state.since_last_echo().map(|d| d.as_millis()),
                                "Keepalive sent"
                            );
                        }
                        Err(e) => tracing::warn!(error = %e, "Failed to send keepalive"),
                    }
                }
            }
        }
    }
}
