//! Retrying Query Service
//!
//! Bridges "subscribed but not yet populated" for synchronous callers: a
//! lookup that misses sleeps and polls the store again, up to a configured
//! number of retries. The sleep runs on the caller's task and never touches
//! the ingest path.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::application::ports::{OptionDataSource, PortError, QueryError, QuoteSource};
use crate::domain::streaming::OptionData;
use crate::domain::subscription::SubscriptionStore;
use crate::infrastructure::metrics::{self, QueryKind};

/// Retry behaviour for snapshot queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the first lookup.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub delay: Duration,
    /// Double the delay after every retry.
    pub exponential_backoff: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_secs(1),
            exponential_backoff: false,
        }
    }
}

/// Result of a single store lookup.
enum Lookup<T> {
    Missing,
    Incomplete,
    Ready(T),
}

/// Snapshot queries over the shared [`SubscriptionStore`] with bounded retry.
#[derive(Debug, Clone)]
pub struct SnapshotQuery {
    store: Arc<SubscriptionStore>,
    retry: RetryConfig,
}

impl SnapshotQuery {
    /// Create a query service over `store`.
    #[must_use]
    pub const fn new(store: Arc<SubscriptionStore>, retry: RetryConfig) -> Self {
        Self { store, retry }
    }

    /// Retry configuration in effect.
    #[must_use]
    pub const fn retry_config(&self) -> RetryConfig {
        self.retry
    }

    /// Latest populated option snapshot, waiting for the feed if needed.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::NotFound` if the symbol was never subscribed, or
    /// `QueryError::NotPopulated` if bid/ask/delta never arrived.
    pub async fn option_snapshot(&self, symbol: &str) -> Result<OptionData, QueryError> {
        self.poll(symbol, QueryKind::Option, |store| {
            match store.option_snapshot(symbol) {
                None => Lookup::Missing,
                Some(data) if data.is_populated() => Lookup::Ready(data),
                Some(_) => Lookup::Incomplete,
            }
        })
        .await
    }

    /// Latest trade price for an underlying, waiting for the feed if needed.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::NotFound` if the symbol was never subscribed, or
    /// `QueryError::NotPopulated` if no finite trade price arrived.
    pub async fn underlying_price(&self, symbol: &str) -> Result<f64, QueryError> {
        self.poll(symbol, QueryKind::Underlying, |store| {
            match store.underlying_snapshot(symbol) {
                None => Lookup::Missing,
                Some(data) => data.price().map_or(Lookup::Incomplete, Lookup::Ready),
            }
        })
        .await
    }

    async fn poll<T, F>(&self, symbol: &str, kind: QueryKind, lookup: F) -> Result<T, QueryError>
    where
        F: Fn(&SubscriptionStore) -> Lookup<T>,
    {
        let mut delay = self.retry.delay;
        let mut missing = true;

        for attempt in 0..=self.retry.max_retries {
            match lookup(&self.store) {
                Lookup::Ready(value) => return Ok(value),
                Lookup::Missing => missing = true,
                Lookup::Incomplete => missing = false,
            }

            if attempt == self.retry.max_retries {
                break;
            }

            tracing::debug!(
                symbol,
                attempt = attempt + 1,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                missing,
                "Snapshot not ready, retrying"
            );
            metrics::record_query_retry(kind);
            tokio::time::sleep(delay).await;

            if self.retry.exponential_backoff {
                delay = delay.saturating_mul(2);
            }
        }

        metrics::record_query_exhausted(kind);
        let attempts = self.retry.max_retries + 1;
        let symbol = symbol.to_string();
        tracing::warn!(symbol = %symbol, attempts, missing, "Snapshot query exhausted");

        Err(if missing {
            QueryError::NotFound { symbol, attempts }
        } else {
            QueryError::NotPopulated { symbol, attempts }
        })
    }
}

#[async_trait]
impl OptionDataSource for SnapshotQuery {
    async fn option_snapshot(&self, symbol: &str) -> Result<OptionData, QueryError> {
        Self::option_snapshot(self, symbol).await
    }

    async fn underlying_price(&self, symbol: &str) -> Result<f64, QueryError> {
        Self::underlying_price(self, symbol).await
    }
}

/// The live feed doubles as a quote source for filter seeding.
#[async_trait]
impl QuoteSource for SnapshotQuery {
    async fn last_price(&self, underlying: &str) -> Result<f64, PortError> {
        Self::underlying_price(self, underlying)
            .await
            .map_err(|e| PortError::Unavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::streaming::{FeedEvent, Greeks, Quote, Trade};

    const PUT: &str = ".SPY240315P500";

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            delay: Duration::from_millis(10),
            exponential_backoff: false,
        }
    }

    fn populated_events() -> Vec<FeedEvent> {
        vec![
            FeedEvent::Quote(Quote {
                event_symbol: PUT.to_string(),
                bid_price: Some(1.0),
                ask_price: Some(1.1),
            }),
            FeedEvent::Greeks(Greeks {
                event_symbol: PUT.to_string(),
                delta: Some(-0.2),
                ..Greeks::default()
            }),
        ]
    }

    fn subscribed_store() -> Arc<SubscriptionStore> {
        let store = Arc::new(SubscriptionStore::new());
        store.update_subscriptions("SPY", &[PUT], |_| true);
        store
    }

    #[test]
    fn default_retry_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.delay, Duration::from_secs(1));
        assert!(!config.exponential_backoff);
    }

    #[tokio::test]
    async fn populated_snapshot_returns_immediately() {
        let store = subscribed_store();
        store.apply_events(populated_events());
        let query = SnapshotQuery::new(store, fast_retry(0));
        let data = query.option_snapshot(PUT).await.unwrap();
        assert_eq!(data.delta(), Some(-0.2));
    }

    #[tokio::test]
    async fn missing_symbol_reports_not_found() {
        let query = SnapshotQuery::new(Arc::new(SubscriptionStore::new()), fast_retry(2));
        let err = query.option_snapshot(PUT).await.unwrap_err();
        assert_eq!(
            err,
            QueryError::NotFound {
                symbol: PUT.to_string(),
                attempts: 3
            }
        );
    }

    #[tokio::test]
    async fn empty_entry_reports_not_populated() {
        let query = SnapshotQuery::new(subscribed_store(), fast_retry(1));
        let err = query.option_snapshot(PUT).await.unwrap_err();
        assert!(matches!(err, QueryError::NotPopulated { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn waits_for_feed_to_populate() {
        let store = subscribed_store();
        let query = SnapshotQuery::new(Arc::clone(&store), fast_retry(20));

        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(35)).await;
            store.apply_events(populated_events());
        });

        let data = query.option_snapshot(PUT).await.unwrap();
        assert!(data.is_populated());
        writer.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn exponential_backoff_doubles_delay() {
        let query = SnapshotQuery::new(
            subscribed_store(),
            RetryConfig {
                max_retries: 3,
                delay: Duration::from_millis(100),
                exponential_backoff: true,
            },
        );
        let started = tokio::time::Instant::now();
        let _ = query.option_snapshot(PUT).await;
        // 100 + 200 + 400
        assert_eq!(started.elapsed(), Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn fixed_delay_without_backoff() {
        let query = SnapshotQuery::new(
            subscribed_store(),
            RetryConfig {
                max_retries: 3,
                delay: Duration::from_millis(100),
                exponential_backoff: false,
            },
        );
        let started = tokio::time::Instant::now();
        let _ = query.option_snapshot(PUT).await;
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn underlying_price_from_trade() {
        let store = subscribed_store();
        store.apply_events([FeedEvent::Trade(Trade {
            event_symbol: "SPY".to_string(),
            price: Some(501.25),
            size: Some(1.0),
        })]);
        let query = SnapshotQuery::new(store, fast_retry(0));
        assert_eq!(query.underlying_price("SPY").await.unwrap(), 501.25);
        assert_eq!(QuoteSource::last_price(&query, "SPY").await.unwrap(), 501.25);
    }

    #[tokio::test]
    async fn underlying_without_trade_is_not_populated() {
        let query = SnapshotQuery::new(subscribed_store(), fast_retry(0));
        let err = query.underlying_price("SPY").await.unwrap_err();
        assert!(matches!(err, QueryError::NotPopulated { attempts: 1, .. }));
    }
}
