//! Option Chain Subscription Service
//!
//! Adds filtered option subscriptions for an underlying: fetch the chain,
//! keep strikes near the current price and the requested expirations,
//! record them in the store, then push the new symbols to the live feed.

use std::sync::Arc;

use crate::application::ports::{
    FeedSubscriber, HolidaySource, InstrumentSource, PortError, QuoteSource,
};
use crate::domain::calendar::TradingCalendar;
use crate::domain::subscription::{
    ExpirationFilter, OptionFilter, SubscriptionStore, SubscriptionUpdate,
};

/// Composes the chain, quote and feed collaborators around the store.
#[derive(Clone)]
pub struct SubscriptionService {
    store: Arc<SubscriptionStore>,
    instruments: Arc<dyn InstrumentSource>,
    quotes: Arc<dyn QuoteSource>,
    feed: Arc<dyn FeedSubscriber>,
}

impl std::fmt::Debug for SubscriptionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionService")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl SubscriptionService {
    /// Create the service.
    #[must_use]
    pub fn new(
        store: Arc<SubscriptionStore>,
        instruments: Arc<dyn InstrumentSource>,
        quotes: Arc<dyn QuoteSource>,
        feed: Arc<dyn FeedSubscriber>,
    ) -> Self {
        Self {
            store,
            instruments,
            quotes,
            feed,
        }
    }

    /// Subscribe to the options of `underlying` within `pct_range` percent
    /// of its price and matching `expirations`.
    ///
    /// # Errors
    ///
    /// Returns an error if the price or chain cannot be fetched, or the feed
    /// refuses the new subscriptions.
    pub async fn add_filtered_subscriptions(
        &self,
        underlying: &str,
        pct_range: f64,
        expirations: ExpirationFilter,
    ) -> Result<SubscriptionUpdate, PortError> {
        let price = self.quotes.last_price(underlying).await?;
        let candidates = self.instruments.option_symbols(underlying).await?;
        let filter = OptionFilter::any()
            .with_price_range(price, pct_range)
            .with_expirations(expirations);

        let update = self
            .store
            .update_subscriptions(underlying, &candidates, |s| filter.matches(s));

        let underlyings = if update.underlying_added {
            vec![underlying.to_string()]
        } else {
            Vec::new()
        };
        if !underlyings.is_empty() || !update.added.is_empty() {
            self.feed.subscribe(&underlyings, &update.added).await?;
        }

        tracing::info!(
            underlying,
            price,
            candidates = candidates.len(),
            added = update.added.len(),
            "Added filtered option subscriptions"
        );

        Ok(update)
    }
}

/// Build a trading calendar from a holiday source.
///
/// # Errors
///
/// Propagates the source's error.
pub async fn load_calendar(source: &dyn HolidaySource) -> Result<TradingCalendar, PortError> {
    let holidays = source.holidays().await?;
    Ok(TradingCalendar::new(holidays))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use parking_lot::Mutex;

    struct FixedChain(Vec<String>);

    #[async_trait]
    impl InstrumentSource for FixedChain {
        async fn option_symbols(&self, _underlying: &str) -> Result<Vec<String>, PortError> {
            Ok(self.0.clone())
        }
    }

    struct FixedPrice(f64);

    #[async_trait]
    impl QuoteSource for FixedPrice {
        async fn last_price(&self, _underlying: &str) -> Result<f64, PortError> {
            Ok(self.0)
        }
    }

    #[derive(Default)]
    struct RecordingFeed(Mutex<Vec<(Vec<String>, Vec<String>)>>);

    #[async_trait]
    impl FeedSubscriber for RecordingFeed {
        async fn subscribe(
            &self,
            underlyings: &[String],
            options: &[String],
        ) -> Result<(), PortError> {
            self.0.lock().push((underlyings.to_vec(), options.to_vec()));
            Ok(())
        }
    }

    struct FixedHolidays;

    #[async_trait]
    impl HolidaySource for FixedHolidays {
        async fn holidays(&self) -> Result<Vec<NaiveDate>, PortError> {
            Ok(vec![NaiveDate::from_ymd_opt(2025, 12, 25).unwrap()])
        }
    }

    fn chain() -> Vec<String> {
        [
            ".SPY250919P490",
            ".SPY250919P500",
            ".SPY250919P510",
            ".SPY251017P500",
            ".SPY250919P600",
        ]
        .iter()
        .map(ToString::to_string)
        .collect()
    }

    #[tokio::test]
    async fn subscribes_filtered_chain_and_notifies_feed() {
        let store = Arc::new(SubscriptionStore::new());
        let feed = Arc::new(RecordingFeed::default());
        let service = SubscriptionService::new(
            Arc::clone(&store),
            Arc::new(FixedChain(chain())),
            Arc::new(FixedPrice(500.0)),
            Arc::clone(&feed) as Arc<dyn FeedSubscriber>,
        );

        let cutoff = NaiveDate::from_ymd_opt(2025, 9, 30).unwrap();
        let update = service
            .add_filtered_subscriptions("SPY", 2.0, ExpirationFilter::Until(cutoff))
            .await
            .unwrap();

        assert_eq!(
            update.added,
            vec![".SPY250919P490", ".SPY250919P500", ".SPY250919P510"]
        );
        assert_eq!(update.filtered_out, 2);

        let calls = feed.0.lock().clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, vec!["SPY".to_string()]);
        assert_eq!(calls[0].1.len(), 3);
    }

    #[tokio::test]
    async fn repeated_call_sends_nothing_new() {
        let store = Arc::new(SubscriptionStore::new());
        let feed = Arc::new(RecordingFeed::default());
        let service = SubscriptionService::new(
            store,
            Arc::new(FixedChain(chain())),
            Arc::new(FixedPrice(500.0)),
            Arc::clone(&feed) as Arc<dyn FeedSubscriber>,
        );

        service
            .add_filtered_subscriptions("SPY", 2.0, ExpirationFilter::Any)
            .await
            .unwrap();
        let update = service
            .add_filtered_subscriptions("SPY", 2.0, ExpirationFilter::Any)
            .await
            .unwrap();

        assert!(update.added.is_empty());
        assert_eq!(update.existing, 4);
        assert_eq!(feed.0.lock().len(), 1);
    }

    #[tokio::test]
    async fn calendar_from_source() {
        let calendar = load_calendar(&FixedHolidays).await.unwrap();
        assert!(!calendar.is_trading_day(NaiveDate::from_ymd_opt(2025, 12, 25).unwrap()));
    }
}
