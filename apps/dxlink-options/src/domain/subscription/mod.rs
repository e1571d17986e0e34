//! Subscription Store
//!
//! In-memory table of the latest snapshot per subscribed symbol, split into
//! underlyings (trade + candle) and options (quote + Greeks).
//!
//! # Design
//!
//! A key's presence means "subscribed", not "populated": entries start empty
//! and fill as feed events arrive. Both tables sit behind one
//! reader/writer lock so a reset empties them atomically. Feed ingest takes
//! the write lock once per decoded message; readers clone snapshots out so
//! no lock is held across an await point.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::domain::streaming::{FeedEvent, OptionData, UnderlyingData};
use crate::domain::symbol::OptionSymbol;

// =============================================================================
// Filters
// =============================================================================

/// Inclusive strike window around a market price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceRange {
    /// Lowest accepted strike.
    pub lower: f64,
    /// Highest accepted strike.
    pub upper: f64,
}

impl PriceRange {
    /// Window of `pct` percent either side of `price`.
    #[must_use]
    pub fn around(price: f64, pct: f64) -> Self {
        Self {
            lower: price * (1.0 - pct / 100.0),
            upper: price * (1.0 + pct / 100.0),
        }
    }

    /// Whether `strike` falls inside the window.
    #[must_use]
    pub fn contains(&self, strike: Decimal) -> bool {
        strike
            .to_f64()
            .is_some_and(|s| s >= self.lower && s <= self.upper)
    }
}

/// Expiration constraint for option candidates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ExpirationFilter {
    /// No constraint.
    #[default]
    Any,
    /// Expiring on or before the cutoff date.
    Until(NaiveDate),
    /// Expiring on one of the listed dates.
    OnDates(BTreeSet<NaiveDate>),
}

impl ExpirationFilter {
    /// Whether `expiration` is accepted.
    #[must_use]
    pub fn accepts(&self, expiration: NaiveDate) -> bool {
        match self {
            Self::Any => true,
            Self::Until(cutoff) => expiration <= *cutoff,
            Self::OnDates(dates) => dates.contains(&expiration),
        }
    }
}

/// Combined price-range and expiration filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionFilter {
    /// Strike window, if any.
    pub price_range: Option<PriceRange>,
    /// Expiration constraint.
    pub expirations: ExpirationFilter,
}

impl OptionFilter {
    /// Accept everything.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Restrict strikes to `pct` percent around `price`.
    #[must_use]
    pub fn with_price_range(mut self, price: f64, pct: f64) -> Self {
        self.price_range = Some(PriceRange::around(price, pct));
        self
    }

    /// Restrict expirations.
    #[must_use]
    pub fn with_expirations(mut self, expirations: ExpirationFilter) -> Self {
        self.expirations = expirations;
        self
    }

    /// Whether `symbol` passes every configured constraint.
    #[must_use]
    pub fn matches(&self, symbol: &OptionSymbol) -> bool {
        self.price_range
            .is_none_or(|range| range.contains(symbol.strike()))
            && self.expirations.accepts(symbol.expiration())
    }
}

// =============================================================================
// Update Results
// =============================================================================

/// Outcome of an [`SubscriptionStore::update_subscriptions`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionUpdate {
    /// Whether the underlying was newly added.
    pub underlying_added: bool,
    /// Option symbols newly added, in candidate order.
    pub added: Vec<String>,
    /// Candidates that passed the filter but were already subscribed.
    pub existing: usize,
    /// Candidates rejected by the filter.
    pub filtered_out: usize,
    /// Candidates that could not be parsed.
    pub rejected: Vec<String>,
}

/// Outcome of applying a batch of feed events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    /// Events written into a subscribed entry.
    pub applied: usize,
    /// Events for symbols that are not subscribed.
    pub dropped: usize,
}

// =============================================================================
// Store
// =============================================================================

#[derive(Debug, Default)]
struct Tables {
    underlyings: HashMap<String, UnderlyingData>,
    options: HashMap<String, OptionData>,
}

/// Shared table of the latest snapshot per subscribed symbol.
#[derive(Debug, Default)]
pub struct SubscriptionStore {
    tables: RwLock<Tables>,
}

impl SubscriptionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty both tables atomically.
    pub fn reset_data(&self) {
        let mut tables = self.tables.write();
        tables.underlyings.clear();
        tables.options.clear();
    }

    /// Subscribe an underlying symbol. Returns `true` if it was not present.
    pub fn subscribe_underlying(&self, symbol: &str) -> bool {
        let mut tables = self.tables.write();
        if tables.underlyings.contains_key(symbol) {
            return false;
        }
        tables
            .underlyings
            .insert(symbol.to_string(), UnderlyingData::default());
        true
    }

    /// Subscribe `underlying` and every candidate option accepted by `filter`.
    ///
    /// Candidates are compact feed symbols. Each accepted symbol starts as an
    /// empty record; symbols already present keep their data.
    pub fn update_subscriptions<S, F>(
        &self,
        underlying: &str,
        candidates: &[S],
        filter: F,
    ) -> SubscriptionUpdate
    where
        S: AsRef<str>,
        F: Fn(&OptionSymbol) -> bool,
    {
        let mut update = SubscriptionUpdate::default();
        let mut accepted = Vec::with_capacity(candidates.len());

        // Parse and filter before taking the write lock.
        for candidate in candidates {
            let raw = candidate.as_ref();
            match OptionSymbol::parse_compact(raw) {
                Ok(symbol) if filter(&symbol) => accepted.push(raw.to_string()),
                Ok(_) => update.filtered_out += 1,
                Err(e) => {
                    tracing::error!(symbol = raw, error = %e, "Unable to parse option candidate");
                    update.rejected.push(raw.to_string());
                }
            }
        }

        let mut tables = self.tables.write();
        if !tables.underlyings.contains_key(underlying) {
            tables
                .underlyings
                .insert(underlying.to_string(), UnderlyingData::default());
            update.underlying_added = true;
        }
        for symbol in accepted {
            if tables.options.contains_key(&symbol) {
                update.existing += 1;
            } else {
                tables.options.insert(symbol.clone(), OptionData::default());
                update.added.push(symbol);
            }
        }
        drop(tables);

        tracing::debug!(
            underlying,
            candidates = candidates.len(),
            added = update.added.len(),
            filtered_out = update.filtered_out,
            rejected = update.rejected.len(),
            "Option subscriptions updated"
        );

        update
    }

    /// Write a batch of feed events under one exclusive lock.
    ///
    /// Each event replaces only the sub-record its type owns. Events for
    /// symbols that are not subscribed are dropped.
    pub fn apply_events(&self, events: impl IntoIterator<Item = FeedEvent>) -> ApplyStats {
        let mut stats = ApplyStats::default();
        let mut tables = self.tables.write();

        for event in events {
            let applied = match event {
                FeedEvent::Quote(quote) => tables
                    .options
                    .get_mut(&quote.event_symbol)
                    .map(|entry| entry.quote = Some(quote))
                    .is_some(),
                FeedEvent::Greeks(greeks) => tables
                    .options
                    .get_mut(&greeks.event_symbol)
                    .map(|entry| entry.greeks = Some(greeks))
                    .is_some(),
                FeedEvent::Trade(trade) => tables
                    .underlyings
                    .get_mut(&trade.event_symbol)
                    .map(|entry| entry.trade = Some(trade))
                    .is_some(),
                FeedEvent::Candle(candle) => tables
                    .underlyings
                    .get_mut(&candle.event_symbol)
                    .map(|entry| entry.candle = Some(candle))
                    .is_some(),
            };

            if applied {
                stats.applied += 1;
            } else {
                stats.dropped += 1;
            }
        }

        stats
    }

    /// Clone of the option record, if subscribed.
    #[must_use]
    pub fn option_snapshot(&self, symbol: &str) -> Option<OptionData> {
        self.tables.read().options.get(symbol).cloned()
    }

    /// Clone of the underlying record, if subscribed.
    #[must_use]
    pub fn underlying_snapshot(&self, symbol: &str) -> Option<UnderlyingData> {
        self.tables.read().underlyings.get(symbol).cloned()
    }

    /// Whether an option symbol is subscribed.
    #[must_use]
    pub fn has_option(&self, symbol: &str) -> bool {
        self.tables.read().options.contains_key(symbol)
    }

    /// Subscribed underlying symbols, sorted.
    #[must_use]
    pub fn underlying_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.tables.read().underlyings.keys().cloned().collect();
        symbols.sort_unstable();
        symbols
    }

    /// Subscribed option symbols, sorted.
    #[must_use]
    pub fn option_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.tables.read().options.keys().cloned().collect();
        symbols.sort_unstable();
        symbols
    }

    /// `(underlyings, options)` entry counts.
    #[must_use]
    pub fn counts(&self) -> (usize, usize) {
        let tables = self.tables.read();
        (tables.underlyings.len(), tables.options.len())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::streaming::{Candle, Greeks, Quote, Trade};
    use rust_decimal_macros::dec;

    const PUT: &str = ".SPY240315P500";

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn store_with(symbols: &[&str]) -> SubscriptionStore {
        let store = SubscriptionStore::new();
        store.update_subscriptions("SPY", symbols, |_| true);
        store
    }

    fn quote(symbol: &str, bid: f64, ask: f64) -> FeedEvent {
        FeedEvent::Quote(Quote {
            event_symbol: symbol.to_string(),
            bid_price: Some(bid),
            ask_price: Some(ask),
        })
    }

    fn greeks(symbol: &str, delta: f64) -> FeedEvent {
        FeedEvent::Greeks(Greeks {
            event_symbol: symbol.to_string(),
            delta: Some(delta),
            ..Greeks::default()
        })
    }

    #[test]
    fn subscribed_entries_start_empty() {
        let store = store_with(&[PUT]);
        assert_eq!(store.option_snapshot(PUT), Some(OptionData::default()));
        assert_eq!(store.underlying_snapshot("SPY"), Some(UnderlyingData::default()));
    }

    #[test]
    fn greeks_then_quote_keeps_both() {
        let store = store_with(&[PUT]);
        store.apply_events([greeks(PUT, -0.31)]);
        store.apply_events([quote(PUT, 2.10, 2.15)]);

        let data = store.option_snapshot(PUT).unwrap();
        assert_eq!(data.delta(), Some(-0.31));
        assert_eq!(data.quote.as_ref().and_then(|q| q.bid_price), Some(2.10));
        assert!(data.is_populated());
    }

    #[test]
    fn later_event_replaces_earlier_of_same_type() {
        let store = store_with(&[PUT]);
        store.apply_events([quote(PUT, 1.0, 1.1), quote(PUT, 1.2, 1.3)]);
        let data = store.option_snapshot(PUT).unwrap();
        assert_eq!(data.quote.unwrap().ask_price, Some(1.3));
    }

    #[test]
    fn events_for_unknown_symbols_are_dropped() {
        let store = store_with(&[PUT]);
        let stats = store.apply_events([
            quote(".QQQ240315C400", 1.0, 1.1),
            FeedEvent::Trade(Trade {
                event_symbol: "QQQ".to_string(),
                price: Some(400.0),
                size: Some(10.0),
            }),
            quote(PUT, 1.0, 1.1),
        ]);
        assert_eq!(stats, ApplyStats { applied: 1, dropped: 2 });
        assert!(!store.has_option(".QQQ240315C400"));
    }

    #[test]
    fn trade_and_candle_fill_underlying() {
        let store = store_with(&[]);
        store.apply_events([
            FeedEvent::Trade(Trade {
                event_symbol: "SPY".to_string(),
                price: Some(648.37),
                size: Some(100.0),
            }),
            FeedEvent::Candle(Candle {
                event_symbol: "SPY".to_string(),
                close: Some(648.0),
                ..Candle::default()
            }),
        ]);
        let data = store.underlying_snapshot("SPY").unwrap();
        assert_eq!(data.price(), Some(648.37));
        assert_eq!(data.candle.unwrap().close, Some(648.0));
    }

    #[test]
    fn reset_empties_both_tables() {
        let store = store_with(&[PUT]);
        store.reset_data();
        assert_eq!(store.counts(), (0, 0));
        assert_eq!(store.option_snapshot(PUT), None);
    }

    #[test]
    fn update_keeps_existing_data() {
        let store = store_with(&[PUT]);
        store.apply_events([quote(PUT, 1.0, 1.1)]);
        let update = store.update_subscriptions("SPY", &[PUT], |_| true);
        assert_eq!(update.existing, 1);
        assert!(update.added.is_empty());
        assert!(!update.underlying_added);
        assert!(store.option_snapshot(PUT).unwrap().quote.is_some());
    }

    #[test]
    fn update_reports_rejected_and_filtered() {
        let store = SubscriptionStore::new();
        let filter = OptionFilter::any().with_price_range(500.0, 5.0);
        let update = store.update_subscriptions(
            "SPY",
            &[PUT, ".SPY240315P600", "garbage"],
            |s| filter.matches(s),
        );
        assert!(update.underlying_added);
        assert_eq!(update.added, vec![PUT.to_string()]);
        assert_eq!(update.filtered_out, 1);
        assert_eq!(update.rejected, vec!["garbage".to_string()]);
        assert_eq!(store.option_symbols(), vec![PUT.to_string()]);
        assert_eq!(store.underlying_symbols(), vec!["SPY".to_string()]);
    }

    #[test]
    fn price_range_is_inclusive() {
        let range = PriceRange::around(100.0, 10.0);
        assert!(range.contains(dec!(90)));
        assert!(range.contains(dec!(110)));
        assert!(!range.contains(dec!(110.5)));
        assert!(!range.contains(dec!(89.5)));
    }

    #[test]
    fn expiration_filters() {
        let cutoff = ExpirationFilter::Until(date(2024, 3, 15));
        assert!(cutoff.accepts(date(2024, 3, 15)));
        assert!(!cutoff.accepts(date(2024, 3, 18)));

        let dates = ExpirationFilter::OnDates([date(2024, 3, 15)].into_iter().collect());
        assert!(dates.accepts(date(2024, 3, 15)));
        assert!(!dates.accepts(date(2024, 3, 14)));

        assert!(ExpirationFilter::Any.accepts(date(2030, 1, 1)));
    }

    #[test]
    fn combined_filter() {
        let filter = OptionFilter::any()
            .with_price_range(500.0, 2.0)
            .with_expirations(ExpirationFilter::Until(date(2024, 3, 20)));
        let inside = OptionSymbol::parse_compact(".SPY240315P505").unwrap();
        let late = OptionSymbol::parse_compact(".SPY240419P505").unwrap();
        let far = OptionSymbol::parse_compact(".SPY240315P520").unwrap();
        assert!(filter.matches(&inside));
        assert!(!filter.matches(&late));
        assert!(!filter.matches(&far));
    }

    #[test]
    fn concurrent_readers_and_writer() {
        use std::sync::Arc;

        let store = Arc::new(store_with(&[PUT]));
        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 0..1_000 {
                    let bid = f64::from(i) / 100.0 + 1.0;
                    store.apply_events([quote(PUT, bid, bid + 0.05)]);
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        let snapshot = store.option_snapshot(PUT).unwrap();
                        if let Some(q) = snapshot.quote {
                            assert!(q.ask_price.unwrap() > q.bid_price.unwrap());
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
