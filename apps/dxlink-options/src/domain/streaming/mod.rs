//! Market Data Event Types
//!
//! Codec-agnostic records for the feed events the client consumes, and the
//! per-symbol snapshots assembled from them.
//!
//! Every numeric field is optional: the feed sends `NaN`/`Infinity`
//! sentinels or omits fields entirely, and a freshly subscribed symbol has
//! no data at all. Sentinels decode to the matching `f64` special value;
//! absent fields decode to `None`. Nothing decodes to zero by default.

use serde::{Deserialize, Serialize};

// =============================================================================
// Event Types
// =============================================================================

/// Feed event types, with their compact field layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// Best bid/offer.
    Quote,
    /// Last sale.
    Trade,
    /// Option sensitivities.
    Greeks,
    /// OHLCV bar.
    Candle,
}

impl EventType {
    /// Wire tag.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Quote => "Quote",
            Self::Trade => "Trade",
            Self::Greeks => "Greeks",
            Self::Candle => "Candle",
        }
    }

    /// Look up an event type by wire tag.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "Quote" => Some(Self::Quote),
            "Trade" => Some(Self::Trade),
            "Greeks" => Some(Self::Greeks),
            "Candle" => Some(Self::Candle),
            _ => None,
        }
    }

    /// Field names requested in compact format, in positional order.
    #[must_use]
    pub const fn fields(self) -> &'static [&'static str] {
        match self {
            Self::Quote => &["eventType", "eventSymbol", "bidPrice", "askPrice"],
            Self::Trade => &["eventType", "eventSymbol", "price", "size"],
            Self::Greeks => &[
                "eventType",
                "eventSymbol",
                "price",
                "volatility",
                "delta",
                "gamma",
                "theta",
                "rho",
                "vega",
            ],
            Self::Candle => &[
                "eventType",
                "eventSymbol",
                "time",
                "open",
                "high",
                "low",
                "close",
                "volume",
                "impVolatility",
                "openInterest",
            ],
        }
    }

    /// Number of positional values per record.
    #[must_use]
    pub const fn arity(self) -> usize {
        self.fields().len()
    }
}

// =============================================================================
// Event Records
// =============================================================================

/// Best bid/offer for one symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Feed symbol.
    pub event_symbol: String,
    /// Best bid.
    pub bid_price: Option<f64>,
    /// Best ask.
    pub ask_price: Option<f64>,
}

/// Last sale for one symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Feed symbol.
    pub event_symbol: String,
    /// Last price.
    pub price: Option<f64>,
    /// Last size.
    pub size: Option<f64>,
}

/// Option sensitivities for one symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Greeks {
    /// Feed symbol.
    pub event_symbol: String,
    /// Theoretical option price.
    pub price: Option<f64>,
    /// Implied volatility.
    pub volatility: Option<f64>,
    /// Delta.
    pub delta: Option<f64>,
    /// Gamma.
    pub gamma: Option<f64>,
    /// Theta.
    pub theta: Option<f64>,
    /// Rho.
    pub rho: Option<f64>,
    /// Vega.
    pub vega: Option<f64>,
}

/// OHLCV bar for one symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Feed symbol.
    pub event_symbol: String,
    /// Bar start, epoch milliseconds.
    pub time: Option<i64>,
    /// Open.
    pub open: Option<f64>,
    /// High.
    pub high: Option<f64>,
    /// Low.
    pub low: Option<f64>,
    /// Close.
    pub close: Option<f64>,
    /// Volume.
    pub volume: Option<f64>,
    /// Implied volatility.
    pub imp_volatility: Option<f64>,
    /// Open interest.
    pub open_interest: Option<f64>,
}

/// A decoded feed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeedEvent {
    /// Quote update.
    Quote(Quote),
    /// Trade update.
    Trade(Trade),
    /// Greeks update.
    Greeks(Greeks),
    /// Candle update.
    Candle(Candle),
}

impl FeedEvent {
    /// Symbol the event belongs to.
    #[must_use]
    pub fn symbol(&self) -> &str {
        match self {
            Self::Quote(q) => &q.event_symbol,
            Self::Trade(t) => &t.event_symbol,
            Self::Greeks(g) => &g.event_symbol,
            Self::Candle(c) => &c.event_symbol,
        }
    }

    /// Event type of the record.
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        match self {
            Self::Quote(_) => EventType::Quote,
            Self::Trade(_) => EventType::Trade,
            Self::Greeks(_) => EventType::Greeks,
            Self::Candle(_) => EventType::Candle,
        }
    }
}

// =============================================================================
// Snapshots
// =============================================================================

/// Latest known data for an underlying symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnderlyingData {
    /// Latest trade, if any has arrived.
    pub trade: Option<Trade>,
    /// Latest candle, if any has arrived.
    pub candle: Option<Candle>,
}

impl UnderlyingData {
    /// Latest trade price when it is a concrete number.
    #[must_use]
    pub fn price(&self) -> Option<f64> {
        self.trade
            .as_ref()
            .and_then(|t| t.price)
            .filter(|p| p.is_finite())
    }
}

/// Latest known data for an option symbol.
///
/// Quote and Greeks updates own disjoint halves of the record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionData {
    /// Latest quote, if any has arrived.
    pub quote: Option<Quote>,
    /// Latest Greeks, if any have arrived.
    pub greeks: Option<Greeks>,
}

impl OptionData {
    /// Whether the record carries a usable bid, ask and delta.
    ///
    /// Bid and ask must both be present, finite and non-zero; delta must be
    /// present and finite.
    #[must_use]
    pub fn is_populated(&self) -> bool {
        let usable = |v: Option<f64>| v.is_some_and(|v| v.is_finite() && v != 0.0);
        let quoted = self
            .quote
            .as_ref()
            .is_some_and(|q| usable(q.bid_price) && usable(q.ask_price));
        quoted && self.delta().is_some()
    }

    /// Delta when it is a concrete number.
    #[must_use]
    pub fn delta(&self) -> Option<f64> {
        self.greeks
            .as_ref()
            .and_then(|g| g.delta)
            .filter(|d| d.is_finite())
    }

    /// Midpoint of bid and ask.
    #[must_use]
    pub fn mid_price(&self) -> Option<f64> {
        let quote = self.quote.as_ref()?;
        let mid = (quote.bid_price? + quote.ask_price?) / 2.0;
        mid.is_finite().then_some(mid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(bid: Option<f64>, ask: Option<f64>) -> Quote {
        Quote {
            event_symbol: ".SPY240315P500".to_string(),
            bid_price: bid,
            ask_price: ask,
        }
    }

    fn greeks(delta: Option<f64>) -> Greeks {
        Greeks {
            event_symbol: ".SPY240315P500".to_string(),
            delta,
            ..Greeks::default()
        }
    }

    #[test]
    fn arity_matches_field_lists() {
        assert_eq!(EventType::Quote.arity(), 4);
        assert_eq!(EventType::Trade.arity(), 4);
        assert_eq!(EventType::Greeks.arity(), 9);
        assert_eq!(EventType::Candle.arity(), 10);
    }

    #[test]
    fn tag_round_trip() {
        for event_type in [
            EventType::Quote,
            EventType::Trade,
            EventType::Greeks,
            EventType::Candle,
        ] {
            assert_eq!(EventType::from_tag(event_type.tag()), Some(event_type));
        }
        assert_eq!(EventType::from_tag("TimeAndSale"), None);
    }

    #[test]
    fn empty_option_is_not_populated() {
        assert!(!OptionData::default().is_populated());
    }

    #[test]
    fn populated_requires_quote_and_delta() {
        let data = OptionData {
            quote: Some(quote(Some(1.10), Some(1.20))),
            greeks: Some(greeks(Some(-0.25))),
        };
        assert!(data.is_populated());
        assert_eq!(data.delta(), Some(-0.25));
    }

    #[test]
    fn zero_bid_is_not_populated() {
        let data = OptionData {
            quote: Some(quote(Some(0.0), Some(0.05))),
            greeks: Some(greeks(Some(-0.01))),
        };
        assert!(!data.is_populated());
    }

    #[test]
    fn nan_delta_is_not_populated() {
        let data = OptionData {
            quote: Some(quote(Some(1.0), Some(1.1))),
            greeks: Some(greeks(Some(f64::NAN))),
        };
        assert!(!data.is_populated());
        assert_eq!(data.delta(), None);
    }

    #[test]
    fn mid_price_averages_bid_ask() {
        let data = OptionData {
            quote: Some(quote(Some(1.0), Some(1.5))),
            greeks: None,
        };
        assert_eq!(data.mid_price(), Some(1.25));
    }

    #[test]
    fn underlying_price_ignores_sentinels() {
        let mut data = UnderlyingData {
            trade: Some(Trade {
                event_symbol: "SPY".to_string(),
                price: Some(f64::INFINITY),
                size: None,
            }),
            candle: None,
        };
        assert_eq!(data.price(), None);

        if let Some(trade) = data.trade.as_mut() {
            trade.price = Some(648.37);
        }
        assert_eq!(data.price(), Some(648.37));
    }
}
