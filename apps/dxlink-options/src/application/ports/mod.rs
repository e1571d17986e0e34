//! Port Interfaces
//!
//! Defines the interfaces (ports) between the core and the systems around
//! it, following the Hexagonal Architecture pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - `HolidaySource`: market holiday calendar
//! - `QuoteSource`: current underlying price used to seed filters
//! - `InstrumentSource`: raw option chain for an underlying
//! - `FeedSubscriber`: pushes new subscriptions to the live feed
//!
//! ## Driver Ports (Inbound)
//!
//! - `OptionDataSource`: latest usable option/underlying data, consumed by
//!   the strike resolver and strategy code

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::streaming::OptionData;

// =============================================================================
// Errors
// =============================================================================

/// Errors raised by the retrying query layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// Symbol is not subscribed.
    #[error("{symbol} not found after {attempts} attempts")]
    NotFound {
        /// Requested symbol.
        symbol: String,
        /// Lookups performed.
        attempts: u32,
    },

    /// Symbol is subscribed but required fields never arrived.
    #[error("{symbol} not populated after {attempts} attempts")]
    NotPopulated {
        /// Requested symbol.
        symbol: String,
        /// Lookups performed.
        attempts: u32,
    },
}

impl QueryError {
    /// Symbol the query was for.
    #[must_use]
    pub fn symbol(&self) -> &str {
        match self {
            Self::NotFound { symbol, .. } | Self::NotPopulated { symbol, .. } => symbol,
        }
    }
}

/// Errors raised by external collaborators.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    /// Collaborator could not be reached or returned no data.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Collaborator rejected the request.
    #[error("rejected: {0}")]
    Rejected(String),
}

// =============================================================================
// Ports
// =============================================================================

/// Latest usable market data, waiting for the feed where necessary.
#[async_trait]
pub trait OptionDataSource: Send + Sync {
    /// Populated snapshot for an option in compact feed notation.
    async fn option_snapshot(&self, symbol: &str) -> Result<OptionData, QueryError>;

    /// Latest trade price for an underlying.
    async fn underlying_price(&self, symbol: &str) -> Result<f64, QueryError>;
}

/// Ordered list of market holidays (half days included).
#[async_trait]
pub trait HolidaySource: Send + Sync {
    /// All known holiday dates.
    async fn holidays(&self) -> Result<Vec<NaiveDate>, PortError>;
}

/// Current price of an underlying.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Last traded price.
    async fn last_price(&self, underlying: &str) -> Result<f64, PortError>;
}

/// Tradable option symbols for an underlying.
#[async_trait]
pub trait InstrumentSource: Send + Sync {
    /// Every listed option for `underlying`, in compact feed notation.
    async fn option_symbols(&self, underlying: &str) -> Result<Vec<String>, PortError>;
}

/// Live feed that accepts additional subscriptions.
#[async_trait]
pub trait FeedSubscriber: Send + Sync {
    /// Start streaming the given underlyings and options.
    async fn subscribe(&self, underlyings: &[String], options: &[String]) -> Result<(), PortError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_error_symbol() {
        let err = QueryError::NotPopulated {
            symbol: ".SPY240315P500".to_string(),
            attempts: 4,
        };
        assert_eq!(err.symbol(), ".SPY240315P500");
        assert_eq!(err.to_string(), ".SPY240315P500 not populated after 4 attempts");
    }
}
