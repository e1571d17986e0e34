#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! DXLink Options - Streaming Market Data and Strike Resolution
//!
//! Maintains one DXLink WebSocket session carrying underlying trades and
//! option quotes/Greeks, keeps the latest snapshot per subscribed symbol,
//! and resolves option strikes against live deltas.
//!
//! # Layers (inside to outside)
//!
//! - **Domain**: Pure types and rules
//!   - `symbol`: Option symbol codec (compact feed and padded exchange notation)
//!   - `calendar`: Trading calendar and expiration arithmetic
//!   - `streaming`: Feed event records and per-symbol snapshots
//!   - `subscription`: Subscription store and option filters
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Collaborator interfaces (holidays, quotes, chains, feed)
//!   - `services`: Retrying snapshot queries, strike resolver, chain subscriptions
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `dxlink`: Protocol messages, codec, handshake, keepalive, session
//!   - `config`: Environment configuration and static sources
//!   - `metrics`: Prometheus instrumentation
//!   - `telemetry`: Tracing subscriber and OTLP export
//!
//! # Data Flow
//!
//! ```text
//!                 FEED_DATA          apply_events
//! DXLink WS ───► DxLinkSession ───► SubscriptionStore ◄─── SnapshotQuery ◄─── StrikeResolver
//!                     ▲                                        (retry)         (delta walk)
//!                     └── FEED_SUBSCRIPTION ◄── SubscriptionService
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::calendar::TradingCalendar;
pub use domain::streaming::{FeedEvent, OptionData, UnderlyingData};
pub use domain::subscription::{ExpirationFilter, OptionFilter, SubscriptionStore};
pub use domain::symbol::{OptionSymbol, OptionType, SymbolError};

// Application services
pub use application::services::{
    ResolveError, ResolvedOption, ResolverConfig, RetryConfig, SnapshotQuery, StrikeRequest,
    StrikeResolver, SubscriptionService,
};

// Infrastructure config
pub use infrastructure::config::{
    ConfigError, EngineConfig, FilterSettings, QuerySettings, SessionSettings,
};

// DXLink session
pub use infrastructure::dxlink::{
    ConnectionState, DxLinkSession, SessionConfig, SessionError, SessionState,
};

// Metrics
pub use infrastructure::metrics::{MetricsError, init_metrics};

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
