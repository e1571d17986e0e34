//! Domain Layer - Core market data types and business logic.
//!
//! This layer contains the option symbol codec, trading calendar, feed
//! event types and the subscription store. Nothing here performs I/O.

/// Option symbol notations and strike arithmetic.
pub mod symbol;

/// Weekend and holiday aware date arithmetic.
pub mod calendar;

/// Feed event records and per-symbol snapshots.
pub mod streaming;

/// Subscription store and option filters.
pub mod subscription;
