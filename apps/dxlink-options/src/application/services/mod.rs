//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `SnapshotQuery`: retrying reads over the subscription store
//! - `StrikeResolver`: delta-targeted strike search
//! - `SubscriptionService`: filtered option chain subscriptions

pub mod query;
pub mod strike_resolver;
pub mod subscriptions;

pub use query::{RetryConfig, SnapshotQuery};
pub use strike_resolver::{
    ResolveError, ResolvedOption, ResolverConfig, StrikeRequest, StrikeResolver,
};
pub use subscriptions::{SubscriptionService, load_calendar};
