//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with external systems.

/// Port interfaces for external collaborators and data sources.
pub mod ports;

/// Query, strike resolution and subscription services.
pub mod services;
