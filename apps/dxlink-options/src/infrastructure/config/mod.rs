//! Configuration Module
//!
//! Environment-driven settings and the configuration-backed collaborator
//! sources.

mod settings;
mod sources;

pub use settings::{
    ConfigError, EngineConfig, FilterSettings, QuerySettings, SessionSettings,
};
pub use sources::{ChainFile, StaticHolidays};
