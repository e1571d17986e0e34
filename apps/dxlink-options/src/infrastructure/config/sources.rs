//! Static Collaborator Sources
//!
//! Holiday calendar and option chain adapters backed by configuration, used
//! when no brokerage API is wired in.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::application::ports::{HolidaySource, InstrumentSource, PortError};

/// Holidays taken from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticHolidays {
    dates: Vec<NaiveDate>,
}

impl StaticHolidays {
    /// Create a source returning `dates`.
    #[must_use]
    pub const fn new(dates: Vec<NaiveDate>) -> Self {
        Self { dates }
    }
}

#[async_trait]
impl HolidaySource for StaticHolidays {
    async fn holidays(&self) -> Result<Vec<NaiveDate>, PortError> {
        Ok(self.dates.clone())
    }
}

/// Option chains read from a JSON file of `{"SPY": [".SPY240315C500", ...]}`.
///
/// The file is re-read on every lookup so it can be refreshed externally.
#[derive(Debug, Clone)]
pub struct ChainFile {
    path: PathBuf,
}

impl ChainFile {
    /// Create a source reading `path`.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    async fn load(&self) -> Result<HashMap<String, Vec<String>>, PortError> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            PortError::Unavailable(format!("reading {}: {e}", self.path.display()))
        })?;
        serde_json::from_str(&raw)
            .map_err(|e| PortError::Rejected(format!("parsing {}: {e}", self.path.display())))
    }
}

#[async_trait]
impl InstrumentSource for ChainFile {
    async fn option_symbols(&self, underlying: &str) -> Result<Vec<String>, PortError> {
        let mut chains = self.load().await?;
        chains
            .remove(underlying)
            .ok_or_else(|| PortError::Unavailable(format!("no option chain for {underlying}")))
    }
}
