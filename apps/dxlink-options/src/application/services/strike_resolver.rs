//! Strike Resolver
//!
//! Finds the option strike whose delta sits closest to a target by walking
//! the chain one rounding increment at a time from a seed strike near the
//! underlying price.
//!
//! # Search Rules
//!
//! - The seed strike is the underlying price floored to the rounding
//!   increment (an increment of 0 or 1 floors to an integer). No data at the
//!   seed is a hard failure.
//! - If the seed delta is above the target the walk moves up in strike,
//!   otherwise down. Delta is assumed monotonic in strike near the seed.
//! - The walk stops at the first strictly worse distance and returns the
//!   previous candidate. Equal distances keep walking.
//! - Strikes without data are skipped and counted. The count never resets;
//!   reaching `max_attempts` fails with `NoOptionFound`.
//! - `max_steps` bounds the total walk length.

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;

use crate::application::ports::{OptionDataSource, QueryError};
use crate::domain::calendar::TradingCalendar;
use crate::domain::streaming::OptionData;
use crate::domain::symbol::{OptionSymbol, OptionType, SymbolError};

// =============================================================================
// Configuration
// =============================================================================

/// Bounds on a single resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Strikes without data tolerated before giving up.
    pub max_attempts: u32,
    /// Total strikes visited before giving up.
    pub max_steps: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            max_steps: 200,
        }
    }
}

// =============================================================================
// Requests and Results
// =============================================================================

/// Parameters for a delta-targeted strike search.
#[derive(Debug, Clone, PartialEq)]
pub struct StrikeRequest {
    /// Underlying ticker.
    pub underlying: String,
    /// Trading days from `start` to expiration.
    pub days_to_expiration: u32,
    /// Call or put.
    pub option_type: OptionType,
    /// Strike rounding increment (0 or 1 for whole strikes).
    pub round: Decimal,
    /// Target delta. Puts accept either sign.
    pub target_delta: f64,
    /// Date the expiration offset is counted from.
    pub start: NaiveDate,
}

/// A resolved contract with the data it was chosen on.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOption {
    /// Chosen contract.
    pub symbol: OptionSymbol,
    /// Snapshot at resolution time.
    pub data: OptionData,
    /// Observed delta.
    pub delta: f64,
    /// `|delta - target|`, zero for direct lookups.
    pub distance: f64,
}

/// Errors raised while resolving a strike.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// Underlying price could not be obtained.
    #[error("no price for {underlying}: {source}")]
    UnderlyingUnavailable {
        /// Underlying ticker.
        underlying: String,
        /// Query failure.
        source: QueryError,
    },

    /// Underlying price is not a usable positive number.
    #[error("invalid underlying price {0}")]
    InvalidPrice(f64),

    /// Rounding increment is negative.
    #[error("invalid rounding increment {0}")]
    InvalidIncrement(Decimal),

    /// Seed strike has no data to search against.
    #[error("no data at initial strike {symbol}: {source}")]
    InitialUnavailable {
        /// Seed contract.
        symbol: String,
        /// Query failure.
        source: QueryError,
    },

    /// Too many strikes without data.
    #[error("no option found for {underlying} after {attempts} failed lookups")]
    NoOptionFound {
        /// Underlying ticker.
        underlying: String,
        /// Failed lookups.
        attempts: u32,
    },

    /// Walk exceeded the step bound.
    #[error("strike search exceeded {0} steps")]
    StepLimit(u32),

    /// Strike arithmetic produced an invalid contract.
    #[error(transparent)]
    Symbol(#[from] SymbolError),
}

/// One visited point of the walk.
struct Candidate {
    symbol: OptionSymbol,
    data: OptionData,
    delta: f64,
    distance: f64,
}

impl From<Candidate> for ResolvedOption {
    fn from(c: Candidate) -> Self {
        Self {
            symbol: c.symbol,
            data: c.data,
            delta: c.delta,
            distance: c.distance,
        }
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// Delta-driven strike search over an [`OptionDataSource`].
#[derive(Clone)]
pub struct StrikeResolver {
    source: Arc<dyn OptionDataSource>,
    calendar: TradingCalendar,
    config: ResolverConfig,
}

impl std::fmt::Debug for StrikeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrikeResolver")
            .field("calendar", &self.calendar)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl StrikeResolver {
    /// Create a resolver.
    #[must_use]
    pub fn new(
        source: Arc<dyn OptionDataSource>,
        calendar: TradingCalendar,
        config: ResolverConfig,
    ) -> Self {
        Self {
            source,
            calendar,
            config,
        }
    }

    /// Search bounds.
    #[must_use]
    pub const fn config(&self) -> ResolverConfig {
        self.config
    }

    /// Expiration date `days` trading days after `start`.
    #[must_use]
    pub fn expiration(&self, start: NaiveDate, days: u32) -> NaiveDate {
        self.calendar.add_trading_days(start, days)
    }

    /// Find the strike whose delta is closest to the request's target.
    ///
    /// # Errors
    ///
    /// See [`ResolveError`]. A missing seed strike and an exhausted attempt
    /// budget are both definitive for this call.
    pub async fn resolve(&self, request: &StrikeRequest) -> Result<ResolvedOption, ResolveError> {
        let step = strike_step(request.round)?;
        let target = normalize_target(request.target_delta, request.option_type);
        let expiration = self.expiration(request.start, request.days_to_expiration);
        let price = self.underlying_price(&request.underlying).await?;
        let seed = OptionSymbol::new(
            request.underlying.clone(),
            expiration,
            request.option_type,
            floor_to_step(price, step)?,
        )?;

        let data = self
            .source
            .option_snapshot(&seed.to_compact())
            .await
            .map_err(|source| ResolveError::InitialUnavailable {
                symbol: seed.to_compact(),
                source,
            })?;
        let delta = observed_delta(&seed, &data)?;

        let step_up = delta > target;
        let mut best = Candidate {
            distance: (delta - target).abs(),
            symbol: seed,
            data,
            delta,
        };
        let mut current = best.symbol.clone();
        let mut attempts = 0u32;

        tracing::debug!(
            symbol = %best.symbol,
            delta,
            target,
            step_up,
            "Strike search seeded"
        );

        for _ in 0..self.config.max_steps {
            current = if step_up {
                current.increment_strike(step)
            } else {
                current.decrement_strike(step)
            }
            .inspect_err(|e| {
                tracing::warn!(error = %e, "Strike walk left the valid strike range");
            })?;

            let symbol = current.to_compact();
            let snapshot = self
                .source
                .option_snapshot(&symbol)
                .await
                .ok()
                .and_then(|data| data.delta().map(|delta| (data, delta)));

            let Some((data, delta)) = snapshot else {
                attempts += 1;
                tracing::debug!(symbol = %symbol, attempts, "No data at strike, skipping");
                if attempts >= self.config.max_attempts {
                    return Err(ResolveError::NoOptionFound {
                        underlying: request.underlying.clone(),
                        attempts,
                    });
                }
                continue;
            };

            let distance = (delta - target).abs();
            if distance > best.distance {
                tracing::info!(
                    symbol = %best.symbol,
                    delta = best.delta,
                    target,
                    "Strike resolved"
                );
                return Ok(best.into());
            }

            best = Candidate {
                symbol: current.clone(),
                data,
                delta,
                distance,
            };
        }

        Err(ResolveError::StepLimit(self.config.max_steps))
    }

    /// Contract `offset` away from the floored underlying price, no search.
    ///
    /// # Errors
    ///
    /// Returns an error if the price or the contract's data is unavailable.
    pub async fn resolve_by_offset(
        &self,
        request: &StrikeRequest,
        offset: Decimal,
    ) -> Result<ResolvedOption, ResolveError> {
        let step = strike_step(request.round)?;
        let expiration = self.expiration(request.start, request.days_to_expiration);
        let price = self.underlying_price(&request.underlying).await?;
        let symbol = OptionSymbol::new(
            request.underlying.clone(),
            expiration,
            request.option_type,
            floor_to_step(price, step)? + offset,
        )?;
        self.lookup(symbol).await
    }

    /// Contract `offset` away from an already chosen contract's strike.
    ///
    /// # Errors
    ///
    /// Returns an error if the strike is invalid or has no data.
    pub async fn resolve_relative(
        &self,
        anchor: &OptionSymbol,
        offset: Decimal,
    ) -> Result<ResolvedOption, ResolveError> {
        let symbol = anchor.with_strike(anchor.strike() + offset)?;
        self.lookup(symbol).await
    }

    async fn lookup(&self, symbol: OptionSymbol) -> Result<ResolvedOption, ResolveError> {
        let data = self
            .source
            .option_snapshot(&symbol.to_compact())
            .await
            .map_err(|source| ResolveError::InitialUnavailable {
                symbol: symbol.to_compact(),
                source,
            })?;
        let delta = observed_delta(&symbol, &data)?;
        Ok(ResolvedOption {
            symbol,
            data,
            delta,
            distance: 0.0,
        })
    }

    async fn underlying_price(&self, underlying: &str) -> Result<f64, ResolveError> {
        let price = self
            .source
            .underlying_price(underlying)
            .await
            .map_err(|source| ResolveError::UnderlyingUnavailable {
                underlying: underlying.to_string(),
                source,
            })?;
        if price.is_finite() && price > 0.0 {
            Ok(price)
        } else {
            Err(ResolveError::InvalidPrice(price))
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Strike increment for a rounding value; 0 and 1 both mean whole strikes.
fn strike_step(round: Decimal) -> Result<Decimal, ResolveError> {
    if round.is_sign_negative() && !round.is_zero() {
        return Err(ResolveError::InvalidIncrement(round));
    }
    if round.is_zero() || round == Decimal::ONE {
        Ok(Decimal::ONE)
    } else {
        Ok(round)
    }
}

/// Floor `price` to a multiple of `step`.
fn floor_to_step(price: f64, step: Decimal) -> Result<Decimal, ResolveError> {
    let price = Decimal::from_f64(price).ok_or(ResolveError::InvalidPrice(price))?;
    Ok((price / step).floor() * step)
}

/// Puts carry negative deltas; calls positive.
fn normalize_target(target: f64, option_type: OptionType) -> f64 {
    if option_type.is_put() {
        -target.abs()
    } else {
        target.abs()
    }
}

fn observed_delta(symbol: &OptionSymbol, data: &OptionData) -> Result<f64, ResolveError> {
    data.delta().ok_or_else(|| ResolveError::InitialUnavailable {
        symbol: symbol.to_compact(),
        source: QueryError::NotPopulated {
            symbol: symbol.to_compact(),
            attempts: 1,
        },
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::streaming::{Greeks, Quote};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn option_data(symbol: &str, delta: f64) -> OptionData {
        OptionData {
            quote: Some(Quote {
                event_symbol: symbol.to_string(),
                bid_price: Some(1.0),
                ask_price: Some(1.1),
            }),
            greeks: Some(Greeks {
                event_symbol: symbol.to_string(),
                delta: Some(delta),
                ..Greeks::default()
            }),
        }
    }

    /// Fixed table of deltas keyed by compact symbol.
    struct TableSource {
        price: f64,
        deltas: HashMap<String, f64>,
        calls: Mutex<Vec<String>>,
    }

    impl TableSource {
        fn new(price: f64, deltas: &[(&str, f64)]) -> Self {
            Self {
                price,
                deltas: deltas.iter().map(|(s, d)| ((*s).to_string(), *d)).collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl OptionDataSource for TableSource {
        async fn option_snapshot(&self, symbol: &str) -> Result<OptionData, QueryError> {
            self.calls.lock().push(symbol.to_string());
            self.deltas
                .get(symbol)
                .map(|d| option_data(symbol, *d))
                .ok_or_else(|| QueryError::NotFound {
                    symbol: symbol.to_string(),
                    attempts: 1,
                })
        }

        async fn underlying_price(&self, _symbol: &str) -> Result<f64, QueryError> {
            Ok(self.price)
        }
    }

    fn request(option_type: OptionType, round: Decimal, target: f64) -> StrikeRequest {
        StrikeRequest {
            underlying: "XSP".to_string(),
            days_to_expiration: 0,
            option_type,
            round,
            target_delta: target,
            // Friday
            start: date(2025, 9, 19),
        }
    }

    fn resolver(source: Arc<TableSource>, max_attempts: u32) -> StrikeResolver {
        StrikeResolver::new(
            source,
            TradingCalendar::default(),
            ResolverConfig {
                max_attempts,
                max_steps: 50,
            },
        )
    }

    #[test]
    fn strike_step_rules() {
        assert_eq!(strike_step(dec!(0)).unwrap(), dec!(1));
        assert_eq!(strike_step(dec!(1)).unwrap(), dec!(1));
        assert_eq!(strike_step(dec!(5)).unwrap(), dec!(5));
        assert_eq!(strike_step(dec!(0.5)).unwrap(), dec!(0.5));
        assert!(strike_step(dec!(-5)).is_err());
    }

    #[test]
    fn seed_strike_floors_to_increment() {
        assert_eq!(floor_to_step(648.37, dec!(5)).unwrap(), dec!(645));
        assert_eq!(floor_to_step(648.37, dec!(1)).unwrap(), dec!(648));
        assert_eq!(floor_to_step(650.0, dec!(5)).unwrap(), dec!(650));
        assert_eq!(floor_to_step(648.37, dec!(2.5)).unwrap(), dec!(647.5));
    }

    #[test]
    fn put_targets_are_negative() {
        assert_eq!(normalize_target(0.2, OptionType::Put), -0.2);
        assert_eq!(normalize_target(-0.2, OptionType::Put), -0.2);
        assert_eq!(normalize_target(-0.3, OptionType::Call), 0.3);
    }

    #[tokio::test]
    async fn put_walk_returns_closest_visited_strike() {
        // 645 -> 640 -> 635 -> 630: distances 0.08, 0.02, 0.01, 0.05
        let source = Arc::new(TableSource::new(
            648.37,
            &[
                (".XSP250919P645", -0.28),
                (".XSP250919P640", -0.22),
                (".XSP250919P635", -0.19),
                (".XSP250919P630", -0.15),
                (".XSP250919P625", -0.11),
            ],
        ));
        let resolved = resolver(Arc::clone(&source), 5)
            .resolve(&request(OptionType::Put, dec!(5), -0.20))
            .await
            .unwrap();

        assert_eq!(resolved.symbol.to_compact(), ".XSP250919P635");
        assert_eq!(resolved.delta, -0.19);
        assert!((resolved.distance - 0.01).abs() < 1e-9);
        assert_eq!(
            source.calls(),
            vec![
                ".XSP250919P645",
                ".XSP250919P640",
                ".XSP250919P635",
                ".XSP250919P630"
            ]
        );
    }

    #[tokio::test]
    async fn put_target_magnitude_is_accepted() {
        let source = Arc::new(TableSource::new(
            648.37,
            &[
                (".XSP250919P645", -0.28),
                (".XSP250919P640", -0.22),
                (".XSP250919P635", -0.19),
                (".XSP250919P630", -0.15),
            ],
        ));
        let resolved = resolver(source, 5)
            .resolve(&request(OptionType::Put, dec!(5), 0.20))
            .await
            .unwrap();
        assert_eq!(resolved.symbol.strike(), dec!(635));
    }

    #[tokio::test]
    async fn call_walk_steps_up() {
        let source = Arc::new(TableSource::new(
            100.4,
            &[
                (".XSP250919C100", 0.52),
                (".XSP250919C101", 0.45),
                (".XSP250919C102", 0.38),
                (".XSP250919C103", 0.31),
                (".XSP250919C104", 0.24),
            ],
        ));
        let resolved = resolver(source, 5)
            .resolve(&request(OptionType::Call, dec!(0), 0.30))
            .await
            .unwrap();
        assert_eq!(resolved.symbol.strike(), dec!(103));
    }

    #[tokio::test]
    async fn first_step_regression_returns_seed() {
        let source = Arc::new(TableSource::new(
            648.37,
            &[(".XSP250919P645", -0.21), (".XSP250919P640", -0.12)],
        ));
        let resolved = resolver(Arc::clone(&source), 5)
            .resolve(&request(OptionType::Put, dec!(5), -0.20))
            .await
            .unwrap();
        assert_eq!(resolved.symbol.to_compact(), ".XSP250919P645");
        assert_eq!(source.calls().len(), 2);
    }

    #[tokio::test]
    async fn missing_seed_is_hard_error() {
        let source = Arc::new(TableSource::new(648.37, &[(".XSP250919P640", -0.2)]));
        let err = resolver(Arc::clone(&source), 5)
            .resolve(&request(OptionType::Put, dec!(5), -0.20))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::InitialUnavailable { .. }));
        assert_eq!(source.calls().len(), 1);
    }

    #[tokio::test]
    async fn unavailable_walk_stops_after_exact_attempt_budget() {
        let source = Arc::new(TableSource::new(648.37, &[(".XSP250919P645", -0.28)]));
        let err = resolver(Arc::clone(&source), 4)
            .resolve(&request(OptionType::Put, dec!(5), -0.20))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ResolveError::NoOptionFound { attempts: 4, .. }
        ));
        // seed + exactly four failed steps
        assert_eq!(source.calls().len(), 5);
    }

    #[tokio::test]
    async fn gaps_are_skipped_without_resetting_budget() {
        // 640 and 630 missing; 635 and 625 present
        let source = Arc::new(TableSource::new(
            648.37,
            &[
                (".XSP250919P645", -0.40),
                (".XSP250919P635", -0.30),
                (".XSP250919P625", -0.22),
                (".XSP250919P620", -0.19),
                (".XSP250919P615", -0.14),
            ],
        ));
        let resolved = resolver(Arc::clone(&source), 3)
            .resolve(&request(OptionType::Put, dec!(5), -0.20))
            .await
            .unwrap();
        assert_eq!(resolved.symbol.strike(), dec!(620));

        let err = resolver(source, 2)
            .resolve(&request(OptionType::Put, dec!(5), -0.20))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::NoOptionFound { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn step_limit_bounds_non_regressing_curve() {
        let deltas: Vec<(String, f64)> = (0..=20)
            .map(|i| (format!(".XSP250919C{}", 100 + i), 0.9))
            .collect();
        let pairs: Vec<(&str, f64)> = deltas.iter().map(|(s, d)| (s.as_str(), *d)).collect();
        let source = Arc::new(TableSource::new(100.0, &pairs));
        let resolver = StrikeResolver::new(
            source,
            TradingCalendar::default(),
            ResolverConfig {
                max_attempts: 5,
                max_steps: 10,
            },
        );
        let err = resolver
            .resolve(&request(OptionType::Call, dec!(1), 0.3))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::StepLimit(10)));
    }

    #[tokio::test]
    async fn expiration_skips_to_trading_day() {
        let source = Arc::new(TableSource::new(
            648.37,
            &[(".XSP250922P645", -0.21), (".XSP250922P640", -0.12)],
        ));
        let mut req = request(OptionType::Put, dec!(5), -0.20);
        req.days_to_expiration = 1;
        let resolved = resolver(source, 5).resolve(&req).await.unwrap();
        assert_eq!(resolved.symbol.expiration(), date(2025, 9, 22));
    }

    #[tokio::test]
    async fn offset_and_relative_lookups() {
        let source = Arc::new(TableSource::new(
            648.37,
            &[(".XSP250919P640", -0.22), (".XSP250919P630", -0.15)],
        ));
        let resolver = resolver(source, 5);

        let short = resolver
            .resolve_by_offset(&request(OptionType::Put, dec!(5), 0.0), dec!(-5))
            .await
            .unwrap();
        assert_eq!(short.symbol.to_compact(), ".XSP250919P640");
        assert_eq!(short.delta, -0.22);

        let long = resolver
            .resolve_relative(&short.symbol, dec!(-10))
            .await
            .unwrap();
        assert_eq!(long.symbol.to_compact(), ".XSP250919P630");
        assert!((long.data.mid_price().unwrap() - 1.05).abs() < 1e-12);
    }
}
