//! Option Symbol Codec
//!
//! Parses and builds option identifiers in the two notations the system
//! deals with:
//!
//! - **Compact** (feed notation): `.SPY240315P645`, `.AAPL230818C172.5`
//! - **Padded** (exchange notation): `SPY   240315P00645000`
//!
//! The padded form is the underlying left-justified in six columns, the
//! expiration as `yymmdd`, the option type, then the strike in thousandths
//! zero-padded to eight digits. Every strike accepted by [`OptionSymbol`]
//! is an integer count of thousandths, so both notations round-trip.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Width of the underlying column in padded notation.
const PADDED_ROOT_WIDTH: usize = 6;

/// Length of the fixed-width suffix in padded notation (`yymmdd` + type + 8 strike digits).
const PADDED_SUFFIX_LEN: usize = 15;

/// Date layout shared by both notations.
const DATE_FORMAT: &str = "%y%m%d";

/// Largest strike representable in eight padded digits of thousandths.
const MAX_STRIKE_THOUSANDTHS: i64 = 99_999_999;

// =============================================================================
// Errors
// =============================================================================

/// Errors raised while parsing or building option symbols.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SymbolError {
    /// Compact symbols must begin with a `.`.
    #[error("compact option symbol must start with '.': {0}")]
    MissingPrefix(String),

    /// Symbol is too short to hold all required parts.
    #[error("option symbol too short: {0}")]
    TooShort(String),

    /// Underlying ticker is empty, too long, or contains invalid characters.
    #[error("invalid underlying '{0}'")]
    InvalidUnderlying(String),

    /// Expiration digits do not form a calendar date.
    #[error("invalid expiration '{0}'")]
    InvalidExpiration(String),

    /// Option type is neither `C` nor `P`.
    #[error("invalid option type '{0}'")]
    InvalidOptionType(String),

    /// Strike is not a positive number of thousandths within range.
    #[error("invalid strike '{0}'")]
    InvalidStrike(String),
}

// =============================================================================
// Option Type
// =============================================================================

/// Call or put.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionType {
    /// Right to buy.
    Call,
    /// Right to sell.
    Put,
}

impl OptionType {
    /// Single-character code used in both notations.
    #[must_use]
    pub const fn code(self) -> char {
        match self {
            Self::Call => 'C',
            Self::Put => 'P',
        }
    }

    /// Parse the single-character code.
    ///
    /// # Errors
    ///
    /// Returns `SymbolError::InvalidOptionType` for anything but `C` or `P`.
    pub fn from_code(code: char) -> Result<Self, SymbolError> {
        match code {
            'C' => Ok(Self::Call),
            'P' => Ok(Self::Put),
            other => Err(SymbolError::InvalidOptionType(other.to_string())),
        }
    }

    /// Whether this is a put.
    #[must_use]
    pub const fn is_put(self) -> bool {
        matches!(self, Self::Put)
    }
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Call => f.write_str("call"),
            Self::Put => f.write_str("put"),
        }
    }
}

// =============================================================================
// Option Symbol
// =============================================================================

/// A single option contract: underlying, expiration, type and strike.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OptionSymbol {
    underlying: String,
    expiration: NaiveDate,
    option_type: OptionType,
    strike: Decimal,
}

impl OptionSymbol {
    /// Build a symbol, validating the underlying and strike.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying is not 1-6 ASCII alphanumerics or
    /// the strike is not a positive multiple of 0.001 below 100,000.
    pub fn new(
        underlying: impl Into<String>,
        expiration: NaiveDate,
        option_type: OptionType,
        strike: Decimal,
    ) -> Result<Self, SymbolError> {
        let underlying = underlying.into();
        validate_underlying(&underlying)?;
        let strike = validate_strike(strike)?;

        Ok(Self {
            underlying,
            expiration,
            option_type,
            strike,
        })
    }

    /// Underlying ticker.
    #[must_use]
    pub fn underlying(&self) -> &str {
        &self.underlying
    }

    /// Expiration date.
    #[must_use]
    pub const fn expiration(&self) -> NaiveDate {
        self.expiration
    }

    /// Call or put.
    #[must_use]
    pub const fn option_type(&self) -> OptionType {
        self.option_type
    }

    /// Strike price.
    #[must_use]
    pub const fn strike(&self) -> Decimal {
        self.strike
    }

    /// Parse compact feed notation (`.SPY240315P645`).
    ///
    /// # Errors
    ///
    /// Returns an error describing the first malformed component.
    pub fn parse_compact(symbol: &str) -> Result<Self, SymbolError> {
        let body = symbol
            .strip_prefix('.')
            .ok_or_else(|| SymbolError::MissingPrefix(symbol.to_string()))?;

        let root_len = body
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| SymbolError::TooShort(symbol.to_string()))?;
        let (underlying, rest) = body.split_at(root_len);

        // yymmdd + type + at least one strike digit
        if rest.len() < 8 || !rest.is_char_boundary(6) || !rest.is_char_boundary(7) {
            return Err(SymbolError::TooShort(symbol.to_string()));
        }

        let expiration = parse_expiration(&rest[..6])?;
        let option_type = parse_type(&rest[6..7])?;
        let strike = Decimal::from_str(&rest[7..])
            .map_err(|_| SymbolError::InvalidStrike(rest[7..].to_string()))?;

        Self::new(underlying, expiration, option_type, strike)
    }

    /// Parse padded exchange notation (`SPY   240315P00645000`).
    ///
    /// The fixed-width suffix is read from the right, so six-character roots
    /// without separating spaces parse as well.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first malformed component.
    pub fn parse_padded(symbol: &str) -> Result<Self, SymbolError> {
        if !symbol.is_ascii() || symbol.len() <= PADDED_SUFFIX_LEN {
            return Err(SymbolError::TooShort(symbol.to_string()));
        }

        let split = symbol.len() - PADDED_SUFFIX_LEN;
        let (root, suffix) = symbol.split_at(split);

        let expiration = parse_expiration(&suffix[..6])?;
        let option_type = parse_type(&suffix[6..7])?;

        let digits = &suffix[7..];
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SymbolError::InvalidStrike(digits.to_string()));
        }
        let thousandths: i64 = digits
            .parse()
            .map_err(|_| SymbolError::InvalidStrike(digits.to_string()))?;

        Self::new(
            root.trim_end(),
            expiration,
            option_type,
            Decimal::new(thousandths, 3),
        )
    }

    /// Render compact feed notation.
    #[must_use]
    pub fn to_compact(&self) -> String {
        format!(
            ".{}{}{}{}",
            self.underlying,
            self.expiration.format(DATE_FORMAT),
            self.option_type.code(),
            self.strike.normalize()
        )
    }

    /// Render padded exchange notation.
    #[must_use]
    pub fn to_padded(&self) -> String {
        let thousandths = (self.strike * Decimal::ONE_THOUSAND).trunc();
        format!(
            "{:<width$}{}{}{:0>8}",
            self.underlying,
            self.expiration.format(DATE_FORMAT),
            self.option_type.code(),
            thousandths.normalize(),
            width = PADDED_ROOT_WIDTH
        )
    }

    /// Same contract at a different strike.
    ///
    /// # Errors
    ///
    /// Returns `SymbolError::InvalidStrike` if the strike is out of range.
    pub fn with_strike(&self, strike: Decimal) -> Result<Self, SymbolError> {
        Ok(Self {
            underlying: self.underlying.clone(),
            expiration: self.expiration,
            option_type: self.option_type,
            strike: validate_strike(strike)?,
        })
    }

    /// Same contract with the strike raised by `step`.
    ///
    /// # Errors
    ///
    /// Returns `SymbolError::InvalidStrike` if the result is out of range.
    pub fn increment_strike(&self, step: Decimal) -> Result<Self, SymbolError> {
        self.with_strike(self.strike + step)
    }

    /// Same contract with the strike lowered by `step`.
    ///
    /// # Errors
    ///
    /// Returns `SymbolError::InvalidStrike` if the result is zero or negative.
    pub fn decrement_strike(&self, step: Decimal) -> Result<Self, SymbolError> {
        self.with_strike(self.strike - step)
    }
}

impl fmt::Display for OptionSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_compact())
    }
}

impl FromStr for OptionSymbol {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_compact(s)
    }
}

// =============================================================================
// Component Parsing
// =============================================================================

fn validate_underlying(underlying: &str) -> Result<(), SymbolError> {
    let valid = !underlying.is_empty()
        && underlying.len() <= PADDED_ROOT_WIDTH
        && underlying.bytes().all(|b| b.is_ascii_alphanumeric());
    if valid {
        Ok(())
    } else {
        Err(SymbolError::InvalidUnderlying(underlying.to_string()))
    }
}

fn validate_strike(strike: Decimal) -> Result<Decimal, SymbolError> {
    let thousandths = strike * Decimal::ONE_THOUSAND;
    let in_range = strike.is_sign_positive()
        && !strike.is_zero()
        && thousandths.fract().is_zero()
        && thousandths <= Decimal::from(MAX_STRIKE_THOUSANDTHS);
    if in_range {
        Ok(strike.normalize())
    } else {
        Err(SymbolError::InvalidStrike(strike.to_string()))
    }
}

fn parse_expiration(digits: &str) -> Result<NaiveDate, SymbolError> {
    if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SymbolError::InvalidExpiration(digits.to_string()));
    }
    NaiveDate::parse_from_str(digits, DATE_FORMAT)
        .map_err(|_| SymbolError::InvalidExpiration(digits.to_string()))
}

fn parse_type(code: &str) -> Result<OptionType, SymbolError> {
    let mut chars = code.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => OptionType::from_code(c),
        _ => Err(SymbolError::InvalidOptionType(code.to_string())),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use test_case::test_case;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parse_compact_put() {
        let symbol = OptionSymbol::parse_compact(".SPY240315P645").unwrap();
        assert_eq!(symbol.underlying(), "SPY");
        assert_eq!(symbol.expiration(), date(2024, 3, 15));
        assert_eq!(symbol.option_type(), OptionType::Put);
        assert_eq!(symbol.strike(), dec!(645));
    }

    #[test]
    fn parse_compact_fractional_strike() {
        let symbol = OptionSymbol::parse_compact(".AAPL230818C172.5").unwrap();
        assert_eq!(symbol.strike(), dec!(172.5));
        assert_eq!(symbol.to_compact(), ".AAPL230818C172.5");
    }

    #[test]
    fn parse_padded_with_spaces() {
        let symbol = OptionSymbol::parse_padded("AAPL  230818C00197500").unwrap();
        assert_eq!(symbol.underlying(), "AAPL");
        assert_eq!(symbol.expiration(), date(2023, 8, 18));
        assert_eq!(symbol.option_type(), OptionType::Call);
        assert_eq!(symbol.strike(), dec!(197.5));
    }

    #[test]
    fn parse_padded_six_char_root() {
        let symbol = OptionSymbol::parse_padded("GOOGLL230818P00010000").unwrap();
        assert_eq!(symbol.underlying(), "GOOGLL");
        assert_eq!(symbol.strike(), dec!(10));
    }

    #[test]
    fn to_padded_pads_root_and_strike() {
        let symbol =
            OptionSymbol::new("XSP", date(2025, 9, 19), OptionType::Put, dec!(645)).unwrap();
        assert_eq!(symbol.to_padded(), "XSP   250919P00645000");
    }

    #[test]
    fn compact_to_padded_conversion() {
        let symbol = OptionSymbol::parse_compact(".AAPL230818C197.5").unwrap();
        assert_eq!(symbol.to_padded(), "AAPL  230818C00197500");
    }

    #[test_case("SPY240315P645" ; "missing prefix")]
    #[test_case(".SPY" ; "no digits")]
    #[test_case(".SPY2403P645" ; "short date")]
    #[test_case(".SPY241315P645" ; "bad month")]
    #[test_case(".SPY240315X645" ; "bad type")]
    #[test_case(".SPY240315P" ; "missing strike")]
    #[test_case(".SPY240315Pabc" ; "non numeric strike")]
    #[test_case(".SPY240315P0" ; "zero strike")]
    #[test_case(".SPY240315P1.0005" ; "sub thousandth strike")]
    #[test_case(".TOOLONGX240315P10" ; "root too long")]
    fn parse_compact_rejects(input: &str) {
        assert!(OptionSymbol::parse_compact(input).is_err());
    }

    #[test_case("" ; "empty")]
    #[test_case("230818C00197500" ; "no root")]
    #[test_case("AAPL  230818X00197500" ; "bad type")]
    #[test_case("AAPL  230818C0019750A" ; "non digit strike")]
    #[test_case("AAPL  231318C00197500" ; "bad month")]
    fn parse_padded_rejects(input: &str) {
        assert!(OptionSymbol::parse_padded(input).is_err());
    }

    #[test]
    fn missing_prefix_error_variant() {
        assert_eq!(
            OptionSymbol::parse_compact("SPY240315P645"),
            Err(SymbolError::MissingPrefix("SPY240315P645".to_string()))
        );
    }

    #[test]
    fn strike_arithmetic() {
        let symbol = OptionSymbol::parse_compact(".XSP250919P645").unwrap();
        let up = symbol.increment_strike(dec!(5)).unwrap();
        let down = symbol.decrement_strike(dec!(2.5)).unwrap();
        assert_eq!(up.to_compact(), ".XSP250919P650");
        assert_eq!(down.to_compact(), ".XSP250919P642.5");
        assert_eq!(up.underlying(), "XSP");
        assert_eq!(up.expiration(), symbol.expiration());
    }

    #[test]
    fn decrement_below_zero_fails() {
        let symbol = OptionSymbol::parse_compact(".XSP250919P5").unwrap();
        assert!(symbol.decrement_strike(dec!(5)).is_err());
    }

    #[test]
    fn display_and_from_str_use_compact() {
        let symbol: OptionSymbol = ".SPY240315C500".parse().unwrap();
        assert_eq!(symbol.to_string(), ".SPY240315C500");
    }

    #[test]
    fn trailing_zero_strike_normalizes() {
        let symbol = OptionSymbol::parse_compact(".SPY240315C500.00").unwrap();
        assert_eq!(symbol.to_compact(), ".SPY240315C500");
    }

    fn arb_symbol() -> impl Strategy<Value = OptionSymbol> {
        (
            "[A-Z]{1,6}",
            0i64..3650,
            any::<bool>(),
            1i64..=MAX_STRIKE_THOUSANDTHS,
        )
            .prop_map(|(root, days, call, thousandths)| {
                let expiration = date(2020, 1, 1) + chrono::Duration::days(days);
                let option_type = if call { OptionType::Call } else { OptionType::Put };
                OptionSymbol::new(root, expiration, option_type, Decimal::new(thousandths, 3))
                    .unwrap()
            })
    }

    proptest! {
        #[test]
        fn compact_round_trip(symbol in arb_symbol()) {
            let parsed = OptionSymbol::parse_compact(&symbol.to_compact()).unwrap();
            prop_assert_eq!(parsed, symbol);
        }

        #[test]
        fn padded_round_trip(symbol in arb_symbol()) {
            let padded = symbol.to_padded();
            prop_assert_eq!(padded.len(), PADDED_ROOT_WIDTH + PADDED_SUFFIX_LEN);
            let parsed = OptionSymbol::parse_padded(&padded).unwrap();
            prop_assert_eq!(parsed, symbol);
        }
    }
}
