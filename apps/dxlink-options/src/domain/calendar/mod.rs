//! Trading Calendar
//!
//! Weekend and holiday aware date arithmetic used to turn a "days to
//! expiration" request into a concrete expiration date. Half-day sessions
//! are expected to be supplied as holidays.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate, Weekday};

/// Set of non-trading dates in addition to weekends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TradingCalendar {
    holidays: BTreeSet<NaiveDate>,
}

impl TradingCalendar {
    /// Create a calendar from a list of holidays.
    #[must_use]
    pub fn new(holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            holidays: holidays.into_iter().collect(),
        }
    }

    /// Number of holidays known to the calendar.
    #[must_use]
    pub fn holiday_count(&self) -> usize {
        self.holidays.len()
    }

    /// Whether the market is open on `date`.
    #[must_use]
    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }

    /// First trading day strictly after `date`.
    #[must_use]
    pub fn next_trading_day(&self, date: NaiveDate) -> NaiveDate {
        let mut day = date;
        loop {
            day = day.succ_opt().unwrap_or(NaiveDate::MAX);
            if day == NaiveDate::MAX || self.is_trading_day(day) {
                return day;
            }
        }
    }

    /// `date` itself when it is a trading day, otherwise the next one.
    #[must_use]
    pub fn roll_forward(&self, date: NaiveDate) -> NaiveDate {
        if self.is_trading_day(date) {
            date
        } else {
            self.next_trading_day(date)
        }
    }

    /// Walk forward `days` trading days from `start`.
    ///
    /// Zero days rolls `start` forward to a trading day. The result is never
    /// a weekend or holiday.
    #[must_use]
    pub fn add_trading_days(&self, start: NaiveDate, days: u32) -> NaiveDate {
        (0..days).fold(self.roll_forward(start), |day, _| {
            self.next_trading_day(day)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn calendar_2022() -> TradingCalendar {
        TradingCalendar::new([
            date(2022, 1, 17),
            date(2022, 2, 21),
            date(2022, 4, 15),
            date(2022, 5, 30),
            date(2022, 6, 20),
            date(2022, 7, 4),
            date(2022, 9, 5),
            date(2022, 11, 24),
            date(2022, 12, 26),
        ])
    }

    #[test]
    fn weekends_are_not_trading_days() {
        let calendar = TradingCalendar::default();
        assert!(!calendar.is_trading_day(date(2022, 1, 15)));
        assert!(!calendar.is_trading_day(date(2022, 1, 16)));
        assert!(calendar.is_trading_day(date(2022, 1, 14)));
    }

    #[test]
    fn holidays_are_not_trading_days() {
        assert!(!calendar_2022().is_trading_day(date(2022, 1, 17)));
    }

    #[test]
    fn next_trading_day_skips_weekend_and_holiday() {
        // Fri -> Tue over MLK day
        assert_eq!(
            calendar_2022().next_trading_day(date(2022, 1, 14)),
            date(2022, 1, 18)
        );
    }

    #[test_case(date(2022, 1, 10), 5, date(2022, 1, 18) ; "week spanning holiday")]
    #[test_case(date(2022, 2, 14), 1, date(2022, 2, 15) ; "one day")]
    #[test_case(date(2022, 2, 14), 7, date(2022, 2, 24) ; "seven trading days over presidents day")]
    #[test_case(date(2022, 4, 14), 1, date(2022, 4, 18) ; "good friday")]
    #[test_case(date(2022, 4, 14), 0, date(2022, 4, 14) ; "zero on trading day")]
    #[test_case(date(2022, 4, 16), 0, date(2022, 4, 18) ; "zero on weekend rolls forward")]
    #[test_case(date(2022, 1, 15), 1, date(2022, 1, 19) ; "start on weekend")]
    fn add_trading_days(start: NaiveDate, days: u32, expected: NaiveDate) {
        assert_eq!(calendar_2022().add_trading_days(start, days), expected);
    }

    #[test]
    fn duplicate_holidays_collapse() {
        let calendar = TradingCalendar::new([date(2022, 7, 4), date(2022, 7, 4)]);
        assert_eq!(calendar.holiday_count(), 1);
    }
}
