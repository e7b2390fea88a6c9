//! Interval catalog — sampling granularities, their nominal step and the
//! provider-imposed lookback ceiling.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Months, NaiveDate, TimeZone};
use chrono_tz::Tz;

use super::EXCHANGE_TZ;
use crate::data::DataError;

/// Application-level cap on daily look-back windows, enforced by callers.
pub const MAX_LOOKBACK_DAYS: u32 = 180;

/// Supported bar granularities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Interval {
    Minute1,
    Minute2,
    Minute5,
    Minute15,
    Minute30,
    Minute60,
    Minute90,
    Day1,
    Day5,
    Week1,
    Month1,
    Month3,
}

impl Interval {
    pub const ALL: [Interval; 12] = [
        Interval::Minute1,
        Interval::Minute2,
        Interval::Minute5,
        Interval::Minute15,
        Interval::Minute30,
        Interval::Minute60,
        Interval::Minute90,
        Interval::Day1,
        Interval::Day5,
        Interval::Week1,
        Interval::Month1,
        Interval::Month3,
    ];

    /// Provider code, also used in the store file name.
    pub fn code(self) -> &'static str {
        match self {
            Interval::Minute1 => "1m",
            Interval::Minute2 => "2m",
            Interval::Minute5 => "5m",
            Interval::Minute15 => "15m",
            Interval::Minute30 => "30m",
            Interval::Minute60 => "60m",
            Interval::Minute90 => "90m",
            Interval::Day1 => "1d",
            Interval::Day5 => "5d",
            Interval::Week1 => "1wk",
            Interval::Month1 => "1mo",
            Interval::Month3 => "3mo",
        }
    }

    /// Nominal time between consecutive bars. Months are approximated as 30
    /// days here; [`advance`](Self::advance) steps by calendar months.
    pub fn step(self) -> Duration {
        match self {
            Interval::Minute1 => Duration::minutes(1),
            Interval::Minute2 => Duration::minutes(2),
            Interval::Minute5 => Duration::minutes(5),
            Interval::Minute15 => Duration::minutes(15),
            Interval::Minute30 => Duration::minutes(30),
            Interval::Minute60 => Duration::minutes(60),
            Interval::Minute90 => Duration::minutes(90),
            Interval::Day1 => Duration::days(1),
            Interval::Day5 => Duration::days(5),
            Interval::Week1 => Duration::weeks(1),
            Interval::Month1 => Duration::days(30),
            Interval::Month3 => Duration::days(90),
        }
    }

    /// Provider lookback ceiling in days. `None` for daily-or-coarser intervals.
    pub fn max_lookback_days(self) -> Option<u32> {
        match self {
            Interval::Minute1 => Some(7),
            i if i.is_intraday() => Some(60),
            _ => None,
        }
    }

    pub fn is_intraday(self) -> bool {
        self < Interval::Day1
    }

    /// Earliest start date the provider will serve relative to `today`.
    ///
    /// The 60-day intraday window counts today, so its floor sits 59 days back.
    pub fn earliest_start(self, today: NaiveDate) -> Option<NaiveDate> {
        let back = match self {
            Interval::Minute1 => 7,
            i => i64::from(i.max_lookback_days()?) - 1,
        };
        Some(today - Duration::days(back))
    }

    /// Reject a start date beyond the provider's lookback ceiling.
    pub fn check_lookback(self, start: NaiveDate, today: NaiveDate) -> Result<(), DataError> {
        match self.earliest_start(today) {
            Some(floor) if start < floor => Err(DataError::InvalidRange(format!(
                "{} data is only available from {floor} ({} day lookback)",
                self.code(),
                self.max_lookback_days().unwrap_or_default()
            ))),
            _ => Ok(()),
        }
    }

    /// Advance a timestamp by one step.
    ///
    /// Daily-or-coarser steps move in local wall-clock time so a bar at local
    /// midnight lands on the next local midnight across DST changes. Monthly
    /// and quarterly steps land on the same day of the next period.
    pub fn advance(self, t: DateTime<Tz>) -> DateTime<Tz> {
        if self.is_intraday() {
            return t + self.step();
        }
        let naive = t.naive_local();
        let local = match self {
            Interval::Month1 => naive.checked_add_months(Months::new(1)),
            Interval::Month3 => naive.checked_add_months(Months::new(3)),
            _ => Some(naive + self.step()),
        };
        local
            .and_then(|local| EXCHANGE_TZ.from_local_datetime(&local).earliest())
            .unwrap_or(t + self.step())
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Interval {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim();
        let code = if code == "1h" { "60m" } else { code };
        Interval::ALL
            .into_iter()
            .find(|i| i.code() == code)
            .ok_or_else(|| DataError::InvalidInterval(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn parses_every_code() {
        for interval in Interval::ALL {
            assert_eq!(interval.code().parse::<Interval>().unwrap(), interval);
        }
        assert_eq!("1h".parse::<Interval>().unwrap(), Interval::Minute60);
    }

    #[test]
    fn rejects_unknown_code() {
        let err = "7m".parse::<Interval>().unwrap_err();
        assert!(matches!(err, DataError::InvalidInterval(ref c) if c == "7m"));
    }

    #[test]
    fn lookback_ceilings() {
        assert_eq!(Interval::Minute1.max_lookback_days(), Some(7));
        assert_eq!(Interval::Minute90.max_lookback_days(), Some(60));
        assert_eq!(Interval::Day1.max_lookback_days(), None);
        assert_eq!(Interval::Month3.max_lookback_days(), None);
    }

    #[test]
    fn check_lookback_bounds() {
        let today = d(2024, 3, 1);
        assert!(Interval::Minute1.check_lookback(d(2024, 2, 23), today).is_ok());
        assert!(Interval::Minute1.check_lookback(d(2024, 2, 22), today).is_err());
        assert!(Interval::Minute5.check_lookback(today - Duration::days(59), today).is_ok());
        assert!(Interval::Minute5.check_lookback(today - Duration::days(60), today).is_err());
        assert!(Interval::Day1.check_lookback(d(1990, 1, 1), today).is_ok());
    }

    #[test]
    fn daily_advance_keeps_local_midnight_across_dst() {
        // US DST starts 2024-03-10.
        let sat = EXCHANGE_TZ.with_ymd_and_hms(2024, 3, 9, 0, 0, 0).unwrap();
        let sun = Interval::Day1.advance(sat);
        assert_eq!(sun, EXCHANGE_TZ.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap());
        let mon = Interval::Day1.advance(sun);
        assert_eq!(mon, EXCHANGE_TZ.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap());
        // Only 23 real hours elapse on the spring-forward day.
        assert_eq!(mon - sun, Duration::hours(23));
    }

    #[test]
    fn monthly_advance_follows_the_calendar() {
        let jan = EXCHANGE_TZ.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let feb = Interval::Month1.advance(jan);
        assert_eq!(feb, EXCHANGE_TZ.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());
        assert_eq!(
            Interval::Month1.advance(feb),
            EXCHANGE_TZ.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            Interval::Month3.advance(jan),
            EXCHANGE_TZ.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn intraday_advance_is_absolute() {
        let t = EXCHANGE_TZ.with_ymd_and_hms(2024, 3, 8, 9, 30, 0).unwrap();
        assert_eq!(Interval::Minute5.advance(t) - t, Duration::minutes(5));
    }
}
