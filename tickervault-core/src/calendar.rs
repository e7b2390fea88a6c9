//! Trading calendar and market-session classification.
//!
//! [`NyseCalendar`] derives NYSE full-day holidays by rule rather than from a
//! table, so it covers any year. Early (13:00) closes are not modelled; the
//! session always closes at 16:00 America/New_York.
//!
//! [`SessionState::classify`] is the single place the current moment is
//! bucketed into pre-open / open / post-close / non-session. Both the
//! freshness checker and the alert evaluator go through it.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};

use crate::domain::EXCHANGE_TZ;

/// Upper bound on consecutive non-session days when searching backwards.
const MAX_CLOSED_RUN: i64 = 14;

/// Source of valid session dates and exchange open/close times.
pub trait TradingCalendar: Send + Sync {
    /// Session dates in `[start, end]` (inclusive), ascending.
    fn sessions_between(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate>;

    /// Whether the exchange trades on `date`.
    fn is_session_day(&self, date: NaiveDate) -> bool;

    /// Exchange-local open time.
    fn open_time(&self) -> NaiveTime;

    /// Exchange-local close time.
    fn close_time(&self) -> NaiveTime;

    /// Most recent session strictly before `date`.
    fn previous_session(&self, date: NaiveDate) -> Option<NaiveDate> {
        (1..=MAX_CLOSED_RUN)
            .map(|back| date - Duration::days(back))
            .find(|d| self.is_session_day(*d))
    }
}

/// Where "now" sits relative to the trading session, in exchange-local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Weekend or holiday.
    NonSession,
    /// Session day, before the open.
    PreOpen,
    /// Session day, market open.
    Open,
    /// Session day, at or after the close.
    PostClose,
}

impl SessionState {
    pub fn classify(now: DateTime<Utc>, calendar: &impl TradingCalendar) -> Self {
        let local = now.with_timezone(&EXCHANGE_TZ);
        if !calendar.is_session_day(local.date_naive()) {
            return SessionState::NonSession;
        }
        let time = local.time();
        if time < calendar.open_time() {
            SessionState::PreOpen
        } else if time < calendar.close_time() {
            SessionState::Open
        } else {
            SessionState::PostClose
        }
    }

    /// True before the close on a session day (pre-open included).
    pub fn is_pre_close(self) -> bool {
        matches!(self, SessionState::PreOpen | SessionState::Open)
    }

    /// The most recent session whose trading day has completed as of `today`.
    ///
    /// Post-close that is today; otherwise the last session before today.
    pub fn last_completed_session(
        self,
        today: NaiveDate,
        calendar: &impl TradingCalendar,
    ) -> Option<NaiveDate> {
        match self {
            SessionState::PostClose => Some(today),
            _ => calendar.previous_session(today),
        }
    }
}

/// New York Stock Exchange regular-hours calendar.
#[derive(Debug, Clone, Copy, Default)]
pub struct NyseCalendar;

/// Unscheduled full-day closures (national days of mourning).
const SPECIAL_CLOSURES: [(i32, u32, u32); 4] = [
    (2004, 6, 11),
    (2007, 1, 2),
    (2018, 12, 5),
    (2025, 1, 9),
];

impl NyseCalendar {
    pub fn new() -> Self {
        Self
    }

    /// Full-day holidays observed in `year`, in calendar order.
    pub fn holidays(year: i32) -> Vec<NaiveDate> {
        let mut out = Vec::with_capacity(11);

        // New Year's Day: Sunday moves to Monday, Saturday is not observed.
        if let Some(jan1) = NaiveDate::from_ymd_opt(year, 1, 1) {
            match jan1.weekday() {
                Weekday::Sat => {}
                Weekday::Sun => out.push(jan1 + Duration::days(1)),
                _ => out.push(jan1),
            }
        }
        out.extend(nth_weekday(year, 1, Weekday::Mon, 3)); // MLK Day
        out.extend(nth_weekday(year, 2, Weekday::Mon, 3)); // Washington's Birthday
        if let Some(easter) = easter_sunday(year) {
            out.push(easter - Duration::days(2)); // Good Friday
        }
        out.extend(last_weekday(year, 5, Weekday::Mon)); // Memorial Day
        if year >= 2022 {
            out.extend(fixed_observed(year, 6, 19)); // Juneteenth
        }
        out.extend(fixed_observed(year, 7, 4));
        out.extend(nth_weekday(year, 9, Weekday::Mon, 1)); // Labor Day
        out.extend(nth_weekday(year, 11, Weekday::Thu, 4)); // Thanksgiving
        out.extend(fixed_observed(year, 12, 25));

        out.extend(
            SPECIAL_CLOSURES
                .iter()
                .filter(|(y, _, _)| *y == year)
                .filter_map(|&(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
        );
        out.sort();
        out
    }

    pub fn is_holiday(date: NaiveDate) -> bool {
        Self::holidays(date.year()).contains(&date)
    }
}

impl TradingCalendar for NyseCalendar {
    fn sessions_between(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        if end < start {
            return Vec::new();
        }
        let mut holidays = Vec::new();
        for year in start.year()..=end.year() {
            holidays.extend(Self::holidays(year));
        }
        start
            .iter_days()
            .take_while(|d| *d <= end)
            .filter(|d| !is_weekend(*d) && holidays.binary_search(d).is_err())
            .collect()
    }

    fn is_session_day(&self, date: NaiveDate) -> bool {
        !is_weekend(date) && !Self::is_holiday(date)
    }

    fn open_time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(9, 30, 0).unwrap_or(NaiveTime::MIN)
    }

    fn close_time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(16, 0, 0).unwrap_or(NaiveTime::MIN)
    }
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u8) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, weekday, n)
}

fn last_weekday(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    nth_weekday(year, month, weekday, 5).or_else(|| nth_weekday(year, month, weekday, 4))
}

/// Fixed-date holiday: Saturday observed on Friday, Sunday on Monday.
fn fixed_observed(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(match date.weekday() {
        Weekday::Sat => date - Duration::days(1),
        Weekday::Sun => date + Duration::days(1),
        _ => date,
    })
}

/// Gregorian Easter Sunday (anonymous Gregorian algorithm).
fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}
