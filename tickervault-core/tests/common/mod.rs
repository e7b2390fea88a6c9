//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use tempfile::TempDir;
use tickervault_core::calendar::{NyseCalendar, TradingCalendar};
use tickervault_core::data::{DatasetStore, MemoryProvider, Tracker};
use tickervault_core::domain::{Bar, EXCHANGE_TZ};

pub type TestTracker = Tracker<MemoryProvider, NyseCalendar>;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Exchange-local midnight.
pub fn midnight(y: i32, m: u32, d: u32) -> DateTime<Tz> {
    EXCHANGE_TZ.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

/// A New York wall-clock moment as UTC.
pub fn ny_time(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    EXCHANGE_TZ
        .with_ymd_and_hms(y, m, d, h, min, 0)
        .unwrap()
        .with_timezone(&Utc)
}

pub fn daily_bar(ticker: &str, day: NaiveDate, close: f64) -> Bar {
    Bar {
        ticker: ticker.into(),
        date: EXCHANGE_TZ
            .from_local_datetime(&day.and_hms_opt(0, 0, 0).unwrap())
            .unwrap(),
        open: close - 0.5,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: 1_000_000,
    }
}

/// One bar per NYSE session in `[from, to]`, closes rising by 1 from 100.
pub fn session_bars(ticker: &str, from: NaiveDate, to: NaiveDate) -> Vec<Bar> {
    NyseCalendar
        .sessions_between(from, to)
        .into_iter()
        .enumerate()
        .map(|(i, day)| daily_bar(ticker, day, 100.0 + i as f64))
        .collect()
}

pub fn tickers(list: &[&str]) -> Vec<String> {
    list.iter().map(|t| t.to_string()).collect()
}

/// Tracker over a fresh temp directory. Keep the `TempDir` alive for the
/// duration of the test.
pub fn tracker(provider: MemoryProvider) -> (TempDir, TestTracker) {
    let dir = TempDir::new().unwrap();
    let tracker = Tracker::open(DatasetStore::new(dir.path()), provider, NyseCalendar).unwrap();
    (dir, tracker)
}

/// Tracker whose daily dataset already holds `cached`.
pub fn tracker_with_cache(provider: MemoryProvider, cached: Vec<Bar>) -> (TempDir, TestTracker) {
    use tickervault_core::data::Dataset;
    use tickervault_core::domain::Interval;

    let dir = TempDir::new().unwrap();
    let store = DatasetStore::new(dir.path());
    store.save(&Dataset::from_bars(Interval::Day1, cached)).unwrap();
    let tracker = Tracker::open(store, provider, NyseCalendar).unwrap();
    (dir, tracker)
}
