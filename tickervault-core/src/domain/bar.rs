//! Bar — one OHLCV row for one ticker at one session-boundary instant.

use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use serde::Serialize;

/// OHLCV bar for a single ticker at a single timestamp.
///
/// `date` is always expressed in exchange-local time (America/New_York).
/// Daily-or-coarser bars sit at local midnight of their session date;
/// intraday bars carry the bar's opening instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bar {
    pub ticker: String,
    pub date: DateTime<Tz>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Bar {
    /// Calendar date of the bar in exchange-local time.
    pub fn session_date(&self) -> NaiveDate {
        self.date.date_naive()
    }

    /// Dataset key: (ticker, UTC epoch millis). Unique within a dataset.
    pub fn key(&self) -> (String, i64) {
        (self.ticker.clone(), self.date.timestamp_millis())
    }

    /// Returns true if any OHLC field is NaN (void bar).
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// Basic OHLC sanity check: high >= low, high >= open, high >= close, etc.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > 0.0
            && self.close > 0.0
    }
}
