//! Dataset — every ticker's series at one interval, as one flat table.

use chrono::DateTime;
use chrono_tz::Tz;

use super::canonicalize::canonicalize;
use crate::domain::{Bar, Interval};

/// Immutable flat table keyed by (ticker, date), sorted by ticker then date.
///
/// Merging produces a new `Dataset`; callers replace their reference
/// wholesale rather than mutating rows in place.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    interval: Interval,
    bars: Vec<Bar>,
}

impl Dataset {
    pub fn empty(interval: Interval) -> Self {
        Self {
            interval,
            bars: Vec::new(),
        }
    }

    /// Build from unsorted rows; duplicate keys keep the last occurrence.
    pub fn from_bars(interval: Interval, bars: impl IntoIterator<Item = Bar>) -> Self {
        Self {
            interval,
            bars: canonicalize(bars),
        }
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Distinct tickers, ascending.
    pub fn tickers(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.bars.iter().map(|b| b.ticker.as_str()).collect();
        out.dedup();
        out
    }

    /// Rows for one ticker, ascending by date.
    pub fn series(&self, ticker: &str) -> &[Bar] {
        let lo = self.bars.partition_point(|b| b.ticker.as_str() < ticker);
        let hi = self.bars.partition_point(|b| b.ticker.as_str() <= ticker);
        &self.bars[lo..hi]
    }

    pub fn contains_ticker(&self, ticker: &str) -> bool {
        !self.series(ticker).is_empty()
    }

    /// A new dataset with `fetched` merged in. On a key collision the fetched
    /// row wins.
    pub fn merged(&self, fetched: Vec<Bar>) -> Dataset {
        Dataset::from_bars(self.interval, self.bars.iter().cloned().chain(fetched))
    }

    /// Rows for `tickers` with `start <= date <= end`, in ticker-then-date order.
    pub fn window(&self, tickers: &[String], start: DateTime<Tz>, end: DateTime<Tz>) -> Vec<Bar> {
        let mut wanted: Vec<&str> = tickers.iter().map(String::as_str).collect();
        wanted.sort_unstable();
        wanted.dedup();
        wanted
            .into_iter()
            .flat_map(|t| self.series(t))
            .filter(|b| b.date >= start && b.date <= end)
            .cloned()
            .collect()
    }
}
