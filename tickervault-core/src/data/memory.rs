//! Deterministic in-memory price provider.
//!
//! Serves pre-loaded bars and records every call, so tests can assert how many
//! fetches a reconciliation issued and over which ranges.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use super::provider::{DataError, PriceProvider, ProviderStamp, RawBar};
use crate::domain::{Bar, Interval};

/// One recorded `fetch_bars` call.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchCall {
    pub ticker: String,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub interval: Interval,
}

#[derive(Debug, Default)]
pub struct MemoryProvider {
    bars: HashMap<String, Vec<Bar>>,
    prices: HashMap<String, f64>,
    failing: HashSet<String>,
    calls: Mutex<Vec<FetchCall>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `bars` (any tickers, any order).
    pub fn with_bars(mut self, bars: impl IntoIterator<Item = Bar>) -> Self {
        for bar in bars {
            self.bars.entry(bar.ticker.clone()).or_default().push(bar);
        }
        for series in self.bars.values_mut() {
            series.sort_by_key(|b| b.date);
        }
        self
    }

    pub fn with_price(mut self, ticker: &str, price: f64) -> Self {
        self.prices.insert(ticker.to_string(), price);
        self
    }

    /// Every fetch for `ticker` fails with a provider error.
    pub fn failing(mut self, ticker: &str) -> Self {
        self.failing.insert(ticker.to_string());
        self
    }

    pub fn calls(&self) -> Vec<FetchCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl PriceProvider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    fn fetch_bars(
        &self,
        ticker: &str,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
        interval: Interval,
    ) -> Result<Vec<RawBar>, DataError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(FetchCall {
                ticker: ticker.to_string(),
                start,
                end,
                interval,
            });

        if self.failing.contains(ticker) {
            return Err(DataError::Provider(format!("simulated failure for {ticker}")));
        }

        let rows = self
            .bars
            .get(ticker)
            .map(|series| {
                series
                    .iter()
                    .filter(|b| b.date >= start && b.date < end)
                    .map(|b| RawBar {
                        stamp: if interval.is_intraday() {
                            ProviderStamp::Datetime(b.date.with_timezone(&Utc))
                        } else {
                            ProviderStamp::Date(b.session_date())
                        },
                        open: Some(b.open),
                        high: Some(b.high),
                        low: Some(b.low),
                        close: Some(b.close),
                        volume: Some(b.volume),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }

    fn latest_price(&self, ticker: &str) -> Result<Option<f64>, DataError> {
        if self.failing.contains(ticker) {
            return Err(DataError::Provider(format!("simulated failure for {ticker}")));
        }
        Ok(self.prices.get(ticker).copied())
    }

    fn is_available(&self) -> bool {
        true
    }
}
