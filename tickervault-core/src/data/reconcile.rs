//! Cache reconciler — fetch only what is missing, merge, persist, serve.
//!
//! [`Tracker`] is the long-lived session object. It owns the dataset store,
//! the provider, the trading calendar and the master daily dataset. The
//! master is an `Arc<Dataset>` that is only ever replaced wholesale, and only
//! after the merged dataset has been written to disk.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use super::canonicalize::normalize;
use super::dataset::Dataset;
use super::gaps::{coalesce, find_gaps, Gap};
use super::provider::{DataError, PriceProvider};
use super::store::DatasetStore;
use crate::calendar::TradingCalendar;
use crate::domain::{Bar, Interval, EXCHANGE_TZ};

/// A fetch that failed and was skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchFailure {
    pub ticker: String,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub error: String,
}

/// Result of one reconciliation.
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    /// Rows for the requested tickers in `[start, end]`, ticker-then-date order.
    pub bars: Vec<Bar>,
    /// Provider calls issued.
    pub fetches: usize,
    /// Rows returned by the provider across all calls.
    pub fetched_rows: usize,
    pub failures: Vec<FetchFailure>,
    /// Requested tickers with no rows in the result.
    pub empty_tickers: Vec<String>,
}

/// Latest-price lookup result for one ticker.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub ticker: String,
    pub price: Option<f64>,
}

pub struct Tracker<P, C> {
    store: DatasetStore,
    provider: P,
    calendar: C,
    master: Arc<Dataset>,
}

impl<P: PriceProvider, C: TradingCalendar> Tracker<P, C> {
    /// Load the master daily dataset. A missing file starts empty; a corrupt
    /// or unreadable one is an error.
    pub fn open(store: DatasetStore, provider: P, calendar: C) -> Result<Self, DataError> {
        let master = Arc::new(store.load(Interval::Day1)?);
        info!(
            provider = provider.name(),
            rows = master.len(),
            tickers = master.tickers().len(),
            "tracker opened"
        );
        Ok(Self {
            store,
            provider,
            calendar,
            master,
        })
    }

    /// Current master daily dataset.
    pub fn master(&self) -> Arc<Dataset> {
        Arc::clone(&self.master)
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn calendar(&self) -> &C {
        &self.calendar
    }

    pub fn store(&self) -> &DatasetStore {
        &self.store
    }

    /// Dataset for `interval`: the master for daily, the store otherwise.
    pub fn dataset(&self, interval: Interval) -> Result<Arc<Dataset>, DataError> {
        if interval == Interval::Day1 {
            Ok(self.master())
        } else {
            self.store.load(interval).map(Arc::new)
        }
    }

    /// Fetch whatever `[start, end)` is missing for `tickers`, merge it into
    /// the persisted dataset and return the requested window.
    ///
    /// Per-fetch failures are logged and skipped. A dataset load or save
    /// failure aborts the call and leaves the master untouched.
    pub fn reconcile(
        &mut self,
        tickers: &[String],
        start: DateTime<Tz>,
        end: DateTime<Tz>,
        interval: Interval,
    ) -> Result<ReconcileOutcome, DataError> {
        self.reconcile_until(tickers, start, end, interval, None)
    }

    /// [`reconcile`](Self::reconcile) that never fetches or stores a bar
    /// dated after `cutoff`.
    pub(crate) fn reconcile_until(
        &mut self,
        tickers: &[String],
        start: DateTime<Tz>,
        end: DateTime<Tz>,
        interval: Interval,
        cutoff: Option<DateTime<Tz>>,
    ) -> Result<ReconcileOutcome, DataError> {
        if end <= start {
            return Err(DataError::InvalidRange(format!(
                "start {start} must be before end {end}"
            )));
        }
        let tickers = normalize_tickers(tickers)?;
        let base = self.dataset(interval)?;

        let mut fetched = Vec::new();
        let mut fetches = 0usize;
        let mut failures = Vec::new();

        for ticker in &tickers {
            let ranges = if base.contains_ticker(ticker) {
                self.missing_ranges(base.series(ticker), start, end, interval)
            } else {
                debug!(ticker = %ticker, interval = %interval, "ticker absent, fetching full range");
                vec![Gap { start, end }]
            };
            let ranges = match cutoff {
                Some(cutoff) => clip_ranges(ranges, interval.advance(cutoff)),
                None => ranges,
            };

            for range in ranges {
                fetches += 1;
                match self.provider.fetch_bars(ticker, range.start, range.end, interval) {
                    Ok(raw) => {
                        let mut bars = normalize(ticker, interval, raw);
                        if let Some(cutoff) = cutoff {
                            bars.retain(|b| b.date <= cutoff);
                        }
                        debug!(
                            ticker = %ticker,
                            start = %range.start,
                            end = %range.end,
                            rows = bars.len(),
                            "fetched range"
                        );
                        fetched.extend(bars);
                    }
                    Err(e) if !e.is_fetch_error() => return Err(e),
                    Err(e) => {
                        warn!(
                            ticker = %ticker,
                            start = %range.start,
                            end = %range.end,
                            error = %e,
                            "fetch failed, continuing without this range"
                        );
                        failures.push(FetchFailure {
                            ticker: ticker.clone(),
                            start: range.start,
                            end: range.end,
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        let fetched_rows = fetched.len();
        let updated = if fetched.is_empty() {
            base
        } else {
            let merged = Arc::new(base.merged(fetched));
            self.store.save(&merged)?;
            merged
        };
        if interval == Interval::Day1 {
            self.master = Arc::clone(&updated);
        }

        let bars = updated.window(&tickers, start, end);
        let empty_tickers: Vec<String> = tickers
            .iter()
            .filter(|t| !bars.iter().any(|b| &b.ticker == *t))
            .cloned()
            .collect();
        for ticker in &empty_tickers {
            warn!(ticker = %ticker, interval = %interval, "no data available for ticker in requested range");
        }

        info!(
            interval = %interval,
            tickers = tickers.len(),
            fetches,
            fetched_rows,
            rows = bars.len(),
            failures = failures.len(),
            "reconciled"
        );
        Ok(ReconcileOutcome {
            bars,
            fetches,
            fetched_rows,
            failures,
            empty_tickers,
        })
    }

    /// Unified missing-range computation for a present ticker.
    ///
    /// Gap detector output, coalesced, minus spans in which the exchange never
    /// traded. Leading and trailing gaps already cover a query that extends
    /// past either end of the cached series.
    pub fn missing_ranges(
        &self,
        series: &[Bar],
        start: DateTime<Tz>,
        end: DateTime<Tz>,
        interval: Interval,
    ) -> Vec<Gap> {
        coalesce(find_gaps(series, start, end, interval))
            .into_iter()
            .filter(|gap| {
                let open = self.market_traded_during(gap);
                if !open {
                    debug!(start = %gap.start, end = %gap.end, "skipping closed-market gap");
                }
                open
            })
            .collect()
    }

    /// Whether any session's trading hours intersect `gap`.
    fn market_traded_during(&self, gap: &Gap) -> bool {
        let first = gap.start.date_naive();
        let last = gap.end.date_naive();
        self.calendar
            .sessions_between(first, last)
            .into_iter()
            .any(|day| match self.session_window(day) {
                Some((open, close)) => open < gap.end && gap.start < close,
                None => true,
            })
    }

    fn session_window(&self, day: NaiveDate) -> Option<(DateTime<Tz>, DateTime<Tz>)> {
        let open = day
            .and_time(self.calendar.open_time())
            .and_local_timezone(EXCHANGE_TZ)
            .earliest()?;
        let close = day
            .and_time(self.calendar.close_time())
            .and_local_timezone(EXCHANGE_TZ)
            .earliest()?;
        Some((open, close))
    }

    /// Latest price per ticker. Lookup failures are logged and reported as
    /// missing prices.
    pub fn latest_prices(&self, tickers: &[String]) -> Result<Vec<Quote>, DataError> {
        let tickers = normalize_tickers(tickers)?;
        Ok(tickers
            .into_iter()
            .map(|ticker| {
                let price = match self.provider.latest_price(&ticker) {
                    Ok(price) => price,
                    Err(e) => {
                        warn!(ticker = %ticker, error = %e, "price lookup failed");
                        None
                    }
                };
                if price.is_none() {
                    warn!(ticker = %ticker, "no live price available");
                }
                Quote { ticker, price }
            })
            .collect())
    }
}

/// Cut every range off at `limit`, dropping those that start at or after it.
fn clip_ranges(ranges: Vec<Gap>, limit: DateTime<Tz>) -> Vec<Gap> {
    ranges
        .into_iter()
        .filter_map(|gap| {
            let end = gap.end.min(limit);
            (gap.start < end).then_some(Gap { start: gap.start, end })
        })
        .collect()
}

/// Trim, upper-case, drop blanks and duplicates (first occurrence kept).
pub fn normalize_tickers(tickers: &[String]) -> Result<Vec<String>, DataError> {
    let mut out: Vec<String> = Vec::with_capacity(tickers.len());
    for t in tickers {
        let t = t.trim().to_uppercase();
        if !t.is_empty() && !out.contains(&t) {
            out.push(t);
        }
    }
    if out.is_empty() {
        return Err(DataError::InvalidRange("no tickers requested".into()));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::NyseCalendar;
    use crate::data::memory::MemoryProvider;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn day(m: u32, d: u32) -> DateTime<Tz> {
        EXCHANGE_TZ.with_ymd_and_hms(2024, m, d, 0, 0, 0).unwrap()
    }

    fn bar(ticker: &str, m: u32, d: u32, close: f64) -> Bar {
        Bar {
            ticker: ticker.into(),
            date: day(m, d),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 100,
        }
    }

    fn tracker(dir: &TempDir, provider: MemoryProvider) -> Tracker<MemoryProvider, NyseCalendar> {
        Tracker::open(DatasetStore::new(dir.path()), provider, NyseCalendar).unwrap()
    }

    #[test]
    fn rejects_inverted_range_before_io() {
        let dir = TempDir::new().unwrap();
        let mut t = tracker(&dir, MemoryProvider::new());
        let err = t
            .reconcile(&["X".into()], day(1, 10), day(1, 1), Interval::Day1)
            .unwrap_err();
        assert!(matches!(err, DataError::InvalidRange(_)));
        assert_eq!(t.provider().call_count(), 0);
    }

    #[test]
    fn rejects_empty_ticker_list() {
        assert!(normalize_tickers(&[" ".into()]).is_err());
        assert_eq!(
            normalize_tickers(&["aapl".into(), "AAPL ".into(), "msft".into()]).unwrap(),
            vec!["AAPL", "MSFT"]
        );
    }

    #[test]
    fn closed_market_gaps_are_skipped() {
        let dir = TempDir::new().unwrap();
        let t = tracker(&dir, MemoryProvider::new());
        // Fri Jan 5 and Mon Jan 8: the weekend gap has no session.
        let series = vec![bar("X", 1, 5, 1.0), bar("X", 1, 8, 1.0)];
        assert!(t.missing_ranges(&series, day(1, 5), day(1, 8), Interval::Day1).is_empty());
        // Thu Jan 4 and Mon Jan 8: Friday is genuinely missing.
        let series = vec![bar("X", 1, 4, 1.0), bar("X", 1, 8, 1.0)];
        let gaps = t.missing_ranges(&series, day(1, 4), day(1, 8), Interval::Day1);
        assert_eq!(gaps, vec![Gap { start: day(1, 5), end: day(1, 8) }]);
    }

    #[test]
    fn master_updates_only_for_daily() {
        let dir = TempDir::new().unwrap();
        let provider = MemoryProvider::new().with_bars(vec![bar("X", 1, 2, 10.0)]);
        let mut t = tracker(&dir, provider);
        let before = t.master();
        t.reconcile(&["X".into()], day(1, 2), day(1, 3), Interval::Day5).unwrap();
        assert!(Arc::ptr_eq(&before, &t.master()));

        t.reconcile(&["X".into()], day(1, 2), day(1, 3), Interval::Day1).unwrap();
        assert_eq!(t.master().len(), 1);
        assert_eq!(before.len(), 0);
    }

    #[test]
    fn cutoff_clips_fetches_and_drops_later_rows() {
        let dir = TempDir::new().unwrap();
        let provider = MemoryProvider::new().with_bars(vec![
            bar("X", 1, 9, 1.0),
            bar("X", 1, 10, 2.0),
            bar("X", 1, 11, 3.0),
        ]);
        let mut t = tracker(&dir, provider);
        let out = t
            .reconcile_until(&["X".into()], day(1, 9), day(1, 12), Interval::Day1, Some(day(1, 10)))
            .unwrap();

        let calls = t.provider().calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].end, day(1, 11));
        assert_eq!(out.fetched_rows, 2);
        assert!(t.master().series("X").iter().all(|b| b.date <= day(1, 10)));

        assert!(clip_ranges(vec![Gap { start: day(1, 12), end: day(1, 13) }], day(1, 11)).is_empty());
    }

    #[test]
    fn latest_prices_report_missing() {
        let dir = TempDir::new().unwrap();
        let provider = MemoryProvider::new().with_price("AAPL", 190.5).failing("BAD");
        let t = tracker(&dir, provider);
        let quotes = t
            .latest_prices(&["aapl".into(), "BAD".into(), "NONE".into()])
            .unwrap();
        assert_eq!(quotes[0], Quote { ticker: "AAPL".into(), price: Some(190.5) });
        assert_eq!(quotes[1].price, None);
        assert_eq!(quotes[2].price, None);
    }
}
