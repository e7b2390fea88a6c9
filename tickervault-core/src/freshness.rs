//! Freshness checker for daily analytics windows.
//!
//! Before an analytics or chart operation, the cached daily tail for a ticker
//! is compared with the most recent completed trading sessions. A mismatch
//! (or an absent ticker) triggers one targeted reconciliation.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::calendar::{SessionState, TradingCalendar};
use crate::data::canonicalize::local_midnight;
use crate::data::reconcile::normalize_tickers;
use crate::data::{DataError, PriceProvider, Tracker};
use crate::domain::{Bar, Interval, EXCHANGE_TZ, MAX_LOOKBACK_DAYS};

/// A fresh daily window for one ticker.
#[derive(Debug, Clone)]
pub struct FreshWindow {
    pub ticker: String,
    /// Last `effective_days` rows, ascending.
    pub bars: Vec<Bar>,
    /// Valid session dates considered, ascending; the newest is the last
    /// completed session.
    pub sessions: Vec<NaiveDate>,
    pub requested_days: usize,
    pub effective_days: usize,
    /// True when fewer rows than requested were available.
    pub clamped: bool,
    /// True when a reconciliation ran.
    pub refreshed: bool,
    pub state: SessionState,
}

impl FreshWindow {
    /// First and last session date of the window, for labelling.
    pub fn date_span(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((self.bars.first()?.session_date(), self.bars.last()?.session_date()))
    }
}

impl<P: PriceProvider, C: TradingCalendar> Tracker<P, C> {
    /// Make sure the last `requested_days` daily bars for `ticker` match the
    /// last completed sessions as of `now`, backfilling if they do not.
    pub fn ensure_fresh(
        &mut self,
        ticker: &str,
        requested_days: usize,
        now: DateTime<Utc>,
    ) -> Result<FreshWindow, DataError> {
        if requested_days == 0 || requested_days > MAX_LOOKBACK_DAYS as usize {
            return Err(DataError::InvalidRange(format!(
                "look-back must be between 1 and {MAX_LOOKBACK_DAYS} days, got {requested_days}"
            )));
        }
        let ticker = normalize_tickers(&[ticker.to_string()])?.remove(0);

        let today = now.with_timezone(&EXCHANGE_TZ).date_naive();
        let state = SessionState::classify(now, self.calendar());
        let last_session = state
            .last_completed_session(today, self.calendar())
            .ok_or_else(|| DataError::InvalidRange(format!("no trading session found before {today}")))?;
        let sessions = self.calendar().sessions_between(
            last_session - Duration::days(i64::from(MAX_LOOKBACK_DAYS)),
            last_session,
        );

        if sessions.is_empty() {
            return Err(DataError::InvalidRange(format!(
                "no trading sessions in the {MAX_LOOKBACK_DAYS} days before {last_session}"
            )));
        }

        let mut n = requested_days;
        if n > sessions.len() {
            warn!(
                ticker = %ticker,
                requested = n,
                available = sessions.len(),
                "look-back exceeds sessions in window, clamping"
            );
            n = sessions.len();
        }
        let expected = &sessions[sessions.len() - n..];

        let actual = completed_tail(&self.master(), &ticker, last_session, n);
        let refreshed = actual != expected;
        if state.is_pre_close() {
            debug!(ticker = %ticker, %today, "today's session is still in progress, excluded");
        }
        if refreshed {
            let start = local_midnight(expected[0]);
            let cutoff = local_midnight(last_session);
            let end = local_midnight(last_session + Duration::days(1));
            let (Some(start), Some(cutoff), Some(end)) = (start, cutoff, end) else {
                return Err(DataError::InvalidRange(format!(
                    "cannot localize {} .. {last_session}",
                    expected[0]
                )));
            };
            info!(
                ticker = %ticker,
                state = ?state,
                expected_last = %last_session,
                actual_last = ?actual.last(),
                "cached tail is stale, reconciling"
            );
            // A live session's bar must not be stored as if it were final.
            self.reconcile_until(&[ticker.clone()], start, end, Interval::Day1, Some(cutoff))?;
        } else {
            debug!(ticker = %ticker, days = n, "cached tail is fresh");
        }

        let master = self.master();
        let series: Vec<&Bar> = master
            .series(&ticker)
            .iter()
            .filter(|b| b.session_date() <= last_session)
            .collect();
        if series.is_empty() {
            return Err(DataError::SymbolNotFound { symbol: ticker });
        }

        let effective_days = n.min(series.len());
        let clamped = effective_days < requested_days;
        if effective_days < n {
            warn!(
                ticker = %ticker,
                requested = requested_days,
                available = effective_days,
                "insufficient history, clamping look-back"
            );
        }
        let bars = series[series.len() - effective_days..]
            .iter()
            .map(|b| (*b).clone())
            .collect();

        Ok(FreshWindow {
            ticker,
            bars,
            sessions,
            requested_days,
            effective_days,
            clamped,
            refreshed,
            state,
        })
    }
}

/// Session dates of the last `n` rows dated on or before `last_session`.
fn completed_tail(
    dataset: &crate::data::Dataset,
    ticker: &str,
    last_session: NaiveDate,
    n: usize,
) -> Vec<NaiveDate> {
    let dates: Vec<NaiveDate> = dataset
        .series(ticker)
        .iter()
        .map(Bar::session_date)
        .filter(|d| *d <= last_session)
        .collect();
    dates[dates.len().saturating_sub(n)..].to_vec()
}
