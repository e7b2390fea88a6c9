//! Alert evaluator: latest vs previous close against a threshold, gated on
//! the market session state.

pub mod config;
pub mod sink;

pub use config::{validate_email, AlertConfig, AlertConfigError};
pub use sink::{AlertSink, ConsoleSink, DeliveryError, OutboxSink};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::calendar::{SessionState, TradingCalendar};
use crate::data::canonicalize::{local_midnight, normalize};
use crate::data::reconcile::normalize_tickers;
use crate::data::{DataError, PriceProvider, Tracker};
use crate::domain::{Interval, EXCHANGE_TZ};

pub const NO_VALID_ALERTS: &str = "No valid alerts generated today.";
pub const MARKET_NOT_OPEN: &str = "Market not yet open — waiting to open.";
pub const MARKET_OPEN: &str = "Market is open — wait until close for daily % change.";
pub const MARKET_CLOSED: &str = "Market closed today (holiday/weekend).";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Classification {
    Rise,
    Drop,
    Neutral,
}

impl Classification {
    /// RISE above `threshold`, DROP below `-threshold`, NEUTRAL otherwise.
    pub fn of(pct_change: f64, threshold: f64) -> Self {
        if pct_change > threshold {
            Classification::Rise
        } else if pct_change < -threshold {
            Classification::Drop
        } else {
            Classification::Neutral
        }
    }
}

/// One ticker's close-to-close comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickerAlert {
    pub ticker: String,
    pub previous_close: f64,
    pub last_close: f64,
    pub pct_change: f64,
    pub classification: Classification,
}

impl TickerAlert {
    pub fn new(ticker: &str, previous_close: f64, last_close: f64, threshold: f64) -> Self {
        let pct_change = (last_close - previous_close) / previous_close * 100.0;
        Self {
            ticker: ticker.to_string(),
            previous_close,
            last_close,
            pct_change,
            classification: Classification::of(pct_change, threshold),
        }
    }

    pub fn line(&self) -> String {
        match self.classification {
            Classification::Rise => format!("ALERT: {} rose {:+.2}% today!", self.ticker, self.pct_change),
            Classification::Drop => format!("ALERT: {} dropped {:+.2}% today!", self.ticker, self.pct_change),
            Classification::Neutral => format!("ALERT: {} does not meet threshold requirement.", self.ticker),
        }
    }
}

/// Evaluated report: either per-ticker lines (post-close) or one market-state line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertReport {
    #[serde(skip)]
    pub state: SessionState,
    /// Exchange-local date the report is for.
    pub date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub lines: Vec<String>,
    pub alerts: Vec<TickerAlert>,
}

impl AlertReport {
    pub fn subject(&self) -> String {
        format!("Stock Market Update - {}", self.date.format("%d %b %Y"))
    }

    pub fn body(&self) -> String {
        let lines = self.lines.join("\n");
        if self.state == SessionState::PostClose {
            format!("Daily Stock Alerts:\n\n{lines}")
        } else {
            lines
        }
    }
}

impl<P: PriceProvider, C: TradingCalendar> Tracker<P, C> {
    /// Evaluate daily % change alerts for `tickers` as of `now`.
    ///
    /// Before the close (or on a closed day) the report is a single
    /// market-state line and nothing is fetched.
    pub fn evaluate_alerts(
        &self,
        tickers: &[String],
        threshold: f64,
        now: DateTime<Utc>,
    ) -> Result<AlertReport, DataError> {
        if !(0.0..=config::MAX_THRESHOLD).contains(&threshold) {
            return Err(DataError::InvalidRange(format!(
                "threshold must be between 0 and {}, got {threshold}",
                config::MAX_THRESHOLD
            )));
        }
        let tickers = normalize_tickers(tickers)?;
        let date = now.with_timezone(&EXCHANGE_TZ).date_naive();
        let state = SessionState::classify(now, self.calendar());

        let mut alerts = Vec::new();
        let lines = match state {
            SessionState::NonSession => vec![MARKET_CLOSED.to_string()],
            SessionState::PreOpen => vec![MARKET_NOT_OPEN.to_string()],
            SessionState::Open => vec![MARKET_OPEN.to_string()],
            SessionState::PostClose => {
                for ticker in &tickers {
                    match self.last_two_closes(ticker, date) {
                        Ok(Some((prev, last))) => alerts.push(TickerAlert::new(ticker, prev, last, threshold)),
                        Ok(None) => warn!(ticker = %ticker, "not enough data for alert, skipping"),
                        Err(e) => warn!(ticker = %ticker, error = %e, "alert fetch failed, skipping"),
                    }
                }
                if alerts.is_empty() {
                    vec![NO_VALID_ALERTS.to_string()]
                } else {
                    alerts.iter().map(TickerAlert::line).collect()
                }
            }
        };

        info!(state = ?state, tickers = tickers.len(), alerts = alerts.len(), "alerts evaluated");
        Ok(AlertReport {
            state,
            date,
            generated_at: now,
            lines,
            alerts,
        })
    }

    /// (previous close, last close) from the two most recent daily bars up to
    /// and including `today`.
    fn last_two_closes(&self, ticker: &str, today: NaiveDate) -> Result<Option<(f64, f64)>, DataError> {
        let from = self.calendar().previous_session(today).unwrap_or(today - Duration::days(7));
        let (Some(start), Some(end)) = (local_midnight(from), local_midnight(today + Duration::days(1))) else {
            return Ok(None);
        };
        let raw = self.provider().fetch_bars(ticker, start, end, Interval::Day1)?;
        let mut bars = normalize(ticker, Interval::Day1, raw);
        bars.retain(|b| !b.close.is_nan());
        bars.sort_by_key(|b| b.date);
        Ok(match bars.as_slice() {
            [.., prev, last] => Some((prev.close, last.close)),
            _ => None,
        })
    }
}
