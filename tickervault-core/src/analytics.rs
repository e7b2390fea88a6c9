//! Analytics and chart preparation over a reconciled daily window.
//!
//! Everything here is a pure function of the rows passed in: no calendar
//! lookups, no I/O. Rendering is left to whoever consumes a [`ChartSeries`].

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::domain::Bar;

/// Label format for chart x-axes and summaries.
pub const DATE_LABEL_FORMAT: &str = "%d-%m-%Y";

/// Default moving-average window.
pub const DEFAULT_MA_PERIOD: usize = 5;

#[derive(Debug, Error, PartialEq)]
pub enum AnalyticsError {
    #[error("need at least {needed} rows, got {got}")]
    NotEnoughRows { needed: usize, got: usize },

    #[error("unknown chart kind '{0}'")]
    UnknownChart(String),

    #[error("investment must be a positive amount")]
    InvalidInvestment,
}

fn require(bars: &[Bar], needed: usize) -> Result<(), AnalyticsError> {
    if bars.len() < needed {
        Err(AnalyticsError::NotEnoughRows {
            needed,
            got: bars.len(),
        })
    } else {
        Ok(())
    }
}

/// Percent change of close against the previous row. The first row is `None`.
pub fn daily_pct_change(bars: &[Bar]) -> Vec<Option<f64>> {
    std::iter::once(None)
        .chain(
            bars.windows(2)
                .map(|w| Some((w[1].close - w[0].close) / w[0].close * 100.0)),
        )
        .take(bars.len())
        .collect()
}

/// Percent change from the first close to the last.
pub fn range_pct_change(bars: &[Bar]) -> Result<f64, AnalyticsError> {
    require(bars, 2)?;
    let first = bars[0].close;
    let last = bars[bars.len() - 1].close;
    Ok((last - first) / first * 100.0)
}

/// (max high, min low) over the window.
pub fn range_high_low(bars: &[Bar]) -> Result<(f64, f64), AnalyticsError> {
    require(bars, 1)?;
    let high = bars.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
    let low = bars.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
    Ok((high, low))
}

/// Mean volume, rounded to the nearest share.
pub fn average_volume(bars: &[Bar]) -> Result<u64, AnalyticsError> {
    require(bars, 1)?;
    let total: f64 = bars.iter().map(|b| b.volume as f64).sum();
    Ok((total / bars.len() as f64).round() as u64)
}

pub fn average_close(bars: &[Bar]) -> Result<f64, AnalyticsError> {
    require(bars, 1)?;
    Ok(bars.iter().map(|b| b.close).sum::<f64>() / bars.len() as f64)
}

/// Trailing mean of close over `period` rows; `None` for the first
/// `period - 1` rows.
pub fn moving_average(bars: &[Bar], period: usize) -> Vec<Option<f64>> {
    let period = period.max(1);
    let mut out = Vec::with_capacity(bars.len());
    let mut sum = 0.0;
    for (i, bar) in bars.iter().enumerate() {
        sum += bar.close;
        if i >= period {
            sum -= bars[i - period].close;
        }
        out.push((i + 1 >= period).then(|| sum / period as f64));
    }
    out
}

/// Value of `capital` compounded by each row's fractional change. The first
/// row's multiplier is 1.
pub fn cumulative_return(bars: &[Bar], capital: f64) -> Vec<f64> {
    let mut value = capital;
    daily_pct_change(bars)
        .into_iter()
        .map(|pct| {
            value *= 1.0 + pct.map_or(0.0, |p| p / 100.0);
            value
        })
        .collect()
}

/// `high - low` per row.
pub fn high_low_spread(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.high - b.low).collect()
}

/// Stock analysis summary for a window of sessions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisSummary {
    pub ticker: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub sessions: usize,
    /// Last row's change against the row before it.
    pub latest_pct_change: f64,
    pub range_high: f64,
    pub range_low: f64,
    pub average_close: f64,
    pub average_volume: u64,
    pub range_pct_change: f64,
}

impl fmt::Display for AnalysisSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} ({} to {}, {} trading days)",
            self.ticker,
            self.start.format(DATE_LABEL_FORMAT),
            self.end.format(DATE_LABEL_FORMAT),
            self.sessions
        )?;
        writeln!(f, "  Latest change:    {:+.2}%", self.latest_pct_change)?;
        writeln!(f, "  Range high:       {:.2}", self.range_high)?;
        writeln!(f, "  Range low:        {:.2}", self.range_low)?;
        writeln!(f, "  Average close:    {:.2}", self.average_close)?;
        writeln!(f, "  Average volume:   {}", self.average_volume)?;
        write!(f, "  Change over range: {:+.2}%", self.range_pct_change)
    }
}

pub fn summarize(ticker: &str, bars: &[Bar]) -> Result<AnalysisSummary, AnalyticsError> {
    require(bars, 2)?;
    let (range_high, range_low) = range_high_low(bars)?;
    let latest_pct_change = daily_pct_change(bars)
        .last()
        .copied()
        .flatten()
        .unwrap_or(f64::NAN);
    Ok(AnalysisSummary {
        ticker: ticker.to_string(),
        start: bars[0].session_date(),
        end: bars[bars.len() - 1].session_date(),
        sessions: bars.len(),
        latest_pct_change,
        range_high,
        range_low,
        average_close: average_close(bars)?,
        average_volume: average_volume(bars)?,
        range_pct_change: range_pct_change(bars)?,
    })
}

// ── Chart preparation ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    PctChange,
    Volume,
    MovingAverage,
    HighLowRange,
    CumulativeReturn,
}

impl ChartKind {
    pub const ALL: [ChartKind; 5] = [
        ChartKind::PctChange,
        ChartKind::Volume,
        ChartKind::MovingAverage,
        ChartKind::HighLowRange,
        ChartKind::CumulativeReturn,
    ];

    pub fn code(self) -> &'static str {
        match self {
            ChartKind::PctChange => "pct-change",
            ChartKind::Volume => "volume",
            ChartKind::MovingAverage => "moving-average",
            ChartKind::HighLowRange => "high-low",
            ChartKind::CumulativeReturn => "cumulative-return",
        }
    }

    /// Smallest usable look-back for this chart.
    pub fn min_rows(self) -> usize {
        match self {
            ChartKind::Volume => 1,
            _ => 2,
        }
    }
}

impl FromStr for ChartKind {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChartKind::ALL
            .into_iter()
            .find(|k| k.code() == s)
            .ok_or_else(|| AnalyticsError::UnknownChart(s.to_string()))
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One x-axis point: a date label and the plotted values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartRow {
    pub label: String,
    pub values: Vec<Option<f64>>,
    /// Bar colouring hint, e.g. `positive` / `negative`.
    pub tag: Option<&'static str>,
}

/// Render-ready data for one chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub kind: &'static str,
    pub title: String,
    pub y_label: String,
    pub columns: Vec<&'static str>,
    pub rows: Vec<ChartRow>,
}

fn label(bar: &Bar) -> String {
    bar.session_date().format(DATE_LABEL_FORMAT).to_string()
}

/// Chart parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChartOptions {
    /// Starting value for the cumulative-return chart; must be at least 1.
    pub investment: u64,
    pub ma_period: usize,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            investment: 1_000,
            ma_period: DEFAULT_MA_PERIOD,
        }
    }
}

/// Prepare chart data for `kind`.
pub fn prepare_chart(
    kind: ChartKind,
    ticker: &str,
    bars: &[Bar],
    options: &ChartOptions,
) -> Result<ChartSeries, AnalyticsError> {
    require(bars, kind.min_rows())?;
    let days = bars.len();
    let ChartOptions {
        investment,
        ma_period,
    } = *options;

    let (title, y_label, columns, rows) = match kind {
        ChartKind::PctChange => {
            let rows = bars
                .iter()
                .zip(daily_pct_change(bars))
                .skip(1)
                .map(|(bar, pct)| ChartRow {
                    label: label(bar),
                    values: vec![pct],
                    tag: pct.map(|p| if p >= 0.0 { "positive" } else { "negative" }),
                })
                .collect();
            (
                format!("{ticker} - Daily Percentage Change (Last {} Trading Days)", days - 1),
                "% change".to_string(),
                vec!["pct_change"],
                rows,
            )
        }
        ChartKind::Volume => (
            format!("{ticker} - Daily Trading Volume (Last {days} Trading Days)"),
            "Volume".to_string(),
            vec!["volume"],
            bars.iter()
                .map(|b| ChartRow {
                    label: label(b),
                    values: vec![Some(b.volume as f64)],
                    tag: None,
                })
                .collect(),
        ),
        ChartKind::MovingAverage => (
            format!(
                "{ticker} - Closing Price with {ma_period}-Day Moving Average (Last {days} Trading Days)"
            ),
            "Price".to_string(),
            vec!["close", "moving_average"],
            bars.iter()
                .zip(moving_average(bars, ma_period))
                .map(|(b, ma)| ChartRow {
                    label: label(b),
                    values: vec![Some(b.close), ma],
                    tag: None,
                })
                .collect(),
        ),
        ChartKind::HighLowRange => (
            format!("{ticker} - Daily High-Low Range (Last {days} Trading Days)"),
            "Price Range".to_string(),
            vec!["high_low_range"],
            bars.iter()
                .zip(high_low_spread(bars))
                .map(|(b, spread)| ChartRow {
                    label: label(b),
                    values: vec![Some(spread)],
                    tag: None,
                })
                .collect(),
        ),
        ChartKind::CumulativeReturn => {
            if investment < 1 {
                return Err(AnalyticsError::InvalidInvestment);
            }
            (
                format!("{ticker} - Cumulative Returns (Last {days} Trading Days)"),
                format!("Value of a ${investment} Investment"),
                vec!["cumulative_value"],
                bars.iter()
                    .zip(cumulative_return(bars, investment as f64))
                    .map(|(b, v)| ChartRow {
                        label: label(b),
                        values: vec![Some(v)],
                        tag: None,
                    })
                    .collect(),
            )
        }
    };

    Ok(ChartSeries {
        kind: kind.code(),
        title,
        y_label,
        columns,
        rows,
    })
}
