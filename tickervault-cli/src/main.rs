//! TickerVault CLI — incremental price cache, analytics and alerts.
//!
//! Commands:
//! - `fetch` — reconcile the cache for tickers over a date range and interval
//! - `quote` — latest price per ticker
//! - `analyse` — summary statistics over the last N trading sessions
//! - `chart` — chart-ready CSV for one of the chart kinds
//! - `alerts configure|show|run` — manage and evaluate daily % change alerts

use anyhow::{bail, Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tickervault_core::alerts::{AlertConfig, AlertSink, ConsoleSink, OutboxSink};
use tickervault_core::analytics::{prepare_chart, summarize, ChartKind, ChartOptions, ChartSeries};
use tickervault_core::calendar::NyseCalendar;
use tickervault_core::config::TrackerConfig;
use tickervault_core::data::canonicalize::local_midnight;
use tickervault_core::data::{CircuitBreaker, DatasetStore, Tracker, YahooProvider};
use tickervault_core::domain::{Bar, Interval, EXCHANGE_TZ};

/// Earliest start date accepted by `fetch`.
const EARLIEST_START: (i32, u32, u32) = (1950, 1, 1);

#[derive(Parser)]
#[command(
    name = "tickervault",
    about = "TickerVault — incremental price-bar cache with analytics and alerts"
)]
struct Cli {
    /// Path to a TOML config file. Missing file means defaults.
    #[arg(long, global = true, default_value = "tickervault.toml")]
    config: PathBuf,

    /// Debug-level logging.
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch missing bars into the cache and print the requested window.
    Fetch {
        /// Tickers (e.g., SPY QQQ AAPL).
        #[arg(required = true)]
        tickers: Vec<String>,

        /// Start date (YYYY-MM-DD).
        #[arg(long)]
        start: String,

        /// End date (YYYY-MM-DD), exclusive at the provider.
        #[arg(long)]
        end: String,

        /// Interval code: 1m 2m 5m 15m 30m 60m 90m 1d 5d 1wk 1mo 3mo.
        #[arg(long, default_value = "1d")]
        interval: Interval,

        /// Write the reconciled rows as CSV to stdout.
        #[arg(long, default_value_t = false)]
        csv: bool,
    },
    /// Latest price for each ticker.
    Quote {
        #[arg(required = true)]
        tickers: Vec<String>,
    },
    /// Summary statistics over the last N completed sessions.
    Analyse {
        ticker: String,

        /// Number of trading sessions.
        #[arg(long, default_value_t = 30)]
        days: usize,
    },
    /// Chart-ready CSV: pct-change, volume, moving-average, high-low, cumulative-return.
    Chart {
        kind: ChartKind,

        ticker: String,

        #[arg(long, default_value_t = 30)]
        days: usize,

        /// Starting investment for the cumulative-return chart.
        #[arg(long, default_value_t = 1_000)]
        investment: u64,

        /// Output file. Defaults to stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Daily % change alerts.
    Alerts {
        #[command(subcommand)]
        action: AlertsAction,
    },
}

#[derive(Subcommand)]
enum AlertsAction {
    /// Save the watch list, threshold and recipient.
    Configure {
        #[arg(long, required = true, num_args = 1..)]
        tickers: Vec<String>,

        /// Alert threshold in percent (0-500).
        #[arg(long)]
        threshold: f64,

        #[arg(long)]
        email: String,
    },
    /// Print the saved alert configuration.
    Show,
    /// Evaluate alerts now and deliver the report.
    Run {
        /// Write the report as an .eml file into this directory instead of stdout.
        #[arg(long)]
        outbox: Option<PathBuf>,
    },
}

type LiveTracker = Tracker<YahooProvider, NyseCalendar>;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = TrackerConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Commands::Fetch {
            tickers,
            start,
            end,
            interval,
            csv,
        } => run_fetch(&config, &tickers, &start, &end, interval, csv),
        Commands::Quote { tickers } => run_quote(&config, &tickers),
        Commands::Analyse { ticker, days } => run_analyse(&config, &ticker, days),
        Commands::Chart {
            kind,
            ticker,
            days,
            investment,
            output,
        } => run_chart(&config, kind, &ticker, days, investment, output),
        Commands::Alerts { action } => match action {
            AlertsAction::Configure {
                tickers,
                threshold,
                email,
            } => run_alerts_configure(&config, tickers, threshold, &email),
            AlertsAction::Show => run_alerts_show(&config),
            AlertsAction::Run { outbox } => run_alerts(&config, outbox),
        },
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn open_tracker(config: &TrackerConfig) -> Result<LiveTracker> {
    let circuit_breaker = Arc::new(CircuitBreaker::default_provider());
    let provider = YahooProvider::new(circuit_breaker)?;
    let store = DatasetStore::new(&config.data_dir);
    info!(data_dir = %store.data_dir().display(), "opening dataset store");
    Ok(Tracker::open(store, provider, NyseCalendar)?)
}

/// Today in exchange-local time.
fn exchange_today() -> NaiveDate {
    Utc::now().with_timezone(&EXCHANGE_TZ).date_naive()
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("invalid date '{s}', expected YYYY-MM-DD"))
}

/// Date-range rules for `fetch`, relative to `today`.
fn validate_fetch_range(start: NaiveDate, end: NaiveDate, interval: Interval, today: NaiveDate) -> Result<()> {
    let (y, m, d) = EARLIEST_START;
    let earliest = NaiveDate::from_ymd_opt(y, m, d).context("invalid earliest start")?;
    if start < earliest {
        bail!("start date {start} is before {earliest}");
    }
    if start > today {
        bail!("start date {start} is in the future");
    }
    if end <= start {
        bail!("end date {end} must be after start date {start}");
    }
    if end > today + Duration::days(1) {
        bail!("end date {end} is more than one day in the future");
    }
    interval.check_lookback(start, today)?;
    Ok(())
}

fn check_days(days: usize, min: usize, config: &TrackerConfig) -> Result<()> {
    let max = config.max_lookback_days as usize;
    if days < min || days > max {
        bail!("look-back must be between {min} and {max} trading days, got {days}");
    }
    Ok(())
}

fn run_fetch(
    config: &TrackerConfig,
    tickers: &[String],
    start: &str,
    end: &str,
    interval: Interval,
    csv: bool,
) -> Result<()> {
    let start = parse_date(start)?;
    let end = parse_date(end)?;
    validate_fetch_range(start, end, interval, exchange_today())?;

    let (Some(start_at), Some(end_at)) = (local_midnight(start), local_midnight(end)) else {
        bail!("cannot place {start} .. {end} in exchange time");
    };

    let mut tracker = open_tracker(config)?;
    let outcome = tracker.reconcile(tickers, start_at, end_at, interval)?;

    if csv {
        write_bars_csv(&outcome.bars, io::stdout().lock())?;
    } else {
        println!(
            "{} rows for {} ticker(s) at {interval} ({} provider calls, {} new rows)",
            outcome.bars.len(),
            tickers.len(),
            outcome.fetches,
            outcome.fetched_rows,
        );
        for ticker in outcome.bars.iter().map(|b| b.ticker.as_str()).collect::<std::collections::BTreeSet<_>>() {
            let series: Vec<&Bar> = outcome.bars.iter().filter(|b| b.ticker == ticker).collect();
            if let (Some(first), Some(last)) = (series.first(), series.last()) {
                println!(
                    "  {ticker:<8} {:>6} rows  {} .. {}  last close {:.2}",
                    series.len(),
                    first.date.format("%Y-%m-%d %H:%M"),
                    last.date.format("%Y-%m-%d %H:%M"),
                    last.close
                );
            }
        }
    }
    for ticker in &outcome.empty_tickers {
        eprintln!("No data for {ticker} in the requested range.");
    }
    for failure in &outcome.failures {
        eprintln!(
            "Fetch failed for {} ({} .. {}): {}",
            failure.ticker, failure.start, failure.end, failure.error
        );
    }
    Ok(())
}

fn write_bars_csv(bars: &[Bar], out: impl Write) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(["Date", "Open", "High", "Low", "Close", "Volume", "Ticker"])?;
    for bar in bars {
        writer.write_record([
            bar.date.to_rfc3339(),
            bar.open.to_string(),
            bar.high.to_string(),
            bar.low.to_string(),
            bar.close.to_string(),
            bar.volume.to_string(),
            bar.ticker.clone(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn run_quote(config: &TrackerConfig, tickers: &[String]) -> Result<()> {
    let tracker = open_tracker(config)?;
    for quote in tracker.latest_prices(tickers)? {
        match quote.price {
            Some(price) => println!("{:<8} {price:.2}", quote.ticker),
            None => println!("{:<8} price unavailable", quote.ticker),
        }
    }
    Ok(())
}

fn run_analyse(config: &TrackerConfig, ticker: &str, days: usize) -> Result<()> {
    check_days(days, 2, config)?;
    let mut tracker = open_tracker(config)?;
    let window = tracker.ensure_fresh(ticker, days, Utc::now())?;
    if window.clamped {
        eprintln!(
            "Only {} of {} requested sessions are available for {}.",
            window.effective_days, window.requested_days, window.ticker
        );
    }
    let summary = summarize(&window.ticker, &window.bars)?;
    println!("{summary}");
    Ok(())
}

fn run_chart(
    config: &TrackerConfig,
    kind: ChartKind,
    ticker: &str,
    days: usize,
    investment: u64,
    output: Option<PathBuf>,
) -> Result<()> {
    check_days(days, kind.min_rows(), config)?;
    let mut tracker = open_tracker(config)?;
    let window = tracker.ensure_fresh(ticker, days, Utc::now())?;
    let options = ChartOptions {
        investment,
        ma_period: config.moving_average_period,
    };
    let chart = prepare_chart(kind, &window.ticker, &window.bars, &options)?;
    info!(title = %chart.title, rows = chart.rows.len(), "chart prepared");

    match output {
        Some(path) => {
            let file = std::fs::File::create(&path)
                .with_context(|| format!("creating {}", path.display()))?;
            write_chart_csv(&chart, file)?;
            println!("{} written to {}", chart.title, path.display());
        }
        None => write_chart_csv(&chart, io::stdout().lock())?,
    }
    Ok(())
}

fn write_chart_csv(chart: &ChartSeries, out: impl Write) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    let mut header = vec!["date"];
    header.extend(chart.columns.iter().copied());
    header.push("tag");
    writer.write_record(&header)?;
    for row in &chart.rows {
        let mut record = vec![row.label.clone()];
        record.extend(row.values.iter().map(|v| v.map(|x| format!("{x:.4}")).unwrap_or_default()));
        record.push(row.tag.unwrap_or_default().to_string());
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn run_alerts_configure(config: &TrackerConfig, tickers: Vec<String>, threshold: f64, email: &str) -> Result<()> {
    let alert_config = AlertConfig::new(tickers, threshold, email)?;
    alert_config.save(&config.alert_config)?;
    println!(
        "Alerts configured for {} at {}% -> {} (saved to {})",
        alert_config.tickers.join(", "),
        alert_config.threshold,
        alert_config.recipient_email,
        config.alert_config.display()
    );
    Ok(())
}

fn run_alerts_show(config: &TrackerConfig) -> Result<()> {
    let alert_config = AlertConfig::load(&config.alert_config)?;
    println!("{}", serde_json::to_string_pretty(&alert_config)?);
    Ok(())
}

fn run_alerts(config: &TrackerConfig, outbox: Option<PathBuf>) -> Result<()> {
    let alert_config = AlertConfig::load(&config.alert_config)?;
    let tracker = open_tracker(config)?;
    let report = tracker.evaluate_alerts(&alert_config.tickers, alert_config.threshold, Utc::now())?;

    let sink: Box<dyn AlertSink> = match outbox {
        Some(dir) => Box::new(OutboxSink::new(dir)),
        None => Box::new(ConsoleSink),
    };
    sink.deliver(&alert_config.recipient_email, &report)?;
    info!(sink = sink.name(), lines = report.lines.len(), "alert report delivered");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn fetch_range_rules() {
        let today = d(2024, 6, 14);
        assert!(validate_fetch_range(d(2024, 1, 2), d(2024, 6, 15), Interval::Day1, today).is_ok());
        assert!(validate_fetch_range(d(1949, 12, 31), d(2024, 1, 1), Interval::Day1, today).is_err());
        assert!(validate_fetch_range(d(2024, 6, 15), d(2024, 6, 16), Interval::Day1, today).is_err());
        assert!(validate_fetch_range(d(2024, 6, 1), d(2024, 6, 1), Interval::Day1, today).is_err());
        assert!(validate_fetch_range(d(2024, 6, 1), d(2024, 6, 16), Interval::Day1, today).is_err());
    }

    #[test]
    fn intraday_lookback_floor() {
        let today = d(2024, 6, 14);
        assert!(validate_fetch_range(d(2024, 6, 7), d(2024, 6, 14), Interval::Minute1, today).is_ok());
        assert!(validate_fetch_range(d(2024, 6, 6), d(2024, 6, 14), Interval::Minute1, today).is_err());
        assert!(validate_fetch_range(d(2024, 4, 16), d(2024, 6, 14), Interval::Minute5, today).is_ok());
        assert!(validate_fetch_range(d(2024, 4, 15), d(2024, 6, 14), Interval::Minute5, today).is_err());
    }

    #[test]
    fn days_bounds_follow_config() {
        let config = TrackerConfig::default();
        assert!(check_days(1, 1, &config).is_ok());
        assert!(check_days(1, 2, &config).is_err());
        assert!(check_days(180, 2, &config).is_ok());
        assert!(check_days(181, 2, &config).is_err());
    }

    #[test]
    fn chart_csv_leaves_undefined_cells_empty() {
        let chart = ChartSeries {
            kind: "moving-average",
            title: "t".into(),
            y_label: "Price".into(),
            columns: vec!["close", "moving_average"],
            rows: vec![tickervault_core::analytics::ChartRow {
                label: "02-01-2024".into(),
                values: vec![Some(1.0), None],
                tag: None,
            }],
        };
        let mut buf = Vec::new();
        write_chart_csv(&chart, &mut buf).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "date,close,moving_average,tag\n02-01-2024,1.0000,,\n"
        );
    }
}
