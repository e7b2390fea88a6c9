//! Flat per-interval CSV dataset store.
//!
//! Layout: `{data_dir}/historical_data_{interval}.csv`, columns
//! `Date,Open,High,Low,Close,Volume,Ticker`.
//!
//! - Dates are written as RFC 3339 UTC and re-read into America/New_York
//! - Atomic writes (write to .tmp, rename into place)
//! - A missing file loads as an empty dataset; an unparseable one is an error
//! - Metadata sidecar `{file}.meta.json` (row count, tickers, BLAKE3 hash)

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::canonicalize::local_midnight;
use super::dataset::Dataset;
use super::provider::DataError;
use crate::domain::{Bar, Interval, EXCHANGE_TZ};

/// Metadata sidecar written next to each dataset file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMeta {
    pub interval: String,
    pub rows: usize,
    pub tickers: Vec<String>,
    pub data_hash: String,
    pub written_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Open")]
    open: Option<f64>,
    #[serde(rename = "High")]
    high: Option<f64>,
    #[serde(rename = "Low")]
    low: Option<f64>,
    #[serde(rename = "Close")]
    close: Option<f64>,
    #[serde(rename = "Volume")]
    volume: Option<f64>,
    #[serde(rename = "Ticker")]
    ticker: String,
}

#[derive(Debug, Serialize)]
struct CsvOut<'a> {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Open")]
    open: f64,
    #[serde(rename = "High")]
    high: f64,
    #[serde(rename = "Low")]
    low: f64,
    #[serde(rename = "Close")]
    close: f64,
    #[serde(rename = "Volume")]
    volume: u64,
    #[serde(rename = "Ticker")]
    ticker: &'a str,
}

#[derive(Debug, Clone)]
pub struct DatasetStore {
    data_dir: PathBuf,
}

impl DatasetStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// `{data_dir}/historical_data_{code}.csv`
    pub fn path(&self, interval: Interval) -> PathBuf {
        self.data_dir
            .join(format!("historical_data_{}.csv", interval.code()))
    }

    fn meta_path(&self, interval: Interval) -> PathBuf {
        let mut name = self.path(interval).into_os_string();
        name.push(".meta.json");
        PathBuf::from(name)
    }

    /// Load the dataset for `interval`. A missing file is an empty dataset.
    pub fn load(&self, interval: Interval) -> Result<Dataset, DataError> {
        let path = self.path(interval);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no dataset on disk, starting empty");
                return Ok(Dataset::empty(interval));
            }
            Err(e) => return Err(DataError::from_io(&path, e)),
        };

        self.check_sidecar(interval, &bytes);
        let bars = parse_csv(&path, &bytes)?;
        let dataset = Dataset::from_bars(interval, bars);
        debug!(path = %path.display(), rows = dataset.len(), "loaded dataset");
        Ok(dataset)
    }

    /// Persist `dataset` atomically, then refresh the sidecar.
    pub fn save(&self, dataset: &Dataset) -> Result<(), DataError> {
        let interval = dataset.interval();
        let path = self.path(interval);
        fs::create_dir_all(&self.data_dir).map_err(|e| DataError::from_io(&self.data_dir, e))?;

        let bytes = render_csv(&path, dataset)?;
        let tmp_path = path.with_extension("csv.tmp");
        fs::write(&tmp_path, &bytes).map_err(|e| DataError::from_io(&tmp_path, e))?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            DataError::from_io(&path, e)
        })?;

        let meta = StoreMeta {
            interval: interval.code().to_string(),
            rows: dataset.len(),
            tickers: dataset.tickers().into_iter().map(String::from).collect(),
            data_hash: blake3::hash(&bytes).to_hex().to_string(),
            written_at: Utc::now(),
        };
        let meta_path = self.meta_path(interval);
        let meta_json = serde_json::to_string_pretty(&meta).map_err(|e| DataError::Io {
            path: meta_path.clone(),
            source: io::Error::other(e),
        })?;
        fs::write(&meta_path, meta_json).map_err(|e| DataError::from_io(&meta_path, e))?;

        info!(path = %path.display(), rows = dataset.len(), "dataset saved");
        Ok(())
    }

    /// Sidecar for `interval`, if present and readable.
    pub fn meta(&self, interval: Interval) -> Option<StoreMeta> {
        let content = fs::read_to_string(self.meta_path(interval)).ok()?;
        serde_json::from_str(&content).ok()
    }

    fn check_sidecar(&self, interval: Interval, bytes: &[u8]) {
        let Some(meta) = self.meta(interval) else {
            return;
        };
        let actual = blake3::hash(bytes).to_hex().to_string();
        if actual != meta.data_hash {
            warn!(
                interval = %interval,
                expected = %meta.data_hash,
                actual = %actual,
                "dataset hash differs from sidecar (edited outside the tracker?)"
            );
        }
    }
}

fn parse_csv(path: &Path, bytes: &[u8]) -> Result<Vec<Bar>, DataError> {
    let corrupt = |reason: String| DataError::CorruptDataset {
        path: path.to_path_buf(),
        reason,
    };

    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(bytes);
    let mut bars = Vec::new();
    for (i, record) in reader.deserialize::<CsvRow>().enumerate() {
        let row = record.map_err(|e| corrupt(format!("row {}: {e}", i + 1)))?;
        let date = parse_date(&row.date)
            .ok_or_else(|| corrupt(format!("row {}: unparseable date '{}'", i + 1, row.date)))?;
        if row.ticker.is_empty() {
            return Err(corrupt(format!("row {}: empty ticker", i + 1)));
        }
        bars.push(Bar {
            ticker: row.ticker,
            date,
            open: row.open.unwrap_or(f64::NAN),
            high: row.high.unwrap_or(f64::NAN),
            low: row.low.unwrap_or(f64::NAN),
            close: row.close.unwrap_or(f64::NAN),
            volume: row.volume.map(|v| v.max(0.0).round() as u64).unwrap_or(0),
        });
    }
    Ok(bars)
}

/// Offset timestamps (RFC 3339 or `YYYY-MM-DD HH:MM:SS+HH:MM`) convert to
/// exchange-local time; a bare date is local midnight.
fn parse_date(s: &str) -> Option<DateTime<Tz>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&EXCHANGE_TZ));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&EXCHANGE_TZ));
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(local_midnight)
}

fn render_csv(path: &Path, dataset: &Dataset) -> Result<Vec<u8>, DataError> {
    let io_err = |e: csv::Error| DataError::Io {
        path: path.to_path_buf(),
        source: io::Error::other(e),
    };
    let mut writer = csv::Writer::from_writer(Vec::new());
    for bar in dataset.bars() {
        writer
            .serialize(CsvOut {
                date: bar
                    .date
                    .with_timezone(&Utc)
                    .to_rfc3339_opts(SecondsFormat::Secs, true),
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
                ticker: &bar.ticker,
            })
            .map_err(io_err)?;
    }
    if dataset.is_empty() {
        writer
            .write_record(["Date", "Open", "High", "Low", "Close", "Volume", "Ticker"])
            .map_err(io_err)?;
    }
    writer.into_inner().map_err(|e| DataError::Io {
        path: path.to_path_buf(),
        source: io::Error::other(e.to_string()),
    })
}
