//! Price provider trait and structured error types.
//!
//! The PriceProvider trait abstracts over the upstream bar source (Yahoo
//! Finance, in-memory fixtures) so the reconciler can be driven by a
//! deterministic provider in tests.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use thiserror::Error;

use crate::domain::Interval;

/// Timestamp as the provider reports it.
///
/// Daily-or-coarser responses identify a session date; intraday responses
/// carry a full instant. The reconciler never sees this type: the
/// `canonicalize` step folds both into `Bar::date`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderStamp {
    Date(NaiveDate),
    Datetime(DateTime<Utc>),
}

/// Raw OHLCV row from a provider, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBar {
    pub stamp: ProviderStamp,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<u64>,
}

/// Structured error types for data operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("hard stop: data provider has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("provider error: {0}")]
    Provider(String),

    #[error("corrupt dataset {}: {reason}", path.display())]
    CorruptDataset { path: PathBuf, reason: String },

    #[error("permission denied on {}: {source}", path.display())]
    Permission {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid interval '{0}'")]
    InvalidInterval(String),

    #[error("invalid range: {0}")]
    InvalidRange(String),
}

impl DataError {
    /// Per-fetch failures that the reconciler skips rather than aborting on.
    pub fn is_fetch_error(&self) -> bool {
        matches!(
            self,
            DataError::NetworkUnreachable(_)
                | DataError::RateLimited { .. }
                | DataError::ResponseFormatChanged(_)
                | DataError::SymbolNotFound { .. }
                | DataError::CircuitBreakerTripped
                | DataError::Provider(_)
        )
    }

    /// Map an OS error on a store path, separating permission failures.
    pub fn from_io(path: &Path, source: io::Error) -> Self {
        let path = path.to_path_buf();
        if source.kind() == io::ErrorKind::PermissionDenied {
            DataError::Permission { path, source }
        } else {
            DataError::Io { path, source }
        }
    }
}

/// Trait for upstream bar sources.
///
/// Providers know nothing about the dataset store; the reconciler decides
/// what to ask for.
pub trait PriceProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch bars for `ticker` in `[start, end)`.
    ///
    /// An empty vector means the range holds no trading data, which is not an
    /// error.
    fn fetch_bars(
        &self,
        ticker: &str,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
        interval: Interval,
    ) -> Result<Vec<RawBar>, DataError>;

    /// Latest traded price, if the provider has one.
    fn latest_price(&self, ticker: &str) -> Result<Option<f64>, DataError>;

    /// Check if the provider is currently available (not rate-limited, not blocked).
    fn is_available(&self) -> bool;
}
