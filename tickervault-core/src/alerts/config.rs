//! Alert configuration persisted as JSON (`alert_config.json` by default).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest accepted alert threshold, in percent.
pub const MAX_THRESHOLD: f64 = 500.0;

#[derive(Debug, Error)]
pub enum AlertConfigError {
    #[error("alerts are not configured yet ({}); run `alerts configure` first", path.display())]
    NotConfigured { path: PathBuf },

    #[error("{} is corrupted or not valid JSON: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

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

    #[error("at least one ticker is required")]
    NoTickers,

    #[error("threshold must be between 0 and 500, got {0}")]
    InvalidThreshold(f64),

    #[error("invalid email address '{address}': {reason}")]
    InvalidEmail { address: String, reason: &'static str },
}

impl AlertConfigError {
    fn from_io(path: &Path, source: io::Error) -> Self {
        let path = path.to_path_buf();
        match source.kind() {
            io::ErrorKind::PermissionDenied => AlertConfigError::Permission { path, source },
            _ => AlertConfigError::Io { path, source },
        }
    }
}

/// Tickers to watch, the alert threshold (percent) and where to send reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertConfig {
    pub tickers: Vec<String>,
    pub threshold: f64,
    pub recipient_email: String,
}

impl AlertConfig {
    /// Build a validated config. Tickers are trimmed and upper-cased.
    pub fn new(
        tickers: impl IntoIterator<Item = String>,
        threshold: f64,
        recipient_email: impl Into<String>,
    ) -> Result<Self, AlertConfigError> {
        let mut normalized: Vec<String> = Vec::new();
        for t in tickers {
            let t = t.trim().to_uppercase();
            if !t.is_empty() && !normalized.contains(&t) {
                normalized.push(t);
            }
        }
        let config = Self {
            tickers: normalized,
            threshold,
            recipient_email: recipient_email.into().trim().to_string(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AlertConfigError> {
        if self.tickers.is_empty() {
            return Err(AlertConfigError::NoTickers);
        }
        if !(0.0..=MAX_THRESHOLD).contains(&self.threshold) {
            return Err(AlertConfigError::InvalidThreshold(self.threshold));
        }
        validate_email(&self.recipient_email)
    }

    /// Load and validate. A missing file or an empty ticker list / recipient
    /// means alerts were never configured.
    pub fn load(path: &Path) -> Result<Self, AlertConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(AlertConfigError::NotConfigured {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => return Err(AlertConfigError::from_io(path, e)),
        };
        let config: AlertConfig =
            serde_json::from_str(&content).map_err(|source| AlertConfigError::Corrupt {
                path: path.to_path_buf(),
                source,
            })?;
        if config.tickers.is_empty() || config.recipient_email.is_empty() {
            return Err(AlertConfigError::NotConfigured {
                path: path.to_path_buf(),
            });
        }
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), AlertConfigError> {
        self.validate()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| AlertConfigError::from_io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| AlertConfigError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(|e| AlertConfigError::from_io(path, e))
    }
}

/// Recipient address rules: one `@`, no spaces, a non-empty local part with no
/// leading, trailing or doubled dots, and a dotted domain whose last label has
/// at least two characters.
pub fn validate_email(address: &str) -> Result<(), AlertConfigError> {
    let fail = |reason: &'static str| -> Result<(), AlertConfigError> {
        Err(AlertConfigError::InvalidEmail {
            address: address.to_string(),
            reason,
        })
    };

    if address.contains(char::is_whitespace) {
        return fail("contains spaces");
    }
    let mut parts = address.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return fail("must contain exactly one '@'");
    };
    if local.is_empty() || domain.is_empty() {
        return fail("local part and domain must be non-empty");
    }
    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return fail("misplaced '.' in local part");
    }
    if domain.starts_with('.') {
        return fail("domain starts with '.'");
    }
    if !domain.contains('.') {
        return fail("domain must contain '.'");
    }
    match domain.rsplit('.').next() {
        Some(tld) if tld.len() >= 2 => Ok(()),
        _ => fail("top-level domain too short"),
    }
}
