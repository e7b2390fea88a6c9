//! Alert delivery.
//!
//! Email transport is out of scope; a sink receives the finished report and
//! decides where it goes.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use thiserror::Error;
use tracing::info;

use super::AlertReport;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("failed to deliver alert to {target}: {source}")]
    Io {
        target: String,
        #[source]
        source: io::Error,
    },
}

pub trait AlertSink {
    fn name(&self) -> &str;

    fn deliver(&self, recipient: &str, report: &AlertReport) -> Result<(), DeliveryError>;
}

/// Render a report as an RFC 5322-style plain text message.
pub fn render_message(recipient: &str, report: &AlertReport) -> String {
    format!(
        "To: {recipient}\nSubject: {}\n\n{}\n",
        report.subject(),
        report.body()
    )
}

/// Writes the message to stdout.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl AlertSink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    fn deliver(&self, recipient: &str, report: &AlertReport) -> Result<(), DeliveryError> {
        let mut out = io::stdout().lock();
        out.write_all(render_message(recipient, report).as_bytes())
            .and_then(|()| out.flush())
            .map_err(|source| DeliveryError::Io {
                target: "stdout".into(),
                source,
            })
    }
}

/// Drops one `.eml` file per report into an outbox directory for an external
/// mailer to pick up.
#[derive(Debug, Clone)]
pub struct OutboxSink {
    dir: PathBuf,
}

impl OutboxSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn file_name(report: &AlertReport) -> String {
        format!("alert-{}.eml", report.generated_at.format("%Y%m%dT%H%M%SZ"))
    }
}

impl AlertSink for OutboxSink {
    fn name(&self) -> &str {
        "outbox"
    }

    fn deliver(&self, recipient: &str, report: &AlertReport) -> Result<(), DeliveryError> {
        let path = self.dir.join(Self::file_name(report));
        let io_err = |source| DeliveryError::Io {
            target: path.display().to_string(),
            source,
        };
        fs::create_dir_all(&self.dir).map_err(io_err)?;
        fs::write(&path, render_message(recipient, report)).map_err(io_err)?;
        info!(path = %path.display(), "alert written to outbox");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::SessionState;
    use chrono::{NaiveDate, TimeZone, Utc};
    use tempfile::TempDir;

    fn report() -> AlertReport {
        AlertReport {
            state: SessionState::NonSession,
            date: NaiveDate::from_ymd_opt(2024, 1, 6).unwrap(),
            generated_at: Utc.with_ymd_and_hms(2024, 1, 6, 15, 0, 0).unwrap(),
            lines: vec!["Market closed today (holiday/weekend).".into()],
            alerts: Vec::new(),
        }
    }

    #[test]
    fn message_has_headers_and_body() {
        let msg = render_message("me@x.com", &report());
        assert!(msg.starts_with("To: me@x.com\nSubject: Stock Market Update - 06 Jan 2024\n\n"));
        assert!(msg.contains("Market closed today (holiday/weekend)."));
    }

    #[test]
    fn outbox_writes_one_file() {
        let dir = TempDir::new().unwrap();
        let sink = OutboxSink::new(dir.path().join("outbox"));
        sink.deliver("me@x.com", &report()).unwrap();
        let written = dir.path().join("outbox").join("alert-20240106T150000Z.eml");
        assert!(fs::read_to_string(written).unwrap().contains("Subject: Stock Market Update"));
    }
}
