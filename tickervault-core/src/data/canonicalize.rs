//! Normalization of provider rows into canonical bars, plus sort/dedupe.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, TimeZone};
use chrono_tz::Tz;
use tracing::debug;

use super::provider::{ProviderStamp, RawBar};
use crate::domain::{Bar, Interval, EXCHANGE_TZ};

/// Convert raw provider rows into canonical bars for `ticker`.
///
/// Every timestamp becomes exchange-local; daily-or-coarser rows are pinned to
/// local midnight of their session date. Rows whose OHLC are all missing
/// (non-trading placeholders) are dropped; partially missing prices become NaN.
pub fn normalize(ticker: &str, interval: Interval, raw: Vec<RawBar>) -> Vec<Bar> {
    let mut bars = Vec::with_capacity(raw.len());
    let mut insane = 0usize;

    for row in raw {
        if row.open.is_none() && row.high.is_none() && row.low.is_none() && row.close.is_none() {
            continue;
        }
        let Some(date) = canonical_date(row.stamp, interval) else {
            continue;
        };
        let bar = Bar {
            ticker: ticker.to_string(),
            date,
            open: row.open.unwrap_or(f64::NAN),
            high: row.high.unwrap_or(f64::NAN),
            low: row.low.unwrap_or(f64::NAN),
            close: row.close.unwrap_or(f64::NAN),
            volume: row.volume.unwrap_or(0),
        };
        if !bar.is_sane() {
            insane += 1;
        }
        bars.push(bar);
    }

    if insane > 0 {
        debug!(ticker, interval = %interval, insane, "provider rows failed OHLC sanity check");
    }
    bars
}

fn canonical_date(stamp: ProviderStamp, interval: Interval) -> Option<DateTime<Tz>> {
    match (stamp, interval.is_intraday()) {
        (ProviderStamp::Datetime(t), true) => Some(t.with_timezone(&EXCHANGE_TZ)),
        (ProviderStamp::Datetime(t), false) => {
            local_midnight(t.with_timezone(&EXCHANGE_TZ).date_naive())
        }
        (ProviderStamp::Date(d), _) => local_midnight(d),
    }
}

/// Midnight of `date` in exchange-local time.
pub fn local_midnight(date: NaiveDate) -> Option<DateTime<Tz>> {
    EXCHANGE_TZ
        .from_local_datetime(&date.and_time(chrono::NaiveTime::MIN))
        .earliest()
}

/// Sort by (ticker, date) and drop duplicate keys, keeping the last occurrence.
pub fn canonicalize(bars: impl IntoIterator<Item = Bar>) -> Vec<Bar> {
    let mut keyed: BTreeMap<(String, i64), Bar> = BTreeMap::new();
    for bar in bars {
        keyed.insert(bar.key(), bar);
    }
    keyed.into_values().collect()
}
