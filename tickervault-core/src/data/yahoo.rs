//! Yahoo Finance price provider.
//!
//! Fetches OHLCV bars from Yahoo's v8 chart API at any catalog interval.
//! Handles rate limiting, retries with exponential backoff, response parsing
//! and the circuit breaker. A range with no trading yields an empty result,
//! not an error.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::{debug, warn};

use super::circuit_breaker::CircuitBreaker;
use super::provider::{DataError, PriceProvider, ProviderStamp, RawBar};
use crate::domain::{Interval, EXCHANGE_TZ};

const BASE_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart";

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: Option<Indicators>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    regular_market_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct QuoteData {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<u64>>,
}

pub struct YahooProvider {
    client: reqwest::blocking::Client,
    circuit_breaker: Arc<CircuitBreaker>,
    max_retries: u32,
    base_delay: Duration,
}

impl YahooProvider {
    pub fn new(circuit_breaker: Arc<CircuitBreaker>) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| DataError::Provider(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            circuit_breaker,
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        })
    }

    fn chart_url(ticker: &str, start: DateTime<Tz>, end: DateTime<Tz>, interval: Interval) -> String {
        format!(
            "{BASE_URL}/{ticker}?period1={}&period2={}&interval={}&includePrePost=false",
            start.timestamp(),
            end.timestamp(),
            interval.code()
        )
    }

    fn quote_url(ticker: &str) -> String {
        format!("{BASE_URL}/{ticker}?range=1d&interval=1m")
    }

    fn first_result(ticker: &str, resp: ChartResponse) -> Result<Option<ChartData>, DataError> {
        match (resp.chart.result, resp.chart.error) {
            (Some(results), _) => Ok(results.into_iter().next()),
            (None, Some(err)) if err.code == "Not Found" => Err(DataError::SymbolNotFound {
                symbol: ticker.to_string(),
            }),
            (None, Some(err)) => Err(DataError::ResponseFormatChanged(format!(
                "{}: {}",
                err.code, err.description
            ))),
            (None, None) => Err(DataError::ResponseFormatChanged(
                "empty result with no error".into(),
            )),
        }
    }

    fn parse_bars(ticker: &str, interval: Interval, resp: ChartResponse) -> Result<Vec<RawBar>, DataError> {
        let Some(data) = Self::first_result(ticker, resp)? else {
            return Ok(Vec::new());
        };
        // No timestamps: the range covered no trading.
        let Some(timestamps) = data.timestamp else {
            return Ok(Vec::new());
        };
        let quote = data
            .indicators
            .and_then(|i| i.quote.into_iter().next())
            .ok_or_else(|| DataError::ResponseFormatChanged("no quote data".into()))?;

        let mut bars = Vec::with_capacity(timestamps.len());
        for (i, &ts) in timestamps.iter().enumerate() {
            let instant = DateTime::<Utc>::from_timestamp(ts, 0)
                .ok_or_else(|| DataError::ResponseFormatChanged(format!("invalid timestamp: {ts}")))?;
            let stamp = if interval.is_intraday() {
                ProviderStamp::Datetime(instant)
            } else {
                ProviderStamp::Date(instant.with_timezone(&EXCHANGE_TZ).date_naive())
            };
            bars.push(RawBar {
                stamp,
                open: quote.open.get(i).copied().flatten(),
                high: quote.high.get(i).copied().flatten(),
                low: quote.low.get(i).copied().flatten(),
                close: quote.close.get(i).copied().flatten(),
                volume: quote.volume.get(i).copied().flatten(),
            });
        }
        Ok(bars)
    }

    /// GET `url` with retry, backoff and circuit-breaker bookkeeping.
    fn get_with_retry(&self, ticker: &str, url: &str) -> Result<ChartResponse, DataError> {
        if !self.circuit_breaker.is_allowed() {
            return Err(DataError::CircuitBreakerTripped);
        }

        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.pow(attempt - 1);
                debug!(ticker, attempt, delay_ms = delay.as_millis() as u64, "retrying provider request");
                std::thread::sleep(delay);
            }
            if !self.circuit_breaker.is_allowed() {
                return Err(DataError::CircuitBreakerTripped);
            }

            let resp = match self.client.get(url).send() {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    last_error = Some(DataError::NetworkUnreachable(e.to_string()));
                    continue;
                }
                Err(e) => return Err(DataError::NetworkUnreachable(e.to_string())),
            };

            let status = resp.status();
            if status == reqwest::StatusCode::FORBIDDEN {
                self.circuit_breaker.trip();
                return Err(DataError::CircuitBreakerTripped);
            }
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                self.circuit_breaker.record_failure();
                let retry_after = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                warn!(ticker, retry_after, "rate limited by provider");
                last_error = Some(DataError::RateLimited {
                    retry_after_secs: retry_after,
                });
                continue;
            }
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(DataError::SymbolNotFound {
                    symbol: ticker.to_string(),
                });
            }
            if !status.is_success() {
                self.circuit_breaker.record_failure();
                last_error = Some(DataError::Provider(format!("HTTP {status} for {ticker}")));
                continue;
            }

            let chart: ChartResponse = resp.json().map_err(|e| {
                DataError::ResponseFormatChanged(format!("failed to parse response for {ticker}: {e}"))
            })?;
            self.circuit_breaker.record_success();
            return Ok(chart);
        }

        Err(last_error.unwrap_or_else(|| DataError::Provider("max retries exceeded".into())))
    }
}

impl PriceProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn fetch_bars(
        &self,
        ticker: &str,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
        interval: Interval,
    ) -> Result<Vec<RawBar>, DataError> {
        let url = Self::chart_url(ticker, start, end, interval);
        let chart = self.get_with_retry(ticker, &url)?;
        Self::parse_bars(ticker, interval, chart)
    }

    fn latest_price(&self, ticker: &str) -> Result<Option<f64>, DataError> {
        let chart = self.get_with_retry(ticker, &Self::quote_url(ticker))?;
        Ok(Self::first_result(ticker, chart)?
            .and_then(|d| d.meta)
            .and_then(|m| m.regular_market_price))
    }

    fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }
}
