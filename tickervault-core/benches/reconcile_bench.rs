//! Criterion benchmarks for cache hot paths.
//!
//! Benchmarks:
//! 1. Gap detection over a long daily series with holes
//! 2. Dataset merge of a fetched chunk into a multi-ticker dataset
//! 3. Analytics transforms over a 180-session window

use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use tickervault_core::analytics::{cumulative_return, daily_pct_change, moving_average, summarize};
use tickervault_core::calendar::{NyseCalendar, TradingCalendar};
use tickervault_core::data::canonicalize::local_midnight;
use tickervault_core::data::gaps::{coalesce, find_gaps};
use tickervault_core::data::Dataset;
use tickervault_core::domain::{Bar, Interval};

// ── Helpers ──────────────────────────────────────────────────────────

fn make_bars(ticker: &str, from: NaiveDate, to: NaiveDate) -> Vec<Bar> {
    NyseCalendar
        .sessions_between(from, to)
        .into_iter()
        .enumerate()
        .filter_map(|(i, day)| {
            let close = 100.0 + (i as f64 * 0.1).sin() * 10.0;
            Some(Bar {
                ticker: ticker.to_string(),
                date: local_midnight(day)?,
                open: close - 0.3,
                high: close + 1.5,
                low: close - 1.5,
                close,
                volume: 1_000_000 + (i as u64 % 500_000),
            })
        })
        .collect()
}

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 3).unwrap()
}

// ── 1. Gap detection ─────────────────────────────────────────────────

fn bench_gaps(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_gaps");
    for years in [1i64, 5, 20] {
        let end = start() + Duration::days(365 * years);
        let series: Vec<Bar> = make_bars("SPY", start(), end)
            .into_iter()
            .enumerate()
            .filter(|(i, _)| i % 37 != 0)
            .map(|(_, b)| b)
            .collect();
        let (from, to) = (local_midnight(start()).unwrap(), local_midnight(end).unwrap());

        group.bench_with_input(BenchmarkId::from_parameter(years), &series, |b, series| {
            b.iter(|| coalesce(find_gaps(black_box(series), from, to, Interval::Day1)))
        });
    }
    group.finish();
}

// ── 2. Merge ─────────────────────────────────────────────────────────

fn bench_merge(c: &mut Criterion) {
    let end = start() + Duration::days(365 * 10);
    let cached: Vec<Bar> = ["AAPL", "MSFT", "QQQ", "SPY"]
        .iter()
        .flat_map(|t| make_bars(t, start(), end))
        .collect();
    let dataset = Dataset::from_bars(Interval::Day1, cached);
    let fetched = make_bars("NVDA", start(), end);

    c.bench_function("dataset_merge_10y", |b| {
        b.iter(|| dataset.merged(black_box(fetched.clone())))
    });
}

// ── 3. Analytics ─────────────────────────────────────────────────────

fn bench_analytics(c: &mut Criterion) {
    let window: Vec<Bar> = make_bars("SPY", start(), start() + Duration::days(270))
        .into_iter()
        .take(180)
        .collect();

    c.bench_function("summary_180", |b| b.iter(|| summarize("SPY", black_box(&window))));
    c.bench_function("pct_change_180", |b| b.iter(|| daily_pct_change(black_box(&window))));
    c.bench_function("moving_average_180", |b| {
        b.iter(|| moving_average(black_box(&window), 5))
    });
    c.bench_function("cumulative_return_180", |b| {
        b.iter(|| cumulative_return(black_box(&window), 1_000.0))
    });
}

criterion_group!(benches, bench_gaps, bench_merge, bench_analytics);
criterion_main!(benches);
