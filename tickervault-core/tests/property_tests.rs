//! Property tests for cache invariants.
//!
//! Uses proptest to verify:
//! 1. Gap coverage: filling every detected gap leaves no gap behind
//! 2. Gaps are well formed: positive width, ordered, inside the padded query
//! 3. Merge never produces duplicate (ticker, date) keys
//! 4. Datasets stay sorted by ticker then date

use chrono::{DateTime, Duration, NaiveDate};
use chrono_tz::Tz;
use proptest::prelude::*;
use tickervault_core::data::canonicalize::local_midnight;
use tickervault_core::data::gaps::{coalesce, find_gaps};
use tickervault_core::data::Dataset;
use tickervault_core::domain::{Bar, Interval};

mod common;

// ── Strategies (proptest) ────────────────────────────────────────────

fn origin() -> NaiveDate {
    common::date(2024, 1, 1)
}

/// Local midnight `offset` days after the origin (DST-safe).
fn at(offset: i64) -> DateTime<Tz> {
    local_midnight(origin() + Duration::days(offset)).unwrap()
}

fn bar_on(ticker: &str, offset: i64, close: f64) -> Bar {
    common::daily_bar(ticker, origin() + Duration::days(offset), close)
}

/// Distinct day offsets inside a 60-day horizon.
fn arb_offsets() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::btree_set(0i64..60, 0..40).prop_map(|s| s.into_iter().collect())
}

fn arb_query() -> impl Strategy<Value = (i64, i64)> {
    (0i64..50, 1i64..20).prop_map(|(start, len)| (start, start + len))
}

fn arb_rows() -> impl Strategy<Value = Vec<(usize, i64, f64)>> {
    prop::collection::vec((0usize..3, 0i64..30, 1.0..500.0_f64), 0..60)
}

const TICKERS: [&str; 3] = ["AAPL", "MSFT", "SPY"];

// ── 1. Coverage ──────────────────────────────────────────────────────

proptest! {
    /// Adding a bar at every day inside each gap closes all gaps in the query.
    #[test]
    fn filling_gaps_closes_them(offsets in arb_offsets(), (qs, qe) in arb_query()) {
        let series: Vec<Bar> = offsets.iter().map(|&o| bar_on("X", o, 1.0)).collect();
        let (start, end) = (at(qs), at(qe));

        let gaps = coalesce(find_gaps(&series, start, end, Interval::Day1));
        let mut filled = series.clone();
        for gap in &gaps {
            let mut day = gap.start;
            while day < gap.end {
                filled.push(bar_on("X", (day.date_naive() - origin()).num_days(), 1.0));
                day = Interval::Day1.advance(day);
            }
        }
        let filled = Dataset::from_bars(Interval::Day1, filled);

        // Only the query's own half-open range must be covered.
        let remaining: Vec<_> = find_gaps(filled.series("X"), start, end, Interval::Day1)
            .into_iter()
            .filter(|g| g.start < end)
            .collect();
        prop_assert!(remaining.is_empty(), "left over: {:?}", remaining);
    }

    /// Every gap has positive width, gaps are ordered and disjoint, and none
    /// reaches beyond one step past the query end.
    #[test]
    fn gaps_are_well_formed(offsets in arb_offsets(), (qs, qe) in arb_query()) {
        let series: Vec<Bar> = offsets.iter().map(|&o| bar_on("X", o, 1.0)).collect();
        let (start, end) = (at(qs), at(qe));

        let gaps = find_gaps(&series, start, end, Interval::Day1);
        for gap in &gaps {
            prop_assert!(gap.end > gap.start);
            prop_assert!(gap.start >= start);
            prop_assert!(gap.end <= Interval::Day1.advance(end));
            // No cached bar sits inside a gap.
            prop_assert!(!series.iter().any(|b| gap.contains(b.date)));
        }
        for pair in gaps.windows(2) {
            prop_assert!(pair[0].end <= pair[1].start);
        }
    }
}

// ── 2. Merge ─────────────────────────────────────────────────────────

proptest! {
    /// Merging overlapping chunks never yields two rows with the same key.
    #[test]
    fn merge_never_duplicates(cached in arb_rows(), fetched in arb_rows()) {
        let to_bars = |rows: &[(usize, i64, f64)]| -> Vec<Bar> {
            rows.iter().map(|&(t, o, c)| bar_on(TICKERS[t], o, c)).collect()
        };
        let dataset = Dataset::from_bars(Interval::Day1, to_bars(&cached));
        let merged = dataset.merged(to_bars(&fetched));

        let mut keys: Vec<_> = merged.bars().iter().map(|b| b.key()).collect();
        let before = keys.len();
        keys.dedup();
        prop_assert_eq!(keys.len(), before);
    }

    /// Merged output is sorted by ticker, then date, and fetched rows win.
    #[test]
    fn merge_is_ordered_and_fetched_wins(cached in arb_rows(), fetched in arb_rows()) {
        let dataset = Dataset::from_bars(
            Interval::Day1,
            cached.iter().map(|&(t, o, c)| bar_on(TICKERS[t], o, c)),
        );
        let fetched_bars: Vec<Bar> = fetched
            .iter()
            .map(|&(t, o, c)| bar_on(TICKERS[t], o, c + 1000.0))
            .collect();
        let merged = dataset.merged(fetched_bars.clone());

        for pair in merged.bars().windows(2) {
            prop_assert!((&pair[0].ticker, pair[0].date) < (&pair[1].ticker, pair[1].date));
        }
        for bar in &fetched_bars {
            let hit = merged
                .series(&bar.ticker)
                .iter()
                .find(|b| b.date == bar.date)
                .map(|b| b.close);
            // Last fetched occurrence of a key wins; all fetched closes are > 1000.
            prop_assert!(hit.is_some_and(|c| c > 1000.0));
        }
    }
}
