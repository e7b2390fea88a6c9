//! Range gap detection over a single-ticker series.
//!
//! Gaps are found with one step of tolerance only: two consecutive bars more
//! than one step apart have a gap between them, whether or not the market was
//! open in between. Calendar awareness lives in the reconciler.

use chrono::DateTime;
use chrono_tz::Tz;

use crate::domain::{Bar, Interval};

/// Half-open span `[start, end)` with no bars, in exchange-local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gap {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

impl Gap {
    fn new(start: DateTime<Tz>, end: DateTime<Tz>) -> Option<Self> {
        (end > start).then_some(Self { start, end })
    }

    pub fn contains(&self, t: DateTime<Tz>) -> bool {
        self.start <= t && t < self.end
    }
}

/// Missing sub-ranges of `series` within the query `[start, end)`.
///
/// `series` must hold bars for one ticker. Rows are filtered to
/// `[start, end]` (inclusive) before comparison; the trailing gap runs one
/// step past `end` so the provider's exclusive upper bound still returns the
/// boundary bar. No trailing gap is reported when the next bar after the last
/// cached one would already fall after `end`.
pub fn find_gaps(series: &[Bar], start: DateTime<Tz>, end: DateTime<Tz>, interval: Interval) -> Vec<Gap> {
    let mut dates: Vec<DateTime<Tz>> = series
        .iter()
        .map(|b| b.date)
        .filter(|d| *d >= start && *d <= end)
        .collect();
    dates.sort();
    dates.dedup();

    let (Some(&first), Some(&last)) = (dates.first(), dates.last()) else {
        return Gap::new(start, end).into_iter().collect();
    };

    let mut gaps = Vec::new();
    if first > start {
        gaps.extend(Gap::new(start, first));
    }
    for pair in dates.windows(2) {
        let (cur, next) = (pair[0], pair[1]);
        let expected = interval.advance(cur);
        if expected < next {
            gaps.extend(Gap::new(expected, next));
        }
    }
    let after_last = interval.advance(last);
    if after_last <= end {
        gaps.extend(Gap::new(after_last, interval.advance(end)));
    }
    gaps
}

/// Merge gaps that overlap or touch into single spans, ordered by start.
pub fn coalesce(mut gaps: Vec<Gap>) -> Vec<Gap> {
    gaps.sort_by_key(|g| g.start);
    let mut out: Vec<Gap> = Vec::with_capacity(gaps.len());
    for gap in gaps {
        match out.last_mut() {
            Some(prev) if gap.start <= prev.end => prev.end = prev.end.max(gap.end),
            _ => out.push(gap),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EXCHANGE_TZ;
    use chrono::TimeZone;

    fn day(d: u32) -> DateTime<Tz> {
        EXCHANGE_TZ.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    fn series(days: &[u32]) -> Vec<Bar> {
        days.iter()
            .map(|&d| Bar {
                ticker: "X".into(),
                date: day(d),
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 1,
            })
            .collect()
    }

    #[test]
    fn empty_series_is_one_gap() {
        let gaps = find_gaps(&[], day(1), day(10), Interval::Day1);
        assert_eq!(gaps, vec![Gap { start: day(1), end: day(10) }]);
    }

    #[test]
    fn leading_internal_and_trailing_gaps() {
        let gaps = find_gaps(&series(&[3, 4, 5, 8, 9]), day(1), day(12), Interval::Day1);
        assert_eq!(
            gaps,
            vec![
                Gap { start: day(1), end: day(3) },
                Gap { start: day(6), end: day(8) },
                Gap { start: day(10), end: day(13) },
            ]
        );
    }

    #[test]
    fn exact_step_neighbours_produce_no_gap() {
        let gaps = find_gaps(&series(&[1, 2, 3, 4]), day(1), day(4), Interval::Day1);
        assert!(gaps.is_empty());
    }

    #[test]
    fn rows_outside_query_are_ignored() {
        let gaps = find_gaps(&series(&[1, 2, 20]), day(5), day(6), Interval::Day1);
        assert_eq!(gaps, vec![Gap { start: day(5), end: day(6) }]);
    }

    #[test]
    fn weekend_counts_as_gap_without_calendar() {
        // Jan 5 2024 is a Friday, Jan 8 a Monday.
        let gaps = find_gaps(&series(&[5, 8]), day(5), day(8), Interval::Day1);
        assert_eq!(gaps, vec![Gap { start: day(6), end: day(8) }]);
    }

    #[test]
    fn consecutive_month_starts_have_no_gap() {
        let month = |m: u32| EXCHANGE_TZ.with_ymd_and_hms(2024, m, 1, 0, 0, 0).unwrap();
        let bars: Vec<Bar> = (1..=6)
            .map(|m| Bar { date: month(m), ..series(&[1]).remove(0) })
            .collect();
        assert!(find_gaps(&bars, month(1), month(6), Interval::Month1).is_empty());

        // May is missing; June sits exactly on the query end.
        let holed: Vec<Bar> = bars.iter().filter(|b| b.date != month(5)).cloned().collect();
        assert_eq!(
            find_gaps(&holed, month(1), month(6), Interval::Month1),
            vec![Gap { start: month(5), end: month(6) }]
        );
    }

    #[test]
    fn no_trailing_gap_when_next_period_is_past_end() {
        // Weekly bars on Mondays; the query ends on Friday Jan 12.
        let gaps = find_gaps(&series(&[1, 8]), day(1), day(12), Interval::Week1);
        assert!(gaps.is_empty());
        // Ending on the next Monday asks for that bar.
        let gaps = find_gaps(&series(&[1, 8]), day(1), day(15), Interval::Week1);
        assert_eq!(gaps, vec![Gap { start: day(15), end: day(22) }]);
    }

    #[test]
    fn coalesce_merges_touching_and_overlapping() {
        let merged = coalesce(vec![
            Gap { start: day(8), end: day(10) },
            Gap { start: day(1), end: day(3) },
            Gap { start: day(3), end: day(4) },
            Gap { start: day(9), end: day(12) },
        ]);
        assert_eq!(
            merged,
            vec![Gap { start: day(1), end: day(4) }, Gap { start: day(8), end: day(12) }]
        );
    }

    #[test]
    fn gap_contains_is_half_open() {
        let gap = Gap { start: day(1), end: day(3) };
        assert!(gap.contains(day(1)));
        assert!(gap.contains(day(2)));
        assert!(!gap.contains(day(3)));
    }
}
