//! Month windows bounding each paginated measurement fetch.

use chrono::{Duration, TimeZone, Utc};

use crate::TimeWindow;

// ---

/// Split `year` into twelve inclusive monthly windows.
///
/// Each window ends one second before the next one starts; December ends at
/// `year-12-31T23:59:59Z`.
pub fn month_ranges(year: i32) -> Vec<TimeWindow> {
    // ---
    let month_start = |y: i32, m: u32| {
        Utc.with_ymd_and_hms(y, m, 1, 0, 0, 0)
            .single()
            .unwrap_or_default()
    };

    (1..=12)
        .map(|month| {
            let start = month_start(year, month);
            let next = if month == 12 {
                month_start(year + 1, 1)
            } else {
                month_start(year, month + 1)
            };
            TimeWindow {
                start,
                end: next - Duration::seconds(1),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_twelve_contiguous_windows_cover_year() {
        // ---
        for year in [1999, 2000, 2023, 2024, 2025, 2100] {
            let windows = month_ranges(year);
            assert_eq!(windows.len(), 12, "year {year}");

            assert_eq!(windows[0].start, Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).unwrap());
            assert_eq!(
                windows[11].end,
                Utc.with_ymd_and_hms(year, 12, 31, 23, 59, 59).unwrap()
            );

            for w in &windows {
                assert!(w.start < w.end);
            }
            for pair in windows.windows(2) {
                assert_eq!(pair[0].end + Duration::seconds(1), pair[1].start);
            }
        }
    }

    #[test]
    fn test_february_end_respects_leap_years() {
        // ---
        assert_eq!(month_ranges(2024)[1].date_to(), "2024-02-29T23:59:59Z");
        assert_eq!(month_ranges(2025)[1].date_to(), "2025-02-28T23:59:59Z");
        assert_eq!(month_ranges(1900)[1].date_to(), "1900-02-28T23:59:59Z");
    }

    #[test]
    fn test_windows_span_whole_year_in_seconds() {
        // ---
        let windows = month_ranges(2025);
        let covered: i64 = windows
            .iter()
            .map(|w| (w.end - w.start).num_seconds() + 1)
            .sum();
        assert_eq!(covered, 365 * 24 * 3600);
    }
}
