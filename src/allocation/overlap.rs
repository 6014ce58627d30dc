//! Half-open interval overlap test
//!
//! Every conflict and availability decision in the crate reduces to this
//! predicate. The SQL backends encode the same comparison as
//! `start_time < $end AND $start < end_time`.

/// Two half-open intervals `[s1, e1)` and `[s2, e2)` overlap iff `s1 < e2 && s2 < e1`
///
/// Touching intervals (`e1 == s2`) do not overlap.
pub fn intervals_overlap<T: PartialOrd + ?Sized>(s1: &T, e1: &T, s2: &T, e2: &T) -> bool {
    s1 < e2 && s2 < e1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TimeWindow;
    use proptest::prelude::*;

    fn w(start: &str, end: &str) -> TimeWindow {
        TimeWindow::new(start, end)
    }

    #[test]
    fn test_touching_intervals_do_not_overlap() {
        assert!(!w("10:00", "11:00").overlaps(&w("11:00", "12:00")));
        assert!(!w("11:00", "12:00").overlaps(&w("10:00", "11:00")));
    }

    #[test]
    fn test_nested_intervals_overlap() {
        assert!(w("08:00", "12:00").overlaps(&w("09:00", "10:00")));
        assert!(w("09:00", "10:00").overlaps(&w("08:00", "12:00")));
    }

    #[test]
    fn test_partial_overlap() {
        assert!(w("10:00", "11:00").overlaps(&w("10:30", "11:30")));
        assert!(w("10:30", "11:30").overlaps(&w("10:00", "11:00")));
    }

    #[test]
    fn test_identical_intervals_overlap() {
        assert!(w("14:00", "15:40").overlaps(&w("14:00", "15:40")));
    }

    #[test]
    fn test_disjoint_intervals() {
        assert!(!w("07:00", "08:00").overlaps(&w("19:00", "22:00")));
    }

    fn clock(minutes: u32) -> String {
        format!("{:02}:{:02}", minutes / 60, minutes % 60)
    }

    proptest! {
        // Zero-padded strings order exactly like the minutes they encode.
        #[test]
        fn prop_string_overlap_matches_minutes(
            a in 0u32..1439, la in 1u32..240,
            b in 0u32..1439, lb in 1u32..240,
        ) {
            let (a_end, b_end) = ((a + la).min(1439), (b + lb).min(1439));
            prop_assume!(a < a_end && b < b_end);

            let by_minutes = intervals_overlap(&a, &a_end, &b, &b_end);
            let by_strings = w(&clock(a), &clock(a_end)).overlaps(&w(&clock(b), &clock(b_end)));
            prop_assert_eq!(by_minutes, by_strings);
            prop_assert_eq!(by_minutes, a < b_end && b < a_end);
        }

        #[test]
        fn prop_overlap_is_symmetric(a in 0u32..1000, la in 1u32..400, b in 0u32..1000, lb in 1u32..400) {
            prop_assert_eq!(
                intervals_overlap(&a, &(a + la), &b, &(b + lb)),
                intervals_overlap(&b, &(b + lb), &a, &(a + la))
            );
        }
    }
}
