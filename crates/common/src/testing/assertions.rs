//! Custom assertions for testing

#![allow(clippy::missing_panics_doc)]

use std::time::Duration;

/// Assert that a duration is within an acceptable range
///
/// # Examples
///
/// ```ignore
/// use std::time::Duration;
///
/// use rpcshield_common::testing::assertions::assert_duration_in_range;
///
/// let actual = Duration::from_millis(105);
/// assert_duration_in_range(actual, Duration::from_millis(100), Duration::from_millis(10));
/// ```
pub fn assert_duration_in_range(actual: Duration, expected: Duration, tolerance: Duration) {
    let min = expected.saturating_sub(tolerance);
    let max = expected + tolerance;

    assert!(
        actual >= min && actual <= max,
        "Duration {:?} not in range [{:?}, {:?}]",
        actual,
        min,
        max
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_in_range() {
        assert_duration_in_range(
            Duration::from_millis(95),
            Duration::from_millis(100),
            Duration::from_millis(5),
        );
    }

    #[test]
    #[should_panic(expected = "not in range")]
    fn test_duration_out_of_range() {
        assert_duration_in_range(
            Duration::from_millis(200),
            Duration::from_millis(100),
            Duration::from_millis(5),
        );
    }
}
