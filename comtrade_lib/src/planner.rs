//! Splits multi-period queries into requests the service accepts.
//!
//! The final-data endpoints refuse more than twelve periods per call, so a
//! long year range is sent as consecutive comma-joined groups.

use crate::error::ComtradeError;

/// Largest period group the service accepts in a single call.
pub const DEFAULT_PERIOD_GROUP: usize = 12;

/// Groups `periods` into comma-joined runs of at most `max_group`
/// consecutive entries, preserving order.
///
/// ```
/// use comtrade_lib::planner::split_periods;
///
/// let periods: Vec<String> = (2018..=2020).map(|y| y.to_string()).collect();
/// assert_eq!(split_periods(&periods, 2).unwrap(), vec!["2018,2019", "2020"]);
/// ```
pub fn split_periods(periods: &[String], max_group: usize) -> Result<Vec<String>, ComtradeError> {
    if periods.is_empty() {
        return Err(ComtradeError::InvalidInput(
            "period is required".to_string(),
        ));
    }
    if max_group == 0 {
        return Err(ComtradeError::InvalidInput(
            "period group size must be at least 1".to_string(),
        ));
    }
    Ok(periods
        .chunks(max_group)
        .map(|chunk| chunk.join(","))
        .collect())
}

/// Parses a comma-separated period list such as `"2019, 2020,2021"`.
pub fn parse_periods(input: &str) -> Result<Vec<String>, ComtradeError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ComtradeError::InvalidInput(
            "period is required".to_string(),
        ));
    }
    trimmed
        .split(',')
        .map(|p| {
            let p = p.trim();
            if p.is_empty() {
                Err(ComtradeError::InvalidInput(format!(
                    "empty period in list '{}'",
                    input
                )))
            } else {
                Ok(p.to_string())
            }
        })
        .collect()
}

/// Comma-separated list of years from `start` to `end`, inclusive.
pub fn year_range(start: i32, end: i32) -> String {
    (start..=end)
        .map(|y| y.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Collapses years into `start-end` spans of consecutive values,
/// e.g. `[2018, 2019, 2021]` becomes `["2018-2019", "2021-2021"]`.
pub fn year_intervals(years: &[i32]) -> Vec<String> {
    let Some((&first, rest)) = years.split_first() else {
        return Vec::new();
    };
    let mut intervals = Vec::new();
    let (mut start, mut end) = (first, first);
    for &year in rest {
        if year == end + 1 {
            end = year;
        } else {
            intervals.push(format!("{}-{}", start, end));
            start = year;
            end = year;
        }
    }
    intervals.push(format!("{}-{}", start, end));
    intervals
}
