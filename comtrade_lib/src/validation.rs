use comtrade_api::FreqCode;

use crate::error::ComtradeError;
use crate::planner::parse_periods;

/// First year the service has data for.
pub const MIN_YEAR: i32 = 1962;
pub const MAX_YEAR: i32 = 2100;
pub const MAX_TOP_N: i64 = 1000;

/// Flow codes accepted by the final-data endpoints.
pub const VALID_FLOW_CODES: &[&str] = &[
    "M", "X", "RM", "RX", "DX", "FM", "MIP", "MOP", "XIP", "XOP", "MIF", "XIF",
];

/// Commodity aggregation shortcuts understood by the service.
pub const CMD_AGGREGATES: &[&str] = &["TOTAL", "ALL", "AG1", "AG2", "AG4", "AG6"];

/// Validate an M49 country code: 1-3 digits, leading zeros dropped.
pub fn validate_country_code(input: &str) -> Result<String, ComtradeError> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed.len() > 3 || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Err(ComtradeError::InvalidInput(format!(
            "invalid country code '{}'. Expected an M49 numeric code (e.g., 156 for China, 0 for World)",
            input
        )));
    }
    let code: u16 = trimmed.parse().map_err(|_| {
        ComtradeError::InvalidInput(format!("invalid country code '{}'", input))
    })?;
    Ok(code.to_string())
}

/// Validate a comma-separated list of country codes.
pub fn validate_country_codes(input: &str) -> Result<Vec<String>, ComtradeError> {
    split_list(input)?
        .into_iter()
        .map(validate_country_code)
        .collect()
}

/// Validate a flow code: case-insensitive, checked against the known flows.
pub fn validate_flow_code(input: &str) -> Result<String, ComtradeError> {
    let upper = input.trim().to_uppercase();
    if VALID_FLOW_CODES.contains(&upper.as_str()) {
        Ok(upper)
    } else {
        Err(ComtradeError::InvalidInput(format!(
            "unknown flow code '{}'. Valid codes: {}",
            input,
            VALID_FLOW_CODES.join(", ")
        )))
    }
}

pub fn validate_flow_codes(input: &str) -> Result<Vec<String>, ComtradeError> {
    split_list(input)?
        .into_iter()
        .map(validate_flow_code)
        .collect()
}

/// Validate one period: `YYYY` for annual data, `YYYYMM` for monthly data.
pub fn validate_period(input: &str, freq: FreqCode) -> Result<String, ComtradeError> {
    let trimmed = input.trim();
    let bad = || {
        ComtradeError::InvalidInput(match freq {
            FreqCode::Annual => format!(
                "invalid period '{}'. Expected a year YYYY between {} and {}",
                input, MIN_YEAR, MAX_YEAR
            ),
            FreqCode::Monthly => format!(
                "invalid period '{}'. Expected a month YYYYMM (e.g., 202301)",
                input
            ),
        })
    };
    if !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Err(bad());
    }
    let (year, month) = match (freq, trimmed.len()) {
        (FreqCode::Annual, 4) => (&trimmed[..4], None),
        (FreqCode::Monthly, 6) => (&trimmed[..4], Some(&trimmed[4..])),
        _ => return Err(bad()),
    };
    let year: i32 = year.parse().map_err(|_| bad())?;
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(bad());
    }
    if let Some(month) = month {
        let month: u32 = month.parse().map_err(|_| bad())?;
        if !(1..=12).contains(&month) {
            return Err(bad());
        }
    }
    Ok(trimmed.to_string())
}

/// Validate a comma-separated period list.
pub fn validate_periods(input: &str, freq: FreqCode) -> Result<Vec<String>, ComtradeError> {
    parse_periods(input)?
        .iter()
        .map(|p| validate_period(p, freq))
        .collect()
}

/// Validate a commodity code: an aggregation shortcut or an even-length
/// HS code of 2 to 6 digits.
pub fn validate_cmd_code(input: &str) -> Result<String, ComtradeError> {
    let upper = input.trim().to_uppercase();
    if CMD_AGGREGATES.contains(&upper.as_str()) {
        return Ok(upper);
    }
    let is_hs = (2..=6).contains(&upper.len())
        && upper.len() % 2 == 0
        && upper.chars().all(|c| c.is_ascii_digit());
    if is_hs {
        Ok(upper)
    } else {
        Err(ComtradeError::InvalidInput(format!(
            "invalid commodity code '{}'. Use TOTAL, AG2, AG4, AG6 or an HS code like 27 or 2709",
            input
        )))
    }
}

pub fn validate_cmd_codes(input: &str) -> Result<Vec<String>, ComtradeError> {
    split_list(input)?
        .into_iter()
        .map(validate_cmd_code)
        .collect()
}

/// Validate a customs procedure code such as `C00`.
pub fn validate_customs_code(input: &str) -> Result<String, ComtradeError> {
    let upper = input.trim().to_uppercase();
    let valid = upper.len() == 3
        && upper.starts_with('C')
        && upper[1..].chars().all(|c| c.is_ascii_digit());
    if valid {
        Ok(upper)
    } else {
        Err(ComtradeError::InvalidInput(format!(
            "invalid customs code '{}'. Expected C followed by two digits (e.g., C00 for all)",
            input
        )))
    }
}

/// Validate a mode-of-transport code: a non-negative integer.
pub fn validate_mot_code(input: &str) -> Result<String, ComtradeError> {
    let trimmed = input.trim();
    trimmed
        .parse::<u32>()
        .map(|code| code.to_string())
        .map_err(|_| {
            ComtradeError::InvalidInput(format!(
                "invalid mode of transport code '{}'. Expected a number (0 for all)",
                input
            ))
        })
}

/// Validate a leaderboard size: must be 1..=1000.
pub fn validate_top_n(n: i64) -> Result<u32, ComtradeError> {
    if !(1..=MAX_TOP_N).contains(&n) {
        return Err(ComtradeError::InvalidInput(format!(
            "top-n must be between 1 and {}, got {}",
            MAX_TOP_N, n
        )));
    }
    Ok(n as u32)
}

/// Validate an inclusive year range.
pub fn validate_year_range(start: i32, end: i32) -> Result<(i32, i32), ComtradeError> {
    for year in [start, end] {
        if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
            return Err(ComtradeError::InvalidInput(format!(
                "year {} out of range {}..={}",
                year, MIN_YEAR, MAX_YEAR
            )));
        }
    }
    if start > end {
        return Err(ComtradeError::InvalidInput(format!(
            "start year {} is after end year {}",
            start, end
        )));
    }
    Ok((start, end))
}

fn split_list(input: &str) -> Result<Vec<&str>, ComtradeError> {
    let items: Vec<&str> = input.split(',').map(str::trim).collect();
    if items.iter().any(|s| s.is_empty()) {
        return Err(ComtradeError::InvalidInput(format!(
            "empty item in list '{}'",
            input
        )));
    }
    Ok(items)
}
