use crate::error::{NormalizerError, Result};
use chrono::NaiveDate;

/// Month in which the common fiscal year closes (July to June).
pub const COMMON_FISCAL_YEAR_END_MONTH: u32 = 6;

pub fn first_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
}

/// Returns the calendar year in which the fiscal year containing the month
/// closes.
pub fn get_fiscal_year_for_month(year: i32, month: u32, fiscal_year_end_month: u32) -> i32 {
    if month <= fiscal_year_end_month {
        year
    } else {
        year + 1
    }
}

/// Returns the 0-based index of the month within the fiscal year.
///
/// # Examples
/// - If FY ends in Dec (12): Jan=0, Feb=1, ..., Dec=11
/// - If FY ends in June (6): July=0, Aug=1, ..., June=11
pub fn get_fiscal_month_index(calendar_month: u32, fiscal_year_end_month: u32) -> usize {
    let fy_start_month = if fiscal_year_end_month == 12 {
        1
    } else {
        fiscal_year_end_month + 1
    };

    if calendar_month >= fy_start_month {
        (calendar_month - fy_start_month) as usize
    } else {
        (calendar_month + 12 - fy_start_month) as usize
    }
}

/// Parses a period code in the format "YYYYQQ" (e.g. "202503").
/// Returns (year, quarter)
pub fn parse_period_code(code: &str) -> Result<(i32, u8)> {
    let code = code.trim();
    if code.len() != 6 || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(NormalizerError::InvalidPeriod(code.to_string()));
    }

    let (year_part, quarter_part) = code.split_at(4);
    let year: i32 = year_part
        .parse()
        .map_err(|_| NormalizerError::InvalidPeriod(code.to_string()))?;
    let quarter: u8 = quarter_part
        .parse()
        .map_err(|_| NormalizerError::InvalidPeriod(code.to_string()))?;

    if year < 1000 || !(1..=4).contains(&quarter) {
        return Err(NormalizerError::InvalidPeriod(code.to_string()));
    }

    Ok((year, quarter))
}
