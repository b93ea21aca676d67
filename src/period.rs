use crate::error::{NormalizerError, Result};
use crate::utils::{
    first_day_of_month, get_fiscal_month_index, get_fiscal_year_for_month, parse_period_code,
    COMMON_FISCAL_YEAR_END_MONTH,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FilingQuarter {
    March,
    June,
    September,
    December,
}

impl FilingQuarter {
    pub fn from_number(quarter: u8) -> Option<Self> {
        match quarter {
            1 => Some(Self::March),
            2 => Some(Self::June),
            3 => Some(Self::September),
            4 => Some(Self::December),
            _ => None,
        }
    }

    pub fn number(self) -> u8 {
        match self {
            Self::March => 1,
            Self::June => 2,
            Self::September => 3,
            Self::December => 4,
        }
    }

    pub fn month(self) -> u32 {
        u32::from(self.number()) * 3
    }
}

/// Quarter of the common fiscal year (Q1 = Jul-Sep ... Q4 = Apr-Jun).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FiscalQuarter {
    Q1,
    Q2,
    Q3,
    Q4,
}

impl fmt::Display for FiscalQuarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Q1 => "Q1",
            Self::Q2 => "Q2",
            Self::Q3 => "Q3",
            Self::Q4 => "Q4",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Period {
    year: i32,
    quarter: FilingQuarter,
}

impl Period {
    pub fn new(year: i32, quarter: u8) -> Result<Self> {
        let quarter = FilingQuarter::from_number(quarter)
            .ok_or_else(|| NormalizerError::InvalidPeriod(format!("{:04}{:02}", year, quarter)))?;
        if !(1000..=9999).contains(&year) {
            return Err(NormalizerError::InvalidPeriod(format!(
                "{}{:02}",
                year,
                quarter.number()
            )));
        }
        Ok(Self { year, quarter })
    }

    pub fn from_quarter(year: i32, quarter: FilingQuarter) -> Self {
        Self { year, quarter }
    }

    pub fn from_code(code: u32) -> Result<Self> {
        Self::parse(&code.to_string())
    }

    pub fn parse(code: &str) -> Result<Self> {
        let (year, quarter) = parse_period_code(code)?;
        Self::new(year, quarter)
    }

    pub fn code(&self) -> u32 {
        // Years are validated as four digits on construction.
        self.year.unsigned_abs() * 100 + u32::from(self.quarter.number())
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn quarter(&self) -> FilingQuarter {
        self.quarter
    }

    pub fn shift_years(&self, years: i32) -> Self {
        Self {
            year: self.year + years,
            quarter: self.quarter,
        }
    }

    /// Same calendar year, different filing quarter.
    pub fn with_quarter(&self, quarter: FilingQuarter) -> Self {
        Self {
            year: self.year,
            quarter,
        }
    }

    pub fn next(&self) -> Self {
        match self.quarter {
            FilingQuarter::March => self.with_quarter(FilingQuarter::June),
            FilingQuarter::June => self.with_quarter(FilingQuarter::September),
            FilingQuarter::September => self.with_quarter(FilingQuarter::December),
            FilingQuarter::December => Self::from_quarter(self.year + 1, FilingQuarter::March),
        }
    }

    pub fn filing_month(&self) -> u32 {
        self.quarter.month()
    }

    /// First day of the filing month, used as the calendar label of a period.
    pub fn period_date(&self) -> Option<NaiveDate> {
        first_day_of_month(self.year, self.filing_month())
    }

    pub fn fiscal_quarter(&self) -> FiscalQuarter {
        match get_fiscal_month_index(self.filing_month(), COMMON_FISCAL_YEAR_END_MONTH) / 3 {
            0 => FiscalQuarter::Q1,
            1 => FiscalQuarter::Q2,
            2 => FiscalQuarter::Q3,
            _ => FiscalQuarter::Q4,
        }
    }

    /// Calendar year in which the common (July-June) fiscal year of this
    /// filing closes.
    pub fn fiscal_year(&self) -> i32 {
        get_fiscal_year_for_month(self.year, self.filing_month(), COMMON_FISCAL_YEAR_END_MONTH)
    }

    /// The filing that closes the previous quarter of the same fiscal year.
    /// September opens the fiscal year and has none.
    pub fn previous_in_fiscal_year(&self) -> Option<Self> {
        match self.quarter {
            FilingQuarter::September => None,
            FilingQuarter::December => Some(self.with_quarter(FilingQuarter::September)),
            FilingQuarter::March => Some(Self::from_quarter(self.year - 1, FilingQuarter::December)),
            FilingQuarter::June => Some(self.with_quarter(FilingQuarter::March)),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}{:02}", self.year, self.quarter.number())
    }
}

impl FromStr for Period {
    type Err = NormalizerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<u32> for Period {
    type Error = NormalizerError;

    fn try_from(code: u32) -> Result<Self> {
        Self::from_code(code)
    }
}

impl From<Period> for u32 {
    fn from(period: Period) -> u32 {
        period.code()
    }
}

/// Every period from the June filing `years` years before `max_period`'s year
/// up to and including `max_period`.
pub fn history_window(max_period: Period, years: u32) -> Vec<Period> {
    let years = i32::try_from(years).unwrap_or(i32::MAX);
    let start_year = max_period.year().saturating_sub(years);
    let mut current = Period::from_quarter(start_year, FilingQuarter::June);
    let mut periods = Vec::new();

    while current <= max_period {
        periods.push(current);
        current = current.next();
    }

    periods
}
