use crate::aggregate::GroupKey;
use crate::correction::CorrectedRecord;
use crate::error::{NormalizerError, Result};
use crate::period::FiscalQuarter;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarterDelta {
    pub values: Vec<i64>,
    /// The preceding quarter was missing and `values` is the cumulative
    /// value itself rather than a true quarter-only amount.
    pub approximate: bool,
}

fn quarter_slot(quarter: FiscalQuarter) -> usize {
    match quarter {
        FiscalQuarter::Q1 => 0,
        FiscalQuarter::Q2 => 1,
        FiscalQuarter::Q3 => 2,
        FiscalQuarter::Q4 => 3,
    }
}

/// Corrected cumulative values of one grouping key across one fiscal year,
/// in fiscal order (September, December, March, June).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FiscalYearSeries<'a> {
    quarters: [Option<&'a [i64]>; 4],
}

impl<'a> FiscalYearSeries<'a> {
    pub fn new(
        september: Option<&'a [i64]>,
        december: Option<&'a [i64]>,
        march: Option<&'a [i64]>,
        june: Option<&'a [i64]>,
    ) -> Self {
        Self {
            quarters: [september, december, march, june],
        }
    }

    pub fn set(&mut self, quarter: FiscalQuarter, values: &'a [i64]) {
        self.quarters[quarter_slot(quarter)] = Some(values);
    }

    pub fn get(&self, quarter: FiscalQuarter) -> Option<&'a [i64]> {
        self.quarters[quarter_slot(quarter)]
    }
}

fn delta(current: &[i64], previous: &[i64], concepts: &[String], key: &str) -> Result<Vec<i64>> {
    current
        .iter()
        .zip(previous)
        .enumerate()
        .map(|(index, (c, p))| {
            c.checked_sub(*p).ok_or_else(|| NormalizerError::ArithmeticOverflow {
                concept: concepts.get(index).cloned().unwrap_or_default(),
                company_code: key.to_string(),
                period: "quarter delta".to_string(),
            })
        })
        .collect()
}

/// Quarter-only values for each filed quarter of one fiscal year, in fiscal
/// order. A quarter whose predecessor is absent falls back to its cumulative
/// value and is flagged approximate.
pub fn decompose_fiscal_year(
    series: &FiscalYearSeries<'_>,
    concepts: &[String],
    key: &str,
) -> Result<[Option<QuarterDelta>; 4]> {
    let mut deltas: [Option<QuarterDelta>; 4] = Default::default();

    for slot in 0..4 {
        let Some(current) = series.quarters[slot] else {
            continue;
        };

        let previous = if slot == 0 {
            None
        } else {
            series.quarters[slot - 1]
        };

        deltas[slot] = Some(match previous {
            Some(previous) => QuarterDelta {
                values: delta(current, previous, concepts, key)?,
                approximate: false,
            },
            None => QuarterDelta {
                values: current.to_vec(),
                approximate: slot != 0,
            },
        });
    }

    Ok(deltas)
}

/// Quarter-only values for every record, aligned with `records`.
///
/// Records are joined side by side per grouping key and fiscal year before
/// subtracting, so each record is looked up once.
pub fn decompose(records: &[CorrectedRecord], concepts: &[String]) -> Result<Vec<QuarterDelta>> {
    let mut years: BTreeMap<(&GroupKey, i32), FiscalYearSeries<'_>> = BTreeMap::new();
    for record in records {
        years
            .entry((&record.key, record.period.fiscal_year()))
            .or_default()
            .set(record.period.fiscal_quarter(), &record.values);
    }

    let mut decomposed: BTreeMap<(&GroupKey, i32), [Option<QuarterDelta>; 4]> = BTreeMap::new();
    for ((key, fiscal_year), series) in &years {
        let deltas = decompose_fiscal_year(series, concepts, &key.company_code)?;
        decomposed.insert((*key, *fiscal_year), deltas);
    }

    let mut approximate = 0usize;
    let mut result = Vec::with_capacity(records.len());
    for record in records {
        let slot = quarter_slot(record.period.fiscal_quarter());
        let delta = decomposed
            .get_mut(&(&record.key, record.period.fiscal_year()))
            .and_then(|deltas| deltas[slot].take())
            .unwrap_or_else(|| QuarterDelta {
                // Only reachable for duplicate records of the same key and period.
                values: record.values.clone(),
                approximate: true,
            });
        if delta.approximate {
            approximate += 1;
        }
        result.push(delta);
    }

    if approximate > 0 {
        debug!(
            "{} of {} quarter-only values fell back to the cumulative value",
            approximate,
            records.len()
        );
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fiscal::FiscalCycle;
    use crate::period::Period;

    fn corrected(company: &str, period: u32, value: i64) -> CorrectedRecord {
        CorrectedRecord {
            key: GroupKey::company(company),
            period: Period::from_code(period).unwrap(),
            cycle: FiscalCycle::Standard,
            values: vec![value],
            prior_year: None,
        }
    }

    fn concepts() -> Vec<String> {
        vec!["premiums_written".to_string()]
    }

    #[test]
    fn test_full_fiscal_year() {
        let sep = [100];
        let dec = [250];
        let mar = [420];
        let jun = [600];
        let series = FiscalYearSeries::new(Some(&sep[..]), Some(&dec[..]), Some(&mar[..]), Some(&jun[..]));

        let deltas = decompose_fiscal_year(&series, &concepts(), "0100").unwrap();
        let values: Vec<i64> = deltas
            .iter()
            .map(|d| d.as_ref().unwrap().values[0])
            .collect();
        assert_eq!(values, vec![100, 150, 170, 180]);
        assert!(deltas.iter().all(|d| !d.as_ref().unwrap().approximate));
        assert_eq!(values.iter().sum::<i64>(), 600);
    }

    #[test]
    fn test_missing_predecessor_is_flagged() {
        let dec = [250];
        let jun = [600];
        let series = FiscalYearSeries::new(None, Some(&dec[..]), None, Some(&jun[..]));

        let deltas = decompose_fiscal_year(&series, &concepts(), "0100").unwrap();
        assert!(deltas[0].is_none());
        assert_eq!(
            deltas[1],
            Some(QuarterDelta {
                values: vec![250],
                approximate: true
            })
        );
        assert!(deltas[2].is_none());
        assert_eq!(deltas[3].as_ref().unwrap().values, vec![600]);
        assert!(deltas[3].as_ref().unwrap().approximate);
    }

    #[test]
    fn test_decompose_records_across_years_and_keys() {
        let records = vec![
            corrected("0100", 202403, 100),
            corrected("0100", 202404, 250),
            corrected("0100", 202501, 420),
            corrected("0100", 202502, 600),
            corrected("0200", 202404, 50),
            // Next fiscal year starts over from September.
            corrected("0100", 202503, 90),
        ];

        let deltas = decompose(&records, &concepts()).unwrap();
        let values: Vec<i64> = deltas.iter().map(|d| d.values[0]).collect();
        assert_eq!(values, vec![100, 150, 170, 180, 50, 90]);

        let flags: Vec<bool> = deltas.iter().map(|d| d.approximate).collect();
        assert_eq!(flags, vec![false, false, false, false, true, false]);
    }
}
