use crate::aggregate::{AggregatedTable, GroupKey};
use crate::error::{NormalizerError, Result};
use crate::fiscal::{FiscalCycle, FiscalProfile};
use crate::period::{FilingQuarter, Period};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Read access to aggregated concept values by period and grouping key.
pub trait CheckpointSource {
    fn concepts(&self) -> &[String];

    fn fetch(&self, period: Period, key: &GroupKey) -> Option<&[i64]>;
}

impl CheckpointSource for AggregatedTable {
    fn concepts(&self) -> &[String] {
        AggregatedTable::concepts(self)
    }

    fn fetch(&self, period: Period, key: &GroupKey) -> Option<&[i64]> {
        self.get(period, key)
    }
}

/// One signed term of a correction formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pub period: Period,
    pub sign: i64,
}

impl Checkpoint {
    fn plus(period: Period) -> Self {
        Self { period, sign: 1 }
    }

    fn minus(period: Period) -> Self {
        Self { period, sign: -1 }
    }
}

/// Terms that restate a shifted company's `target` filing onto the July-June
/// year. The first term is always the target filing itself.
///
/// | Target        | Formula                        |
/// |---------------|--------------------------------|
/// | March `Y`     | `Mar(Y) - Jun(Y-1) + Dec(Y-1)` |
/// | June `Y`      | `Jun(Y) + Dec(Y-1) - Jun(Y-1)` |
/// | September `Y` | `Sep(Y) - Jun(Y)`              |
/// | December `Y`  | `Dec(Y) - Jun(Y)`              |
pub fn checkpoint_formula(target: Period) -> Vec<Checkpoint> {
    let year = target.year();
    let june = |y: i32| Period::from_quarter(y, FilingQuarter::June);
    let december = |y: i32| Period::from_quarter(y, FilingQuarter::December);

    match target.quarter() {
        FilingQuarter::March => vec![
            Checkpoint::plus(target),
            Checkpoint::minus(june(year - 1)),
            Checkpoint::plus(december(year - 1)),
        ],
        FilingQuarter::June => vec![
            Checkpoint::plus(target),
            Checkpoint::plus(december(year - 1)),
            Checkpoint::minus(june(year - 1)),
        ],
        FilingQuarter::September | FilingQuarter::December => vec![
            Checkpoint::plus(target),
            Checkpoint::minus(june(year)),
        ],
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectedRecord {
    pub key: GroupKey,
    pub period: Period,
    pub cycle: FiscalCycle,
    /// Amount accumulated since the start of the common fiscal year.
    pub values: Vec<i64>,
    /// Same quarter one year earlier, on the same basis, when available.
    pub prior_year: Option<Vec<i64>>,
}

fn evaluate<S: CheckpointSource + ?Sized>(
    terms: &[Checkpoint],
    target: Period,
    key: &GroupKey,
    source: &S,
) -> Result<Vec<i64>> {
    let mut totals = vec![0i64; source.concepts().len()];

    for term in terms {
        let values = source
            .fetch(term.period, key)
            .ok_or_else(|| NormalizerError::MissingCheckpoint {
                company_code: key.company_code.clone(),
                group: key.to_string(),
                period: target.to_string(),
                checkpoint: term.period.to_string(),
            })?;

        for (index, (total, value)) in totals.iter_mut().zip(values).enumerate() {
            *total = value
                .checked_mul(term.sign)
                .and_then(|v| total.checked_add(v))
                .ok_or_else(|| NormalizerError::ArithmeticOverflow {
                    concept: source.concepts()[index].clone(),
                    company_code: key.company_code.clone(),
                    period: target.to_string(),
                })?;
        }
    }

    Ok(totals)
}

fn restate<S: CheckpointSource + ?Sized>(
    target: Period,
    key: &GroupKey,
    cycle: FiscalCycle,
    source: &S,
) -> Result<Vec<i64>> {
    match cycle {
        FiscalCycle::Standard => evaluate(&[Checkpoint::plus(target)], target, key, source),
        FiscalCycle::Shifted => evaluate(&checkpoint_formula(target), target, key, source),
    }
}

/// Corrected values of `key` at `target` for a company on `cycle`.
///
/// A shifted company missing any checkpoint fails with
/// [`NormalizerError::MissingCheckpoint`]; values are never zero-filled.
/// A prior-year comparison that cannot be computed is dropped.
pub fn correct<S: CheckpointSource + ?Sized>(
    target: Period,
    key: &GroupKey,
    cycle: FiscalCycle,
    source: &S,
) -> Result<CorrectedRecord> {
    let values = restate(target, key, cycle, source)?;

    let prior_target = target.shift_years(-1);
    let prior_year = match restate(prior_target, key, cycle, source) {
        Ok(prior) => Some(prior),
        Err(e) if e.is_recoverable() => {
            debug!("No prior-year comparison for {} at {}: {}", key, target, e);
            None
        }
        Err(other) => return Err(other),
    };

    Ok(CorrectedRecord {
        key: key.clone(),
        period: target,
        cycle,
        values,
        prior_year,
    })
}

/// Corrected records for one target period plus the per-entity failures
/// that were recovered from.
#[derive(Debug, Default)]
pub struct CorrectionOutcome {
    pub records: Vec<CorrectedRecord>,
    pub failures: Vec<NormalizerError>,
}

pub struct PeriodCorrector {
    profile: FiscalProfile,
    apply_correction: bool,
}

impl PeriodCorrector {
    pub fn new(profile: FiscalProfile) -> Self {
        Self {
            profile,
            apply_correction: true,
        }
    }

    /// Keeps classifying companies but restates none of them. Used for
    /// point-in-time concepts, which are not cumulative.
    pub fn without_correction(profile: FiscalProfile) -> Self {
        Self {
            profile,
            apply_correction: false,
        }
    }

    pub fn correct<S: CheckpointSource + ?Sized>(
        &self,
        target: Period,
        key: &GroupKey,
        source: &S,
    ) -> Result<CorrectedRecord> {
        let cycle = self.profile.classify(&key.company_code);
        let mut record = if self.apply_correction {
            correct(target, key, cycle, source)?
        } else {
            correct(target, key, FiscalCycle::Standard, source)?
        };
        record.cycle = cycle;
        Ok(record)
    }

    /// Corrects every grouping key filed at `target`. Standard companies pass
    /// through; a shifted company missing a checkpoint is dropped and
    /// reported in [`CorrectionOutcome::failures`].
    pub fn correct_period(&self, target: Period, table: &AggregatedTable) -> Result<CorrectionOutcome> {
        if !table.has_period(target) {
            return Err(NormalizerError::EmptyResult(target.to_string()));
        }

        let mut outcome = CorrectionOutcome::default();
        let mut shifted = 0usize;

        for key in table.keys_at(target) {
            match self.correct(target, key, table) {
                Ok(record) => {
                    if record.cycle == FiscalCycle::Shifted {
                        shifted += 1;
                    }
                    outcome.records.push(record);
                }
                Err(e) if e.is_recoverable() => {
                    warn!("Excluding {} from {}: {}", key, target, e);
                    outcome.failures.push(e);
                }
                Err(e) => return Err(e),
            }
        }

        debug!(
            "Period {}: {} records ({} shifted), {} excluded",
            target,
            outcome.records.len(),
            shifted,
            outcome.failures.len()
        );

        Ok(outcome)
    }
}
