use crate::correction::checkpoint_formula;
use crate::period::Period;
use std::collections::BTreeSet;

/// Every period that must be loaded to correct `targets`: the targets, every
/// checkpoint their correction formulas reference, and the same closure one
/// year earlier for the prior-year comparison. Sorted and deduplicated.
pub fn resolve(targets: &[Period]) -> Vec<Period> {
    let mut periods: BTreeSet<Period> = targets.iter().copied().collect();

    for target in targets {
        for period in [*target, target.shift_years(-1)] {
            periods.extend(checkpoint_formula(period).into_iter().map(|c| c.period));
        }
    }

    periods.into_iter().collect()
}
