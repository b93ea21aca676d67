use crate::registry::normalize_company_code;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Which fiscal calendar a company files on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FiscalCycle {
    /// Fiscal year July to June, the common calendar.
    Standard,
    /// Fiscal year January to December; filings must be restated.
    Shifted,
}

/// The configured set of shifted-calendar companies. Any company not in the
/// set is on the standard calendar.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FiscalProfile {
    shifted: BTreeSet<String>,
}

impl FiscalProfile {
    pub fn new<I, S>(shifted_companies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            shifted: shifted_companies
                .into_iter()
                .map(|code| normalize_company_code(code.as_ref()))
                .collect(),
        }
    }

    pub fn classify(&self, company_code: &str) -> FiscalCycle {
        if self.shifted.contains(&normalize_company_code(company_code)) {
            FiscalCycle::Shifted
        } else {
            FiscalCycle::Standard
        }
    }

    pub fn shifted_count(&self) -> usize {
        self.shifted.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        let profile = FiscalProfile::new(["0829", "0541", "0686"]);

        assert_eq!(profile.classify("0829"), FiscalCycle::Shifted);
        assert_eq!(profile.classify("829"), FiscalCycle::Shifted);
        assert_eq!(profile.classify("0100"), FiscalCycle::Standard);
        assert_eq!(profile.classify("unknown"), FiscalCycle::Standard);
        assert_eq!(profile.shifted_count(), 3);
    }

    #[test]
    fn test_empty_profile_is_all_standard() {
        let profile = FiscalProfile::default();
        assert_eq!(profile.classify("0829"), FiscalCycle::Standard);
    }
}
