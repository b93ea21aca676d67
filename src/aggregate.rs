use crate::error::{NormalizerError, Result};
use crate::mapping::AccountMapping;
use crate::period::Period;
use crate::registry::BranchRegistry;
use crate::schema::{GroupingLevel, LedgerEntry};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Segment {
    Company,
    Branch {
        name: String,
        branch_type: Option<String>,
    },
    SubBranch(String),
}

/// Company plus, below company granularity, the line of business.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    pub company_code: String,
    pub segment: Segment,
}

impl GroupKey {
    pub fn company(company_code: &str) -> Self {
        Self {
            company_code: company_code.to_string(),
            segment: Segment::Company,
        }
    }

    pub fn branch(company_code: &str, name: &str, branch_type: Option<&str>) -> Self {
        Self {
            company_code: company_code.to_string(),
            segment: Segment::Branch {
                name: name.to_string(),
                branch_type: branch_type.map(str::to_string),
            },
        }
    }

    pub fn sub_branch(company_code: &str, sub_branch_code: &str) -> Self {
        Self {
            company_code: company_code.to_string(),
            segment: Segment::SubBranch(sub_branch_code.to_string()),
        }
    }

    /// Key of `entry` at `granularity`, or `None` when the entry carries no
    /// usable line of business.
    fn for_entry(
        entry: &LedgerEntry,
        granularity: GroupingLevel,
        branches: &BranchRegistry,
    ) -> Option<Self> {
        match granularity {
            GroupingLevel::Company => Some(Self::company(&entry.company_code)),
            GroupingLevel::SubBranch => entry
                .sub_branch_code
                .as_deref()
                .filter(|code| !code.trim().is_empty())
                .map(|code| Self::sub_branch(&entry.company_code, code.trim())),
            GroupingLevel::Branch => {
                let info = branches.branch_of(entry.sub_branch_code.as_deref()?)?;
                Some(Self::branch(
                    &entry.company_code,
                    &info.branch_name,
                    info.branch_type.as_deref(),
                ))
            }
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.segment {
            Segment::Company => write!(f, "company {}", self.company_code),
            Segment::Branch { name, .. } => {
                write!(f, "company {} branch {}", self.company_code, name)
            }
            Segment::SubBranch(code) => {
                write!(f, "company {} sub-branch {}", self.company_code, code)
            }
        }
    }
}

/// Concept values for one grouping key and period, in the concept order of
/// the table that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedRecord {
    pub key: GroupKey,
    pub period: Period,
    pub values: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedTable {
    granularity: GroupingLevel,
    concepts: Vec<String>,
    groups: BTreeMap<Period, BTreeMap<GroupKey, Vec<i64>>>,
}

impl AggregatedTable {
    pub fn new(granularity: GroupingLevel, concepts: Vec<String>) -> Self {
        Self {
            granularity,
            concepts,
            groups: BTreeMap::new(),
        }
    }

    /// Builds a table from already aggregated records. Records for the same
    /// key and period replace each other.
    pub fn from_records(
        granularity: GroupingLevel,
        concepts: Vec<String>,
        records: impl IntoIterator<Item = AggregatedRecord>,
    ) -> Result<Self> {
        let mut table = Self::new(granularity, concepts);
        for record in records {
            if record.values.len() != table.concepts.len() {
                return Err(NormalizerError::InvalidConfig(format!(
                    "record for {} in {} has {} values but the table has {} concepts",
                    record.key,
                    record.period,
                    record.values.len(),
                    table.concepts.len()
                )));
            }
            table
                .groups
                .entry(record.period)
                .or_default()
                .insert(record.key, record.values);
        }
        Ok(table)
    }

    pub fn granularity(&self) -> GroupingLevel {
        self.granularity
    }

    pub fn concepts(&self) -> &[String] {
        &self.concepts
    }

    pub fn get(&self, period: Period, key: &GroupKey) -> Option<&[i64]> {
        self.groups
            .get(&period)
            .and_then(|keys| keys.get(key))
            .map(Vec::as_slice)
    }

    pub fn value(&self, period: Period, key: &GroupKey, concept: &str) -> Option<i64> {
        let index = self.concepts.iter().position(|c| c == concept)?;
        self.get(period, key).map(|values| values[index])
    }

    pub fn has_period(&self, period: Period) -> bool {
        self.groups.get(&period).is_some_and(|keys| !keys.is_empty())
    }

    pub fn keys_at(&self, period: Period) -> impl Iterator<Item = &GroupKey> + '_ {
        self.groups.get(&period).into_iter().flat_map(|keys| keys.keys())
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sums the signed contribution of every entry to every concept, grouped by
/// `granularity` and period.
///
/// An entry whose account feeds no concept still opens its group (with
/// zeros), so a filer is visible even when none of its accounts are mapped.
pub fn aggregate(
    entries: &[LedgerEntry],
    mapping: &AccountMapping,
    granularity: GroupingLevel,
    branches: &BranchRegistry,
) -> Result<AggregatedTable> {
    let width = mapping.len();
    let mut table = AggregatedTable::new(granularity, mapping.concepts().to_vec());
    let mut unkeyed = 0usize;

    for entry in entries {
        let Some(key) = GroupKey::for_entry(entry, granularity, branches) else {
            unkeyed += 1;
            continue;
        };

        let contributions = mapping.contributions(&entry.account_code);
        let values = table
            .groups
            .entry(entry.period)
            .or_default()
            .entry(key)
            .or_insert_with(|| vec![0; width]);

        for (index, sign) in contributions {
            let total = entry
                .amount
                .checked_mul(*sign)
                .and_then(|contribution| values[*index].checked_add(contribution))
                .ok_or_else(|| NormalizerError::ArithmeticOverflow {
                    concept: mapping.concepts()[*index].clone(),
                    company_code: entry.company_code.clone(),
                    period: entry.period.to_string(),
                })?;
            values[*index] = total;
        }
    }

    if unkeyed > 0 {
        debug!(
            "Skipped {} ledger rows without a {} key",
            unkeyed,
            granularity.label()
        );
    }

    info!(
        "Aggregated {} ledger rows into {} {} groups over {} periods",
        entries.len() - unkeyed,
        table.len(),
        granularity.label(),
        table.groups.len()
    );

    Ok(table)
}
