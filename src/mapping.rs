use crate::error::{NormalizerError, Result};
use crate::schema::{AccountMappingRow, ConceptReference, GroupingLevel};
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Validated concept mapping: for every selected concept, the accounts that
/// feed it and their signs.
///
/// Concepts are kept in name order so every table built from one mapping has
/// the same column layout.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountMapping {
    concepts: Vec<String>,
    by_account: HashMap<String, Vec<(usize, i64)>>,
}

impl AccountMapping {
    pub fn concepts(&self) -> &[String] {
        &self.concepts
    }

    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    pub fn concept_index(&self, concept: &str) -> Option<usize> {
        self.concepts.binary_search_by(|c| c.as_str().cmp(concept)).ok()
    }

    /// `(concept index, sign)` pairs for every concept this account feeds.
    pub fn contributions(&self, account_code: &str) -> &[(usize, i64)] {
        self.by_account
            .get(account_code)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Sign of `account_code` within `concept`, or 0 when the account does
    /// not feed it.
    pub fn sign(&self, concept: &str, account_code: &str) -> i64 {
        let Some(index) = self.concept_index(concept) else {
            return 0;
        };
        self.contributions(account_code)
            .iter()
            .find(|(i, _)| *i == index)
            .map(|(_, sign)| *sign)
            .unwrap_or(0)
    }

    /// `concept -> (account_code -> sign)`.
    pub fn to_map(&self) -> BTreeMap<String, BTreeMap<String, i64>> {
        let mut map: BTreeMap<String, BTreeMap<String, i64>> = self
            .concepts
            .iter()
            .map(|c| (c.clone(), BTreeMap::new()))
            .collect();

        for (account, contributions) in &self.by_account {
            for (index, sign) in contributions {
                if let Some(accounts) = map.get_mut(&self.concepts[*index]) {
                    accounts.insert(account.clone(), *sign);
                }
            }
        }

        map
    }
}

/// Joins the concept reference table with the account mapping table on
/// `(report_id, reference)`, keeping only concepts accepted by
/// `concept_filter`.
pub fn build_mapping<F>(
    references: &[ConceptReference],
    rows: &[AccountMappingRow],
    concept_filter: F,
) -> Result<AccountMapping>
where
    F: Fn(&ConceptReference) -> bool,
{
    if references.is_empty() {
        return Err(NormalizerError::MissingTable("concepts".to_string()));
    }
    if rows.is_empty() {
        return Err(NormalizerError::MissingTable("account_mappings".to_string()));
    }

    let mut concepts_by_reference: HashMap<(&str, &str), BTreeSet<&str>> = HashMap::new();
    for reference in references.iter().filter(|r| concept_filter(r)) {
        concepts_by_reference
            .entry((reference.report_id.as_str(), reference.reference.as_str()))
            .or_default()
            .insert(reference.concept_name.as_str());
    }

    let concepts: Vec<String> = concepts_by_reference
        .values()
        .flatten()
        .map(|c| c.to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    if concepts.is_empty() {
        return Err(NormalizerError::EmptyConceptSet(
            "the selected concept filter".to_string(),
        ));
    }

    let mut signs: BTreeMap<&str, BTreeMap<&str, i64>> = BTreeMap::new();
    for row in rows {
        let Some(targets) =
            concepts_by_reference.get(&(row.report_id.as_str(), row.reference.as_str()))
        else {
            continue;
        };

        for concept in targets {
            let sign = match row.sign {
                None => {
                    return Err(NormalizerError::MissingSign {
                        concept: concept.to_string(),
                        account_code: row.account_code.clone(),
                    })
                }
                Some(s) if s == 1 || s == -1 => s,
                Some(s) => {
                    return Err(NormalizerError::InvalidSign {
                        concept: concept.to_string(),
                        account_code: row.account_code.clone(),
                        sign: s,
                    })
                }
            };

            let accounts = signs.entry(*concept).or_default();
            if accounts.insert(row.account_code.as_str(), sign).is_some() {
                return Err(NormalizerError::DuplicateMapping {
                    concept: concept.to_string(),
                    account_code: row.account_code.clone(),
                });
            }
        }
    }

    let mut by_account: HashMap<String, Vec<(usize, i64)>> = HashMap::new();
    for (index, concept) in concepts.iter().enumerate() {
        match signs.get(concept.as_str()) {
            Some(accounts) => {
                debug!("Concept '{}' is fed by {} accounts", concept, accounts.len());
                for (account, sign) in accounts {
                    by_account
                        .entry(account.to_string())
                        .or_default()
                        .push((index, *sign));
                }
            }
            None => warn!(
                "Concept '{}' has no account mappings and will always be zero",
                concept
            ),
        }
    }

    Ok(AccountMapping {
        concepts,
        by_account,
    })
}

/// Mapping of every concept that feeds `granularity`.
pub fn build_level_mapping(
    references: &[ConceptReference],
    rows: &[AccountMappingRow],
    granularity: GroupingLevel,
) -> Result<AccountMapping> {
    build_mapping(references, rows, |r| r.grouping_level.feeds(granularity)).map_err(|e| match e {
        NormalizerError::EmptyConceptSet(_) => {
            NormalizerError::EmptyConceptSet(format!("{} granularity", granularity.label()))
        }
        other => other,
    })
}
