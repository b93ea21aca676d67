use crate::error::{NormalizerError, Result};
use crate::registry::{BranchRegistry, CompanyRegistry};
use crate::schema::{AccountMappingRow, BranchInfo, CompanyInfo, ConceptReference};
use csv::{ReaderBuilder, Trim};
use log::{info, warn};
use serde::de::DeserializeOwned;
use std::io::Read;
use std::path::Path;

pub const CONCEPTS_FILE: &str = "concepts.csv";
pub const ACCOUNT_MAPPINGS_FILE: &str = "account_mappings.csv";
pub const COMPANIES_FILE: &str = "companies.csv";
pub const BRANCHES_FILE: &str = "branches.csv";

pub fn read_csv_rows<T: DeserializeOwned, R: Read>(reader: R) -> Result<Vec<T>> {
    let mut reader = ReaderBuilder::new().trim(Trim::All).from_reader(reader);
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

pub fn read_csv_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Vec<T>> {
    let file = std::fs::File::open(path)?;
    read_csv_rows(file)
}

/// Static reference data for one run: concept configuration and entity
/// registries.
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    pub concepts: Vec<ConceptReference>,
    pub account_mappings: Vec<AccountMappingRow>,
    pub companies: Vec<CompanyInfo>,
    pub branches: Vec<BranchInfo>,
}

impl ReferenceData {
    /// Loads the four reference tables from `dir`. The concept tables are
    /// required; the registries are optional.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();

        let concepts = read_required(dir, CONCEPTS_FILE)?;
        let account_mappings = read_required(dir, ACCOUNT_MAPPINGS_FILE)?;
        let companies = read_optional(dir, COMPANIES_FILE)?;
        let branches = read_optional(dir, BRANCHES_FILE)?;

        let data = Self {
            concepts,
            account_mappings,
            companies,
            branches,
        };

        info!(
            "Loaded reference data: {} concepts, {} account mappings, {} companies, {} sub-branches",
            data.concepts.len(),
            data.account_mappings.len(),
            data.companies.len(),
            data.branches.len()
        );

        Ok(data)
    }

    pub fn company_registry(&self) -> CompanyRegistry {
        CompanyRegistry::new(&self.companies)
    }

    pub fn branch_registry(&self) -> BranchRegistry {
        BranchRegistry::new(&self.branches)
    }
}

fn read_required<T: DeserializeOwned>(dir: &Path, file_name: &str) -> Result<Vec<T>> {
    let path = dir.join(file_name);
    if !path.is_file() {
        return Err(NormalizerError::MissingTable(path.display().to_string()));
    }
    let rows: Vec<T> = read_csv_file(&path)?;
    if rows.is_empty() {
        return Err(NormalizerError::MissingTable(format!(
            "{} (no rows)",
            path.display()
        )));
    }
    Ok(rows)
}

fn read_optional<T: DeserializeOwned>(dir: &Path, file_name: &str) -> Result<Vec<T>> {
    let path = dir.join(file_name);
    if !path.is_file() {
        warn!("{} not found; continuing without it", path.display());
        return Ok(Vec::new());
    }
    read_csv_file(&path)
}
