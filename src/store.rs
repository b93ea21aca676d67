use crate::error::Result;
use crate::ingestion::read_csv_file;
use crate::period::Period;
use crate::schema::LedgerEntry;
use csv::{ReaderBuilder, Trim};
use log::info;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

pub const LEDGER_FILE: &str = "ledger.csv";

/// Source of ledger rows, queried once per batch with the full set of
/// periods the batch needs.
pub trait LedgerStore {
    fn load_entries(&self, periods: &[Period]) -> Result<Vec<LedgerEntry>>;
}

impl<T: LedgerStore + ?Sized> LedgerStore for &T {
    fn load_entries(&self, periods: &[Period]) -> Result<Vec<LedgerEntry>> {
        (**self).load_entries(periods)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerStore {
    entries: Vec<LedgerEntry>,
}

impl InMemoryLedgerStore {
    pub fn new(entries: Vec<LedgerEntry>) -> Self {
        Self { entries }
    }

    pub fn from_csv_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(read_csv_file(path)?))
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn load_entries(&self, periods: &[Period]) -> Result<Vec<LedgerEntry>> {
        let wanted: BTreeSet<Period> = periods.iter().copied().collect();
        Ok(self
            .entries
            .iter()
            .filter(|e| e.amount != 0 && wanted.contains(&e.period))
            .cloned()
            .collect())
    }
}

/// Streams `company_code,period,account_code,sub_branch_code,amount` rows
/// from a CSV file, keeping only the requested periods.
#[derive(Debug, Clone)]
pub struct CsvLedgerStore {
    path: PathBuf,
}

impl CsvLedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(LEDGER_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LedgerStore for CsvLedgerStore {
    fn load_entries(&self, periods: &[Period]) -> Result<Vec<LedgerEntry>> {
        let wanted: BTreeSet<Period> = periods.iter().copied().collect();
        let mut reader = ReaderBuilder::new()
            .trim(Trim::All)
            .from_path(&self.path)?;

        let mut entries = Vec::new();
        let mut scanned = 0usize;
        for row in reader.deserialize() {
            let entry: LedgerEntry = row?;
            scanned += 1;
            if entry.amount != 0 && wanted.contains(&entry.period) {
                entries.push(entry);
            }
        }

        info!(
            "Loaded {} of {} ledger rows from {} for {} periods",
            entries.len(),
            scanned,
            self.path.display(),
            wanted.len()
        );

        Ok(entries)
    }
}
