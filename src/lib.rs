//! # Fiscal Normalizer
//!
//! A library for turning raw insurance ledger filings into named-concept
//! tables on a single fiscal calendar, ready for period-over-period analysis.
//!
//! ## Core Concepts
//!
//! - **Period**: A quarterly filing `YYYYQQ` (quarter 1 = March, 2 = June, 3 = September, 4 = December)
//! - **Concept**: A named metric (e.g. `premiums_written`) computed as a signed sum of ledger accounts
//! - **Grouping Level**: Company, branch (line of business) or sub-branch granularity
//! - **Standard Cycle**: Fiscal year July to June; filed amounts are used as-is
//! - **Shifted Cycle**: Fiscal year January to December; amounts are restated onto the July-June year
//! - **Current Values**: Quarter-only amounts derived from the cumulative fiscal-year-to-date values
//!
//! ## Example
//!
//! ```rust,ignore
//! use fiscal_normalizer::*;
//!
//! let reference = ReferenceData::load_dir("data")?;
//! let store = CsvLedgerStore::in_dir("data");
//! let config = EngineConfig::default();
//!
//! let exporter = HistoricalExporter::new(store, reference, config)?;
//! let table = exporter.export_history(GroupingLevel::Branch, Period::parse("202501")?)?;
//! table.write_parquet_file("output/branch_historical.parquet")?;
//! ```

pub mod aggregate;
pub mod correction;
pub mod decompose;
pub mod error;
pub mod export;
pub mod fiscal;
pub mod ingestion;
pub mod mapping;
pub mod period;
pub mod registry;
pub mod resolver;
pub mod schema;
pub mod store;
pub mod utils;

pub use aggregate::{aggregate, AggregatedRecord, AggregatedTable, GroupKey, Segment};
pub use correction::{
    checkpoint_formula, correct, CheckpointSource, CorrectedRecord, CorrectionOutcome,
    PeriodCorrector,
};
pub use decompose::{decompose, QuarterDelta};
pub use error::{NormalizerError, Result};
pub use export::{ExportRow, ExportSummary, ExportTable, HistoricalExporter};
pub use fiscal::{FiscalCycle, FiscalProfile};
pub use ingestion::*;
pub use mapping::{build_level_mapping, build_mapping, AccountMapping};
pub use period::{history_window, FilingQuarter, FiscalQuarter, Period};
pub use registry::{normalize_company_code, BranchRegistry, CompanyRegistry};
pub use resolver::resolve;
pub use schema::*;
pub use store::{CsvLedgerStore, InMemoryLedgerStore, LedgerStore, LEDGER_FILE};
pub use utils::*;

use log::{debug, info};
use std::path::Path;

pub struct NormalizationProcessor;

impl NormalizationProcessor {
    /// Normalized history of one granularity for the window ending at
    /// `max_period`.
    pub fn process<S: LedgerStore>(
        store: S,
        reference: ReferenceData,
        config: EngineConfig,
        granularity: GroupingLevel,
        max_period: Period,
    ) -> Result<ExportTable> {
        let exporter = HistoricalExporter::new(store, reference, config)?;
        exporter.export_history(granularity, max_period)
    }

    /// Loads reference tables and `ledger.csv` from `data_dir` and writes one
    /// file per enabled granularity into `output_dir`.
    pub fn process_dir(
        data_dir: impl AsRef<Path>,
        config: EngineConfig,
        max_period: Period,
        output_dir: impl AsRef<Path>,
    ) -> Result<Vec<ExportSummary>> {
        let data_dir = data_dir.as_ref();
        info!(
            "Normalizing filings from {} up to {}",
            data_dir.display(),
            max_period
        );
        debug!(
            "{} shifted companies, {} years of history",
            config.shifted_companies.len(),
            config.history_years
        );

        let reference = ReferenceData::load_dir(data_dir)?;
        let store = CsvLedgerStore::in_dir(data_dir);
        let exporter = HistoricalExporter::new(store, reference, config)?;
        exporter.export_all(max_period, output_dir)
    }
}

pub fn normalize_history<S: LedgerStore>(
    store: S,
    reference: ReferenceData,
    config: EngineConfig,
    granularity: GroupingLevel,
    max_period: Period,
) -> Result<ExportTable> {
    NormalizationProcessor::process(store, reference, config, granularity, max_period)
}

pub fn normalize_dir(
    data_dir: impl AsRef<Path>,
    config: EngineConfig,
    max_period: Period,
    output_dir: impl AsRef<Path>,
) -> Result<Vec<ExportSummary>> {
    NormalizationProcessor::process_dir(data_dir, config, max_period, output_dir)
}
