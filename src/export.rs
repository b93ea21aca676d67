use crate::aggregate::{aggregate, GroupKey, Segment};
use crate::correction::{CorrectedRecord, PeriodCorrector};
use crate::decompose::{decompose, QuarterDelta};
use crate::error::{NormalizerError, Result};
use crate::fiscal::{FiscalCycle, FiscalProfile};
use crate::ingestion::ReferenceData;
use crate::mapping::{build_level_mapping, AccountMapping};
use crate::period::{history_window, FiscalQuarter, Period};
use crate::registry::{BranchRegistry, CompanyRegistry};
use crate::resolver::resolve;
use crate::schema::{EngineConfig, GroupingLevel, OutputFormat};
use crate::store::LedgerStore;
use arrow_array::{
    Array, ArrayRef, BooleanArray, Date32Array, Int64Array, RecordBatch, StringArray, UInt32Array,
};
use arrow_schema::{Field, Schema};
use chrono::NaiveDate;
use log::{debug, info, warn};
use parquet::arrow::ArrowWriter;
use serde::Serialize;
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportRow {
    pub key: GroupKey,
    pub period: Period,
    pub cycle: FiscalCycle,
    pub values: Vec<i64>,
    pub prior_year: Option<Vec<i64>>,
    pub fiscal_quarter: FiscalQuarter,
    pub period_date: Option<NaiveDate>,
    /// Quarter-only values; `None` when decomposition is disabled.
    pub current: Option<QuarterDelta>,
    pub display_name: Option<String>,
    pub category: Option<String>,
}

/// One flat output table for a granularity. Rows are ordered by period and
/// grouping key; concept columns follow `concepts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportTable {
    pub granularity: GroupingLevel,
    pub concepts: Vec<String>,
    pub rows: Vec<ExportRow>,
    pub has_current: bool,
    /// Target periods with no ledger rows at all.
    pub skipped_periods: Vec<Period>,
    /// Entity/period combinations dropped during correction.
    pub excluded: usize,
}

fn optional_cell<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn cycle_label(cycle: FiscalCycle) -> &'static str {
    match cycle {
        FiscalCycle::Standard => "standard",
        FiscalCycle::Shifted => "shifted",
    }
}

fn days_since_epoch(date: NaiveDate) -> Option<i32> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
    i32::try_from(date.signed_duration_since(epoch).num_days()).ok()
}

#[derive(Default)]
struct Columns {
    fields: Vec<Field>,
    arrays: Vec<ArrayRef>,
}

impl Columns {
    fn push(&mut self, name: impl Into<String>, nullable: bool, array: ArrayRef) {
        self.fields
            .push(Field::new(name, array.data_type().clone(), nullable));
        self.arrays.push(array);
    }
}

impl ExportTable {
    pub fn header(&self) -> Vec<String> {
        let mut header = vec!["company_code".to_string(), "period".to_string()];
        match self.granularity {
            GroupingLevel::Company => {}
            GroupingLevel::Branch => {
                header.push("branch_name".to_string());
                header.push("branch_type".to_string());
            }
            GroupingLevel::SubBranch => header.push("sub_branch_code".to_string()),
        }

        header.extend(self.concepts.iter().cloned());
        header.extend(self.concepts.iter().map(|c| format!("{}_prior_year", c)));
        header.push("fiscal_quarter".to_string());
        header.push("period_date".to_string());

        if self.has_current {
            header.extend(self.concepts.iter().map(|c| format!("{}_current", c)));
            header.push("current_approximate".to_string());
        }

        header.push("fiscal_cycle".to_string());
        header.push("display_name".to_string());
        header.push("category".to_string());
        header
    }

    fn record(&self, row: &ExportRow) -> Vec<String> {
        let mut record = vec![row.key.company_code.clone(), row.period.to_string()];
        match &row.key.segment {
            Segment::Company => {}
            Segment::Branch { name, branch_type } => {
                record.push(name.clone());
                record.push(branch_type.clone().unwrap_or_default());
            }
            Segment::SubBranch(code) => record.push(code.clone()),
        }

        record.extend(row.values.iter().map(i64::to_string));
        match &row.prior_year {
            Some(prior) => record.extend(prior.iter().map(i64::to_string)),
            None => record.extend(self.concepts.iter().map(|_| String::new())),
        }
        record.push(row.fiscal_quarter.to_string());
        record.push(optional_cell(row.period_date));

        if self.has_current {
            match &row.current {
                Some(current) => {
                    record.extend(current.values.iter().map(i64::to_string));
                    record.push(current.approximate.to_string());
                }
                None => {
                    record.extend(self.concepts.iter().map(|_| String::new()));
                    record.push(String::new());
                }
            }
        }

        record.push(cycle_label(row.cycle).to_string());
        record.push(row.display_name.clone().unwrap_or_default());
        record.push(row.category.clone().unwrap_or_default());
        record
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(self.header())?;
        for row in &self.rows {
            writer.write_record(self.record(row))?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn write_csv_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        self.write_csv(std::io::BufWriter::new(file))
    }

    /// Columnar form of the table, with the same column order as the CSV
    /// header. Absent values are nulls.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let rows = &self.rows;
        let mut columns = Columns::default();

        columns.push(
            "company_code",
            false,
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| r.key.company_code.as_str()),
            )),
        );
        columns.push(
            "period",
            false,
            Arc::new(UInt32Array::from_iter_values(rows.iter().map(|r| r.period.code()))),
        );

        match self.granularity {
            GroupingLevel::Company => {}
            GroupingLevel::Branch => {
                let (names, types): (Vec<Option<String>>, Vec<Option<String>>) = rows
                    .iter()
                    .map(|r| match &r.key.segment {
                        Segment::Branch { name, branch_type } => {
                            (Some(name.clone()), branch_type.clone())
                        }
                        _ => (None, None),
                    })
                    .unzip();
                columns.push("branch_name", true, Arc::new(StringArray::from(names)));
                columns.push("branch_type", true, Arc::new(StringArray::from(types)));
            }
            GroupingLevel::SubBranch => {
                let codes: Vec<Option<String>> = rows
                    .iter()
                    .map(|r| match &r.key.segment {
                        Segment::SubBranch(code) => Some(code.clone()),
                        _ => None,
                    })
                    .collect();
                columns.push("sub_branch_code", true, Arc::new(StringArray::from(codes)));
            }
        }

        for (index, concept) in self.concepts.iter().enumerate() {
            columns.push(
                concept.as_str(),
                false,
                Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.values[index]))),
            );
        }
        for (index, concept) in self.concepts.iter().enumerate() {
            let prior: Vec<Option<i64>> = rows
                .iter()
                .map(|r| r.prior_year.as_ref().map(|p| p[index]))
                .collect();
            columns.push(
                format!("{}_prior_year", concept),
                true,
                Arc::new(Int64Array::from(prior)),
            );
        }

        columns.push(
            "fiscal_quarter",
            false,
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| r.fiscal_quarter.to_string()),
            )),
        );
        let dates: Vec<Option<i32>> = rows
            .iter()
            .map(|r| r.period_date.and_then(days_since_epoch))
            .collect();
        columns.push("period_date", true, Arc::new(Date32Array::from(dates)));

        if self.has_current {
            for (index, concept) in self.concepts.iter().enumerate() {
                let current: Vec<Option<i64>> = rows
                    .iter()
                    .map(|r| r.current.as_ref().map(|c| c.values[index]))
                    .collect();
                columns.push(
                    format!("{}_current", concept),
                    true,
                    Arc::new(Int64Array::from(current)),
                );
            }
            let approximate: Vec<Option<bool>> = rows
                .iter()
                .map(|r| r.current.as_ref().map(|c| c.approximate))
                .collect();
            columns.push(
                "current_approximate",
                true,
                Arc::new(BooleanArray::from(approximate)),
            );
        }

        columns.push(
            "fiscal_cycle",
            false,
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| cycle_label(r.cycle)),
            )),
        );
        let names: Vec<Option<String>> = rows.iter().map(|r| r.display_name.clone()).collect();
        columns.push("display_name", true, Arc::new(StringArray::from(names)));
        let categories: Vec<Option<String>> = rows.iter().map(|r| r.category.clone()).collect();
        columns.push("category", true, Arc::new(StringArray::from(categories)));

        let schema = Arc::new(Schema::new(columns.fields));
        Ok(RecordBatch::try_new(schema, columns.arrays)?)
    }

    pub fn write_parquet<W: Write + Send>(&self, writer: W) -> Result<()> {
        let batch = self.to_record_batch()?;
        let mut writer = ArrowWriter::try_new(writer, batch.schema(), None)?;
        writer.write(&batch)?;
        writer.close()?;
        Ok(())
    }

    pub fn write_parquet_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        self.write_parquet(file)
    }

    pub fn write_file(&self, path: impl AsRef<Path>, format: OutputFormat) -> Result<()> {
        match format {
            OutputFormat::Parquet => self.write_parquet_file(path),
            OutputFormat::Csv => self.write_csv_file(path),
        }
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn value(&self, period: Period, key: &GroupKey, concept: &str) -> Option<i64> {
        let index = self.concepts.iter().position(|c| c == concept)?;
        self.rows
            .iter()
            .find(|r| r.period == period && &r.key == key)
            .map(|r| r.values[index])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub granularity: GroupingLevel,
    pub path: PathBuf,
    pub rows: usize,
    pub skipped_periods: Vec<Period>,
    pub excluded: usize,
}

pub struct HistoricalExporter<S: LedgerStore> {
    store: S,
    reference: ReferenceData,
    config: EngineConfig,
    profile: FiscalProfile,
    companies: CompanyRegistry,
    branches: BranchRegistry,
}

impl<S: LedgerStore> HistoricalExporter<S> {
    pub fn new(store: S, reference: ReferenceData, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let profile = FiscalProfile::new(&config.shifted_companies);
        let companies = reference.company_registry();
        let branches = reference.branch_registry();

        Ok(Self {
            store,
            reference,
            config,
            profile,
            companies,
            branches,
        })
    }

    pub fn target_periods(&self, max_period: Period) -> Vec<Period> {
        history_window(max_period, self.config.history_years)
    }

    pub fn mapping(&self, granularity: GroupingLevel) -> Result<AccountMapping> {
        build_level_mapping(
            &self.reference.concepts,
            &self.reference.account_mappings,
            granularity,
        )
    }

    /// Exports the configured history window ending at `max_period`.
    pub fn export_history(&self, granularity: GroupingLevel, max_period: Period) -> Result<ExportTable> {
        let targets = self.target_periods(max_period);
        self.export(granularity, &targets)
    }

    pub fn export(&self, granularity: GroupingLevel, targets: &[Period]) -> Result<ExportTable> {
        let settings = self.config.granularity(granularity);
        let mapping = self.mapping(granularity)?;
        let concepts = mapping.concepts().to_vec();

        let periods = if settings.apply_correction {
            resolve(targets)
        } else {
            targets
                .iter()
                .flat_map(|t| [*t, t.shift_years(-1)])
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        };
        info!(
            "Exporting {} data for {} target periods ({} periods loaded, {} concepts)",
            granularity.label(),
            targets.len(),
            periods.len(),
            concepts.len()
        );

        let entries = self.store.load_entries(&periods)?;
        let table = aggregate(&entries, &mapping, granularity, &self.branches)?;
        drop(entries);

        let corrector = if settings.apply_correction {
            PeriodCorrector::new(self.profile.clone())
        } else {
            PeriodCorrector::without_correction(self.profile.clone())
        };

        let mut records: Vec<CorrectedRecord> = Vec::new();
        let mut skipped_periods = Vec::new();
        let mut excluded = 0usize;

        for target in targets {
            match corrector.correct_period(*target, &table) {
                Ok(outcome) => {
                    excluded += outcome.failures.len();
                    records.extend(outcome.records);
                }
                Err(e) if e.is_recoverable() => {
                    warn!("Skipping period {}: {}", target, e);
                    skipped_periods.push(*target);
                }
                Err(e) => return Err(e),
            }
        }

        if let Some(concept) = &self.config.require_nonzero_concept {
            match mapping.concept_index(concept) {
                Some(index) => {
                    let before = records.len();
                    records.retain(|r| r.values[index] != 0);
                    debug!(
                        "Dropped {} rows with zero '{}'",
                        before - records.len(),
                        concept
                    );
                }
                None => debug!(
                    "'{}' is not a {} concept; zero filter not applied",
                    concept,
                    granularity.label()
                ),
            }
        }

        if records.is_empty() {
            return Err(NormalizerError::NoData);
        }

        let deltas: Vec<Option<QuarterDelta>> = if settings.decompose_quarters {
            decompose(&records, &concepts)?.into_iter().map(Some).collect()
        } else {
            vec![None; records.len()]
        };

        let mut rows: Vec<ExportRow> = records
            .into_iter()
            .zip(deltas)
            .map(|(record, current)| self.label(record, current))
            .collect();
        rows.sort_by(|a, b| (a.period, &a.key).cmp(&(b.period, &b.key)));

        info!(
            "{} export: {} rows, {} periods skipped, {} entity/period combinations excluded",
            granularity.label(),
            rows.len(),
            skipped_periods.len(),
            excluded
        );

        Ok(ExportTable {
            granularity,
            concepts,
            rows,
            has_current: settings.decompose_quarters,
            skipped_periods,
            excluded,
        })
    }

    fn label(&self, record: CorrectedRecord, current: Option<QuarterDelta>) -> ExportRow {
        let company = self.companies.get(&record.key.company_code);
        ExportRow {
            fiscal_quarter: record.period.fiscal_quarter(),
            period_date: record.period.period_date(),
            display_name: company.map(|c| c.display_name.clone()),
            category: company.and_then(|c| c.category.clone()),
            key: record.key,
            period: record.period,
            cycle: record.cycle,
            values: record.values,
            prior_year: record.prior_year,
            current,
        }
    }

    /// Exports every enabled granularity and writes one file per granularity
    /// into `output_dir`. A granularity without rows is skipped; the run fails
    /// with [`NormalizerError::NoData`] only when every granularity is empty.
    /// Nothing is written when any export fails otherwise.
    pub fn export_all(&self, max_period: Period, output_dir: impl AsRef<Path>) -> Result<Vec<ExportSummary>> {
        let levels: Vec<GroupingLevel> = GroupingLevel::ALL
            .into_iter()
            .filter(|level| self.config.granularity(*level).enabled)
            .collect();

        for level in &levels {
            self.mapping(*level)?;
        }

        let mut tables = Vec::with_capacity(levels.len());
        for level in levels {
            match self.export_history(level, max_period) {
                Ok(table) => tables.push(table),
                Err(NormalizerError::NoData) => warn!(
                    "No {} rows for any target period; {} is not written",
                    level.label(),
                    self.config.output_file_name(level)
                ),
                Err(e) => return Err(e),
            }
        }

        if tables.is_empty() {
            return Err(NormalizerError::NoData);
        }

        let output_dir = output_dir.as_ref();
        std::fs::create_dir_all(output_dir)?;

        let mut summaries = Vec::with_capacity(tables.len());
        for table in tables {
            let path = output_dir.join(self.config.output_file_name(table.granularity));
            table.write_file(&path, self.config.output_format)?;
            info!("Wrote {} rows to {}", table.rows.len(), path.display());

            summaries.push(ExportSummary {
                granularity: table.granularity,
                path,
                rows: table.rows.len(),
                skipped_periods: table.skipped_periods,
                excluded: table.excluded,
            });
        }

        Ok(summaries)
    }
}
