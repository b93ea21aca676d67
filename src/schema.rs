use crate::error::{NormalizerError, Result};
use crate::period::Period;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One filed account balance. Amounts are signed minor currency units,
/// cumulative from the start of the filer's fiscal year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub company_code: String,
    pub period: Period,
    pub account_code: String,
    #[serde(default)]
    pub sub_branch_code: Option<String>,
    pub amount: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum GroupingLevel {
    #[schemars(description = "One row per company and period")]
    Company,

    #[schemars(description = "One row per company, branch and period")]
    Branch,

    #[schemars(description = "One row per company, sub-branch and period")]
    SubBranch,
}

impl GroupingLevel {
    pub const ALL: [GroupingLevel; 3] = [
        GroupingLevel::Company,
        GroupingLevel::Branch,
        GroupingLevel::SubBranch,
    ];

    /// Whether a concept declared at this level is computed for `granularity`.
    /// Company concepts and line-of-business concepts never mix; branch and
    /// sub-branch concepts feed both line-of-business granularities.
    pub fn feeds(self, granularity: GroupingLevel) -> bool {
        match self {
            Self::Company => granularity == Self::Company,
            Self::Branch | Self::SubBranch => granularity != Self::Company,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Company => "company",
            Self::Branch => "branch",
            Self::SubBranch => "sub_branch",
        }
    }
}

/// Row of the concept reference table: `(report_id, reference)` names a
/// concept at a grouping level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptReference {
    pub report_id: String,
    pub reference: String,
    pub concept_name: String,
    pub grouping_level: GroupingLevel,
}

/// Row of the account mapping table: the account feeds whatever concept
/// `(report_id, reference)` resolves to, with the given sign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMappingRow {
    pub report_id: String,
    pub reference: String,
    pub account_code: String,
    #[serde(default)]
    pub sign: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyInfo {
    pub company_code: String,
    pub display_name: String,
    #[serde(default)]
    pub category: Option<String>,
}

/// Maps a sub-branch to the branch it rolls up into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchInfo {
    pub sub_branch_code: String,
    pub branch_name: String,
    #[serde(default)]
    pub branch_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct GranularityConfig {
    #[schemars(description = "Whether an artifact is produced for this granularity")]
    pub enabled: bool,

    #[schemars(
        description = "Restate shifted-calendar companies onto the July-June fiscal year. Disable for point-in-time balances that are not cumulative flows."
    )]
    pub apply_correction: bool,

    #[schemars(
        description = "Add quarter-only '<concept>_current' columns derived from the cumulative values"
    )]
    pub decompose_quarters: bool,

    #[schemars(
        description = "Output file name. Defaults to '<granularity>_historical.<format extension>'."
    )]
    pub file_name: Option<String>,
}

impl Default for GranularityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            apply_correction: true,
            decompose_quarters: true,
            file_name: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Parquet,
    Csv,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Parquet => "parquet",
            Self::Csv => "csv",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct GranularityConfigs {
    pub company: GranularityConfig,
    pub branch: GranularityConfig,
    pub sub_branch: GranularityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EngineConfig {
    #[serde(default = "default_shifted_companies")]
    #[schemars(
        description = "Company codes whose fiscal year closes in December instead of June. Every other company is on the standard July-June year."
    )]
    pub shifted_companies: Vec<String>,

    #[serde(default = "default_history_years")]
    #[schemars(
        description = "Number of complete fiscal years exported before the year of --max_period"
    )]
    pub history_years: u32,

    #[serde(default)]
    #[schemars(
        description = "If set, output rows whose value for this concept is zero are dropped (e.g. 'premiums_written')"
    )]
    pub require_nonzero_concept: Option<String>,

    #[serde(default)]
    #[schemars(description = "File format of the exported tables: 'parquet' (default) or 'csv'")]
    pub output_format: OutputFormat,

    #[serde(default)]
    #[schemars(description = "Per-granularity export settings")]
    pub granularities: GranularityConfigs,
}

pub const MAX_HISTORY_YEARS: u32 = 100;

fn default_shifted_companies() -> Vec<String> {
    vec!["0829".to_string(), "0541".to_string(), "0686".to_string()]
}

fn default_history_years() -> u32 {
    5
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            shifted_companies: default_shifted_companies(),
            history_years: default_history_years(),
            require_nonzero_concept: None,
            output_format: OutputFormat::default(),
            granularities: GranularityConfigs::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.history_years == 0 || self.history_years > MAX_HISTORY_YEARS {
            return Err(NormalizerError::InvalidConfig(format!(
                "history_years must be between 1 and {} (got {})",
                MAX_HISTORY_YEARS, self.history_years
            )));
        }

        if let Some(code) = self.shifted_companies.iter().find(|c| c.trim().is_empty()) {
            return Err(NormalizerError::InvalidConfig(format!(
                "shifted_companies contains an empty company code ('{}')",
                code
            )));
        }

        if !GroupingLevel::ALL
            .iter()
            .any(|level| self.granularity(*level).enabled)
        {
            return Err(NormalizerError::InvalidConfig(
                "at least one granularity must be enabled".to_string(),
            ));
        }

        Ok(())
    }

    pub fn granularity(&self, level: GroupingLevel) -> &GranularityConfig {
        match level {
            GroupingLevel::Company => &self.granularities.company,
            GroupingLevel::Branch => &self.granularities.branch,
            GroupingLevel::SubBranch => &self.granularities.sub_branch,
        }
    }

    pub fn output_file_name(&self, level: GroupingLevel) -> String {
        self.granularity(level)
            .file_name
            .clone()
            .unwrap_or_else(|| {
                format!(
                    "{}_historical.{}",
                    level.label(),
                    self.output_format.extension()
                )
            })
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(EngineConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_generation() {
        let schema_json = EngineConfig::schema_as_json().unwrap();
        assert!(schema_json.contains("shifted_companies"));
        assert!(schema_json.contains("history_years"));
        assert!(schema_json.contains("granularities"));
    }

    #[test]
    fn test_config_defaults_from_partial_json() {
        let config = EngineConfig::from_json_str(
            r#"{ "granularities": { "company": { "apply_correction": false } } }"#,
        )
        .unwrap();

        assert_eq!(config.shifted_companies, vec!["0829", "0541", "0686"]);
        assert_eq!(config.history_years, 5);
        assert!(!config.granularity(GroupingLevel::Company).apply_correction);
        assert!(config.granularity(GroupingLevel::Company).decompose_quarters);
        assert!(config.granularity(GroupingLevel::Branch).apply_correction);
        assert_eq!(config.output_format, OutputFormat::Parquet);
        assert_eq!(
            config.output_file_name(GroupingLevel::SubBranch),
            "sub_branch_historical.parquet"
        );

        let csv = EngineConfig::from_json_str(r#"{ "output_format": "csv" }"#).unwrap();
        assert_eq!(
            csv.output_file_name(GroupingLevel::Branch),
            "branch_historical.csv"
        );
    }

    #[test]
    fn test_config_validation() {
        assert!(EngineConfig::from_json_str(r#"{ "history_years": 0 }"#).is_err());
        assert!(EngineConfig::from_json_str(r#"{ "history_years": 100 }"#).is_ok());
        let err = EngineConfig::from_json_str(r#"{ "history_years": 4000000000 }"#).unwrap_err();
        assert!(matches!(err, NormalizerError::InvalidConfig(_)));
        assert!(EngineConfig::from_json_str(r#"{ "shifted_companies": ["0829", " "] }"#).is_err());

        let all_disabled = r#"{ "granularities": {
            "company": { "enabled": false },
            "branch": { "enabled": false },
            "sub_branch": { "enabled": false } } }"#;
        let err = EngineConfig::from_json_str(all_disabled).unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_grouping_level_feeds() {
        assert!(GroupingLevel::Company.feeds(GroupingLevel::Company));
        assert!(!GroupingLevel::Company.feeds(GroupingLevel::Branch));
        assert!(GroupingLevel::SubBranch.feeds(GroupingLevel::Branch));
        assert!(GroupingLevel::Branch.feeds(GroupingLevel::SubBranch));
        assert!(!GroupingLevel::SubBranch.feeds(GroupingLevel::Company));
    }

    #[test]
    fn test_ledger_entry_deserialization() {
        let entry: LedgerEntry = serde_json::from_str(
            r#"{"company_code":"0829","period":202501,"account_code":"410100","amount":-500}"#,
        )
        .unwrap();
        assert_eq!(entry.period.code(), 202501);
        assert_eq!(entry.sub_branch_code, None);
        assert_eq!(entry.amount, -500);
    }
}
