use thiserror::Error;

#[derive(Error, Debug)]
pub enum NormalizerError {
    #[error("Required reference table '{0}' is missing")]
    MissingTable(String),

    #[error("No concepts configured for {0}")]
    EmptyConceptSet(String),

    #[error("Account {account_code} has no sign in the mapping for concept '{concept}'")]
    MissingSign { concept: String, account_code: String },

    #[error("Account {account_code} has sign {sign} for concept '{concept}': must be +1 or -1")]
    InvalidSign {
        concept: String,
        account_code: String,
        sign: i64,
    },

    #[error("Account {account_code} is mapped more than once to concept '{concept}'")]
    DuplicateMapping { concept: String, account_code: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid period '{0}': expected YYYYQQ with quarter 01-04")]
    InvalidPeriod(String),

    #[error("Company {company_code} ({group}) is missing checkpoint {checkpoint} needed to correct {period}")]
    MissingCheckpoint {
        company_code: String,
        group: String,
        period: String,
        checkpoint: String,
    },

    #[error("No ledger rows matched period {0}")]
    EmptyResult(String),

    #[error("No rows were produced for any target period")]
    NoData,

    #[error("Amount overflow while computing '{concept}' for company {company_code} in {period}")]
    ArithmeticOverflow {
        concept: String,
        company_code: String,
        period: String,
    },

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Arrow error: {0}")]
    ArrowError(#[from] arrow_schema::ArrowError),

    #[error("Parquet error: {0}")]
    ParquetError(#[from] parquet::errors::ParquetError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl NormalizerError {
    /// Errors in static reference data or configuration. These abort a run
    /// before any output is written.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::MissingTable(_)
                | Self::EmptyConceptSet(_)
                | Self::MissingSign { .. }
                | Self::InvalidSign { .. }
                | Self::DuplicateMapping { .. }
                | Self::InvalidConfig(_)
        )
    }

    /// Errors scoped to one entity or one period of a batch.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::MissingCheckpoint { .. } | Self::EmptyResult(_) | Self::ArithmeticOverflow { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, NormalizerError>;
