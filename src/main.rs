use clap::Parser;
use fiscal_normalizer::{normalize_dir, EngineConfig, Period};
use log::{error, info, warn};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "fiscal-normalizer",
    version,
    about = "Export multi-year concept histories from quarterly ledger filings on a common July-June fiscal year"
)]
struct Cli {
    /// Latest period to export, as YYYYQQ (e.g. 202501 for March 2025)
    #[arg(
        long = "max_period",
        required_unless_present = "print_schema",
        value_parser = Period::parse
    )]
    max_period: Option<Period>,

    /// Directory the historical files are written to
    #[arg(long = "output_dir", default_value = "output")]
    output_dir: PathBuf,

    /// Directory holding ledger.csv and the reference tables
    #[arg(long = "data_dir", env = "NORMALIZER_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Engine configuration (JSON). Built-in defaults are used when omitted.
    #[arg(long = "config", env = "NORMALIZER_CONFIG")]
    config: Option<PathBuf>,

    /// Print the JSON schema of the configuration file and exit
    #[arg(long = "print_schema")]
    print_schema: bool,
}

fn run(cli: Cli) -> fiscal_normalizer::Result<()> {
    if cli.print_schema {
        println!("{}", EngineConfig::schema_as_json()?);
        return Ok(());
    }

    let Some(max_period) = cli.max_period else {
        return Ok(());
    };

    let config = match &cli.config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            EngineConfig::from_json_file(path)?
        }
        None => EngineConfig::default(),
    };

    let summaries = normalize_dir(&cli.data_dir, config, max_period, &cli.output_dir)?;

    for summary in &summaries {
        info!(
            "{}: {} rows -> {}",
            summary.granularity.label(),
            summary.rows,
            summary.path.display()
        );
        if !summary.skipped_periods.is_empty() {
            let skipped: Vec<String> = summary
                .skipped_periods
                .iter()
                .map(Period::to_string)
                .collect();
            warn!(
                "{}: no filings for {}",
                summary.granularity.label(),
                skipped.join(", ")
            );
        }
        if summary.excluded > 0 {
            warn!(
                "{}: {} entity/period combinations excluded during correction",
                summary.granularity.label(),
                summary.excluded
            );
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if e.is_configuration_error() {
                error!("Configuration error: {}", e);
            } else {
                error!("Export failed: {}", e);
            }
            ExitCode::FAILURE
        }
    }
}
