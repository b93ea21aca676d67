use fiscal_normalizer::*;
use std::fs;
use std::path::Path;

const CONCEPTS: &str = "report_id,reference,concept_name,grouping_level
R1,PW,premiums_written,sub_branch
R1,CL,claims_incurred,sub_branch
R2,TA,total_assets,company
";

const ACCOUNT_MAPPINGS: &str = "report_id,reference,account_code,sign
R1,PW,410100,1
R1,CL,410100,-1
R1,CL,520000,1
R2,TA,110000,1
";

const COMPANIES: &str = "company_code,display_name,category
829,Shifted Mutual,life
0100,Standard Insurance,general
";

const BRANCHES: &str = "sub_branch_code,branch_name,branch_type
12,Motor,property
13,Fire,property
";

fn write_reference(dir: &Path) {
    fs::write(dir.join(CONCEPTS_FILE), CONCEPTS).unwrap();
    fs::write(dir.join(ACCOUNT_MAPPINGS_FILE), ACCOUNT_MAPPINGS).unwrap();
    fs::write(dir.join(COMPANIES_FILE), COMPANIES).unwrap();
    fs::write(dir.join(BRANCHES_FILE), BRANCHES).unwrap();
}

fn write_ledger(dir: &Path, rows: &[(&str, u32, &str, &str, i64)]) {
    let mut contents = String::from("company_code,period,account_code,sub_branch_code,amount\n");
    for (company, period, account, sub_branch, amount) in rows {
        contents.push_str(&format!(
            "{},{},{},{},{}\n",
            company, period, account, sub_branch, amount
        ));
    }
    fs::write(dir.join(LEDGER_FILE), contents).unwrap();
}

fn p(code: u32) -> Period {
    Period::from_code(code).unwrap()
}

fn exporter(dir: &Path, config: EngineConfig) -> HistoricalExporter<CsvLedgerStore> {
    HistoricalExporter::new(
        CsvLedgerStore::in_dir(dir),
        ReferenceData::load_dir(dir).unwrap(),
        config,
    )
    .unwrap()
}

fn shifted_march_ledger() -> Vec<(&'static str, u32, &'static str, &'static str, i64)> {
    vec![
        ("0829", 202501, "410100", "12", 1000),
        ("0829", 202402, "410100", "12", 400),
        ("0829", 202404, "410100", "12", 900),
        ("0100", 202501, "410100", "12", 600),
        ("0100", 202502, "410100", "12", 750),
    ]
}

#[test]
fn test_shifted_march_restated_onto_common_year() {
    let dir = tempfile::tempdir().unwrap();
    write_reference(dir.path());
    write_ledger(dir.path(), &shifted_march_ledger());

    let table = exporter(dir.path(), EngineConfig::default())
        .export(GroupingLevel::Branch, &[p(202501)])
        .unwrap();

    let shifted = GroupKey::branch("0829", "Motor", Some("property"));
    assert_eq!(table.value(p(202501), &shifted, "premiums_written"), Some(1500));

    let row = table.rows.iter().find(|r| r.key == shifted).unwrap();
    assert_eq!(row.cycle, FiscalCycle::Shifted);
    assert_eq!(row.display_name.as_deref(), Some("Shifted Mutual"));
}

#[test]
fn test_standard_company_passes_through() {
    let dir = tempfile::tempdir().unwrap();
    write_reference(dir.path());
    write_ledger(dir.path(), &shifted_march_ledger());

    let table = exporter(dir.path(), EngineConfig::default())
        .export(GroupingLevel::SubBranch, &[p(202501), p(202502)])
        .unwrap();

    let key = GroupKey::sub_branch("0100", "12");
    assert_eq!(table.value(p(202502), &key, "premiums_written"), Some(750));

    let row = table
        .rows
        .iter()
        .find(|r| r.key == key && r.period == p(202502))
        .unwrap();
    assert_eq!(row.cycle, FiscalCycle::Standard);
    assert_eq!(row.fiscal_quarter, FiscalQuarter::Q4);
    assert_eq!(row.display_name.as_deref(), Some("Standard Insurance"));
    assert_eq!(row.category.as_deref(), Some("general"));
    // June follows March: 750 - 600.
    assert_eq!(row.current.as_ref().unwrap().values, vec![-150, 150]);
}

#[test]
fn test_one_account_contributes_to_every_mapped_concept() {
    let dir = tempfile::tempdir().unwrap();
    write_reference(dir.path());
    write_ledger(
        dir.path(),
        &[
            ("0100", 202502, "410100", "12", 500),
            ("0100", 202502, "520000", "12", 80),
            ("0100", 202502, "999999", "12", 7),
        ],
    );

    let table = exporter(dir.path(), EngineConfig::default())
        .export(GroupingLevel::SubBranch, &[p(202502)])
        .unwrap();

    let key = GroupKey::sub_branch("0100", "12");
    assert_eq!(table.concepts, vec!["claims_incurred", "premiums_written"]);
    assert_eq!(table.value(p(202502), &key, "premiums_written"), Some(500));
    assert_eq!(table.value(p(202502), &key, "claims_incurred"), Some(-420));
}

#[test]
fn test_resolver_covers_every_checkpoint_of_the_window() {
    let targets = history_window(p(202501), 5);
    let resolved = resolve(&targets);

    for target in &targets {
        for period in [*target, target.shift_years(-1)] {
            for checkpoint in checkpoint_formula(period) {
                assert!(
                    resolved.contains(&checkpoint.period),
                    "{} needed by {} is not resolved",
                    checkpoint.period,
                    target
                );
            }
        }
    }
}

#[test]
fn test_quarter_values_sum_to_june_cumulative() {
    let dir = tempfile::tempdir().unwrap();
    write_reference(dir.path());
    write_ledger(
        dir.path(),
        &[
            ("0100", 202403, "410100", "12", 100),
            ("0100", 202404, "410100", "12", 250),
            ("0100", 202501, "410100", "12", 420),
            ("0100", 202502, "410100", "12", 600),
        ],
    );

    let table = exporter(dir.path(), EngineConfig::default())
        .export(
            GroupingLevel::SubBranch,
            &[p(202403), p(202404), p(202501), p(202502)],
        )
        .unwrap();

    let index = table
        .concepts
        .iter()
        .position(|c| c == "premiums_written")
        .unwrap();
    let quarters: i64 = table
        .rows
        .iter()
        .map(|r| r.current.as_ref().unwrap().values[index])
        .sum();
    assert_eq!(quarters, 600);
    assert!(table
        .rows
        .iter()
        .all(|r| !r.current.as_ref().unwrap().approximate));
}

#[test]
fn test_shifted_company_missing_checkpoint_does_not_abort_batch() {
    let dir = tempfile::tempdir().unwrap();
    write_reference(dir.path());
    write_ledger(
        dir.path(),
        &[
            ("0829", 202501, "410100", "12", 1000),
            ("0829", 202404, "410100", "12", 900),
            ("0100", 202501, "410100", "12", 600),
        ],
    );

    let table = exporter(dir.path(), EngineConfig::default())
        .export(GroupingLevel::SubBranch, &[p(202501)])
        .unwrap();

    assert_eq!(table.excluded, 1);
    assert_eq!(table.rows.len(), 1);
    assert_eq!(table.rows[0].key.company_code, "0100");
}

#[test]
fn test_configured_shifted_set_replaces_default() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    write_reference(dir.path());
    write_ledger(dir.path(), &shifted_march_ledger());

    let config = EngineConfig::from_json_str(r#"{ "shifted_companies": ["100"] }"#)?;
    let table = exporter(dir.path(), config).export(GroupingLevel::SubBranch, &[p(202501)])?;

    // 0829 is now standard and passes through; 0100 is shifted and lacks
    // its June 2024 checkpoint.
    let key = GroupKey::sub_branch("0829", "12");
    assert_eq!(table.value(p(202501), &key, "premiums_written"), Some(1000));
    assert_eq!(table.rows.len(), 1);
    assert_eq!(table.excluded, 1);
    Ok(())
}

#[test]
fn test_export_is_byte_identical_across_runs() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    write_reference(dir.path());
    write_ledger(dir.path(), &shifted_march_ledger());

    let first = dir.path().join("first");
    let second = dir.path().join("second");
    let summaries = normalize_dir(dir.path(), EngineConfig::default(), p(202502), &first)?;
    normalize_dir(dir.path(), EngineConfig::default(), p(202502), &second)?;

    assert_eq!(summaries.len(), 3);
    for summary in &summaries {
        let name = summary.path.file_name().unwrap();
        assert_eq!(fs::read(first.join(name))?, fs::read(second.join(name))?);
    }
    assert!(first.join("branch_historical.parquet").is_file());
    assert!(first.join("sub_branch_historical.parquet").is_file());
    Ok(())
}

#[test]
fn test_granularity_without_rows_is_skipped() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    write_reference(dir.path());
    fs::remove_file(dir.path().join(BRANCHES_FILE))?;
    write_ledger(
        dir.path(),
        &[
            ("0100", 202502, "410100", "12", 750),
            ("0100", 202502, "110000", "", 5000),
        ],
    );

    let output = dir.path().join("output");
    let summaries = normalize_dir(dir.path(), EngineConfig::default(), p(202502), &output)?;

    let written: Vec<GroupingLevel> = summaries.iter().map(|s| s.granularity).collect();
    assert_eq!(written, vec![GroupingLevel::Company, GroupingLevel::SubBranch]);
    assert!(output.join("company_historical.parquet").is_file());
    assert!(output.join("sub_branch_historical.parquet").is_file());
    assert!(!output.join("branch_historical.parquet").exists());
    Ok(())
}

#[test]
fn test_no_rows_at_any_granularity_is_no_data() {
    let dir = tempfile::tempdir().unwrap();
    write_reference(dir.path());
    write_ledger(dir.path(), &[("0100", 201502, "410100", "12", 750)]);

    let output = dir.path().join("output");
    let err = normalize_dir(dir.path(), EngineConfig::default(), p(202502), &output).unwrap_err();

    assert!(matches!(err, NormalizerError::NoData));
    assert!(!output.exists());
}

#[test]
fn test_csv_output_format() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    write_reference(dir.path());
    write_ledger(dir.path(), &[("0100", 202502, "410100", "12", 750)]);

    let config = EngineConfig::from_json_str(r#"{ "output_format": "csv" }"#)?;
    let output = dir.path().join("output");
    normalize_dir(dir.path(), config, p(202502), &output)?;

    let csv = fs::read_to_string(output.join("sub_branch_historical.csv"))?;
    assert!(csv.starts_with("company_code,period,sub_branch_code,"));
    assert!(!output.join("sub_branch_historical.parquet").exists());
    Ok(())
}

#[test]
fn test_configuration_error_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write_reference(dir.path());
    fs::write(
        dir.path().join(ACCOUNT_MAPPINGS_FILE),
        "report_id,reference,account_code,sign\nR1,PW,410100,1\nR1,PW,410100,1\nR2,TA,110000,1\n",
    )
    .unwrap();
    write_ledger(dir.path(), &shifted_march_ledger());

    let output = dir.path().join("output");
    let err = normalize_dir(dir.path(), EngineConfig::default(), p(202502), &output).unwrap_err();

    assert!(err.is_configuration_error());
    assert!(matches!(err, NormalizerError::DuplicateMapping { .. }));
    assert!(!output.exists());
}

#[test]
fn test_company_codes_join_by_numeric_value() {
    let dir = tempfile::tempdir().unwrap();
    write_reference(dir.path());
    write_ledger(dir.path(), &[("100", 202502, "110000", "", 5000)]);

    let table = exporter(dir.path(), EngineConfig::default())
        .export(GroupingLevel::Company, &[p(202502)])
        .unwrap();

    assert_eq!(table.rows.len(), 1);
    assert_eq!(table.rows[0].display_name.as_deref(), Some("Standard Insurance"));
    assert_eq!(
        table.value(p(202502), &GroupKey::company("100"), "total_assets"),
        Some(5000)
    );
}

#[test]
fn test_json_output() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    write_reference(dir.path());
    write_ledger(dir.path(), &[("0100", 202502, "410100", "12", 750)]);

    let table = exporter(dir.path(), EngineConfig::default())
        .export(GroupingLevel::SubBranch, &[p(202502)])?;
    let json: serde_json::Value = serde_json::from_str(&table.to_json()?)?;

    assert_eq!(json["granularity"], "sub_branch");
    assert_eq!(json["rows"][0]["period"], 202502);
    assert_eq!(json["rows"][0]["period_date"], "2025-06-01");
    Ok(())
}
