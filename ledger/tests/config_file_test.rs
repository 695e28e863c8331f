//! Integration tests for loading market configuration from disk.

use std::io::Write;

use carbon_ledger::config::{MarketConfig, MintAuthorization};
use carbon_ledger::telemetry::LogFormat;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn loads_full_config_file() {
    let file = write_config(
        r#"{
            "mint_authorization": "any_recorded_approval",
            "unique_serial_numbers": false,
            "max_text_field_length": 128,
            "min_vintage_year": 2005,
            "max_vintage_year": 2035,
            "metrics_namespace": "registry",
            "log_level": "debug",
            "log_format": "json"
        }"#,
    );

    let config = MarketConfig::from_file(file.path()).unwrap();
    assert_eq!(config.mint_authorization, MintAuthorization::AnyRecordedApproval);
    assert!(!config.unique_serial_numbers);
    assert_eq!(config.max_text_field_length, 128);
    assert_eq!(config.min_vintage_year, 2005);
    assert_eq!(config.max_vintage_year, 2035);
    assert_eq!(config.metrics_namespace, "registry");
    assert_eq!(config.log_format, LogFormat::Json);
}

#[test]
fn empty_object_yields_defaults() {
    let file = write_config("{}");
    let config = MarketConfig::from_file(file.path()).unwrap();
    assert_eq!(config, MarketConfig::default());
}

#[test]
fn missing_file_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.json");
    let err = MarketConfig::from_file(&missing).unwrap_err();
    assert!(format!("{err:#}").contains("absent.json"));
}

#[test]
fn malformed_json_rejected() {
    let file = write_config("{ not json");
    let err = MarketConfig::from_file(file.path()).unwrap_err();
    assert!(format!("{err:#}").contains("malformed market config"));
}

#[test]
fn invalid_values_rejected_after_parse() {
    let file = write_config(r#"{ "metrics_namespace": "  " }"#);
    let err = MarketConfig::from_file(file.path()).unwrap_err();
    assert!(format!("{err:#}").contains("namespace"));
}
