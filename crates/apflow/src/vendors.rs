// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `apflow vendors import|list`.
//!
//! The import file is a CSV with a header row. `name` is required; the other
//! columns (`expense_dept`, `gl_code`, `allocation_schedule`, `billing_party`,
//! `product_category`, `active`) may be omitted. Rows are keyed by the
//! normalized vendor name, so re-importing a file updates in place.

use std::io::Read;
use std::path::Path;

use apflow_config::model::ApflowConfig;
use apflow_core::types::normalize_vendor_key;
use apflow_core::{ApflowError, EntityStore, PluginAdapter, Vendor};
use serde::Deserialize;

use crate::app;

#[derive(Debug, Deserialize)]
struct VendorRecord {
    name: String,
    #[serde(default)]
    expense_dept: String,
    #[serde(default)]
    gl_code: String,
    #[serde(default)]
    allocation_schedule: String,
    #[serde(default)]
    billing_party: String,
    #[serde(default)]
    product_category: String,
    #[serde(default)]
    active: Option<String>,
}

fn parse_active(value: Option<&str>, line: u64) -> Result<bool, ApflowError> {
    match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") | Some("true") | Some("yes") | Some("y") | Some("1") => Ok(true),
        Some("false") | Some("no") | Some("n") | Some("0") => Ok(false),
        Some(other) => Err(ApflowError::Validation(format!(
            "line {line}: `active` must be true or false, got `{other}`"
        ))),
    }
}

/// Parse vendor rows. Fails on the first malformed row.
pub fn parse_vendors<R: Read>(reader: R) -> Result<Vec<Vendor>, ApflowError> {
    let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut vendors = Vec::new();

    for record in csv.deserialize::<VendorRecord>() {
        let record = record.map_err(|e| ApflowError::Validation(format!("vendor CSV: {e}")))?;
        // Header is line 1.
        let line = vendors.len() as u64 + 2;
        if record.name.is_empty() {
            return Err(ApflowError::Validation(format!("line {line}: vendor name is empty")));
        }
        vendors.push(Vendor {
            row_key: normalize_vendor_key(&record.name),
            active: parse_active(record.active.as_deref(), line)?,
            name: record.name,
            expense_dept: record.expense_dept,
            gl_code: record.gl_code,
            allocation_schedule: record.allocation_schedule,
            billing_party: record.billing_party,
            product_category: record.product_category,
        });
    }
    Ok(vendors)
}

pub async fn run_import(config: &ApflowConfig, path: &Path) -> Result<(), ApflowError> {
    let file = std::fs::File::open(path).map_err(|e| {
        ApflowError::Validation(format!("cannot open {}: {e}", path.display()))
    })?;
    let vendors = parse_vendors(file)?;

    let storage = app::open_storage(config).await?;
    for vendor in &vendors {
        storage.upsert_vendor(vendor).await?;
    }
    println!("imported {} vendor(s) from {}", vendors.len(), path.display());
    storage.shutdown().await
}

pub async fn run_list(config: &ApflowConfig) -> Result<(), ApflowError> {
    let storage = app::open_storage(config).await?;
    let vendors = storage.list_vendors().await?;
    if vendors.is_empty() {
        println!("no vendors; import some with `apflow vendors import <file.csv>`");
    } else {
        println!(
            "{:<32} {:<12} {:<8} {:<12} {}",
            "NAME", "DEPT", "GL", "CATEGORY", "ACTIVE"
        );
        for v in &vendors {
            println!(
                "{:<32} {:<12} {:<8} {:<12} {}",
                v.name,
                v.expense_dept,
                v.gl_code,
                v.product_category,
                if v.active { "yes" } else { "no" }
            );
        }
    }
    storage.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_and_sparse_rows() {
        let csv = "\
name,expense_dept,gl_code,allocation_schedule,billing_party,product_category,active
Adobe Inc,IT,6100,Monthly,Adobe Systems,Software,true
  CDW  ,IT,6200,,,Reseller,
Old Vendor,Ops,7000,,,,no
";
        let vendors = parse_vendors(csv.as_bytes()).unwrap();
        assert_eq!(vendors.len(), 3);

        assert_eq!(vendors[0].row_key, "adobe_inc");
        assert_eq!(vendors[0].gl_code, "6100");
        assert!(vendors[0].active);

        assert_eq!(vendors[1].name, "CDW");
        assert!(vendors[1].is_reseller());
        assert!(vendors[1].active);

        assert!(!vendors[2].active);
    }

    #[test]
    fn optional_columns_may_be_missing() {
        let vendors = parse_vendors("name,gl_code\nGitHub - Enterprise,6150\n".as_bytes()).unwrap();
        assert_eq!(vendors[0].row_key, "github_enterprise");
        assert_eq!(vendors[0].expense_dept, "");
        assert!(vendors[0].active);
    }

    #[test]
    fn rejects_bad_rows() {
        let err = parse_vendors("name,active\nAdobe,maybe\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 2"), "got: {err}");

        let err = parse_vendors("name\n\"\"\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("empty"), "got: {err}");

        assert!(parse_vendors("gl_code\n6100\n".as_bytes()).is_err());
    }

    #[tokio::test]
    async fn import_then_list_round_trips_through_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ApflowConfig::default();
        config.storage.database_path = dir.path().join("apflow.db").display().to_string();
        let csv_path = dir.path().join("vendors.csv");
        std::fs::write(&csv_path, "name,gl_code\nAdobe Inc,6100\nadobe  inc,6101\n").unwrap();

        run_import(&config, &csv_path).await.unwrap();

        let storage = app::open_storage(&config).await.unwrap();
        let vendors = storage.list_vendors().await.unwrap();
        assert_eq!(vendors.len(), 1, "same row key updates in place");
        assert_eq!(vendors[0].gl_code, "6101");
    }
}
