// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `apflow resolve`: dry-run vendor resolution against the ledger.

use apflow_config::model::ApflowConfig;
use apflow_core::{ApflowError, EntityStore, PluginAdapter};
use apflow_pipeline::{Resolution, VendorResolver};

use crate::app;

pub fn describe(resolution: &Resolution) -> String {
    match resolution {
        Resolution::Matched(m) => format!(
            "matched {} by {} (score {:.1}{}) -> dept {}, GL {}",
            m.vendor.name,
            m.method,
            m.score,
            if m.from_domain { ", from sender domain" } else { "" },
            m.vendor.expense_dept,
            m.vendor.gl_code,
        ),
        Resolution::Reseller(m) => format!(
            "reseller {} by {} (score {:.1}); needs manual allocation",
            m.vendor.name, m.method, m.score
        ),
        Resolution::Unknown { candidate } => match candidate {
            Some(name) => format!("unknown vendor (tried `{name}`)"),
            None => "unknown vendor (no candidate name)".to_string(),
        },
    }
}

pub async fn run_resolve(
    config: &ApflowConfig,
    sender: &str,
    name: Option<&str>,
) -> Result<(), ApflowError> {
    let storage = app::open_storage(config).await?;
    let vendors = storage.list_active_vendors().await?;
    let resolver = VendorResolver::new(config.matching.fuzzy_threshold);
    let resolution = resolver.resolve(&vendors, name, sender);
    println!("{}", describe(&resolution));
    storage.shutdown().await
}
