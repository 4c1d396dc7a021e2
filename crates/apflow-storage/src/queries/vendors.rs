// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vendor ledger queries.

use apflow_core::types::now_timestamp;
use apflow_core::{ApflowError, Vendor};
use rusqlite::{params, Row};

use crate::database::{map_tr_err, Database};

fn row_to_vendor(row: &Row<'_>) -> Result<Vendor, rusqlite::Error> {
    Ok(Vendor {
        row_key: row.get(0)?,
        name: row.get(1)?,
        expense_dept: row.get(2)?,
        gl_code: row.get(3)?,
        allocation_schedule: row.get(4)?,
        billing_party: row.get(5)?,
        product_category: row.get(6)?,
        active: row.get(7)?,
    })
}

async fn select(db: &Database, active_only: bool) -> Result<Vec<Vendor>, ApflowError> {
    db.connection()
        .call(move |conn| {
            let filter = if active_only { "WHERE active = 1" } else { "" };
            let sql = format!(
                "SELECT row_key, name, expense_dept, gl_code, allocation_schedule,
                        billing_party, product_category, active
                 FROM vendors {filter} ORDER BY name ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], row_to_vendor)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list_active(db: &Database) -> Result<Vec<Vendor>, ApflowError> {
    select(db, true).await
}

pub async fn list_all(db: &Database) -> Result<Vec<Vendor>, ApflowError> {
    select(db, false).await
}

/// Insert or replace the vendor at `vendor.row_key`.
pub async fn upsert(db: &Database, vendor: &Vendor) -> Result<(), ApflowError> {
    let vendor = vendor.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO vendors (row_key, name, expense_dept, gl_code, allocation_schedule,
                                      billing_party, product_category, active, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(row_key) DO UPDATE SET
                     name = excluded.name,
                     expense_dept = excluded.expense_dept,
                     gl_code = excluded.gl_code,
                     allocation_schedule = excluded.allocation_schedule,
                     billing_party = excluded.billing_party,
                     product_category = excluded.product_category,
                     active = excluded.active,
                     updated_at = excluded.updated_at",
                params![
                    vendor.row_key,
                    vendor.name,
                    vendor.expense_dept,
                    vendor.gl_code,
                    vendor.allocation_schedule,
                    vendor.billing_party,
                    vendor.product_category,
                    vendor.active,
                    now_timestamp(),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn vendor(name: &str, active: bool) -> Vendor {
        Vendor {
            name: name.to_string(),
            row_key: apflow_core::types::normalize_vendor_key(name),
            expense_dept: "Marketing".into(),
            gl_code: "6100".into(),
            allocation_schedule: String::new(),
            billing_party: String::new(),
            product_category: String::new(),
            active,
        }
    }

    #[tokio::test]
    async fn upsert_replaces_and_filters_inactive() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("v.db").to_str().unwrap(), true)
            .await
            .unwrap();

        upsert(&db, &vendor("Adobe Inc", true)).await.unwrap();
        upsert(&db, &vendor("Old Vendor", false)).await.unwrap();

        let mut updated = vendor("Adobe Inc", true);
        updated.gl_code = "6150".into();
        upsert(&db, &updated).await.unwrap();

        let active = list_active(&db).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].gl_code, "6150");
        assert_eq!(list_all(&db).await.unwrap().len(), 2);
    }
}
