// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `apflow poison list|requeue`.

use apflow_config::model::ApflowConfig;
use apflow_core::types::QueueEntry;
use apflow_core::{ApflowError, MessageQueue, PluginAdapter};

use crate::app;

const PAYLOAD_PREVIEW: usize = 80;

fn preview(payload: &str) -> String {
    let flat: String = payload.chars().filter(|c| !c.is_control()).collect();
    if flat.chars().count() <= PAYLOAD_PREVIEW {
        flat
    } else {
        let cut: String = flat.chars().take(PAYLOAD_PREVIEW).collect();
        format!("{cut}...")
    }
}

fn describe(entry: &QueueEntry) -> String {
    format!(
        "#{id} [{queue}] deliveries={count} last_error={error}\n    {payload}",
        id = entry.id,
        queue = entry.queue_name,
        count = entry.dequeue_count,
        error = entry.last_error.as_deref().unwrap_or("-"),
        payload = preview(&entry.payload),
    )
}

pub async fn run_list(config: &ApflowConfig, queue: Option<&str>) -> Result<(), ApflowError> {
    let storage = app::open_storage(config).await?;
    let entries = storage.list_poison(queue).await?;
    if entries.is_empty() {
        println!("no poisoned entries");
    }
    for entry in &entries {
        println!("{}", describe(entry));
    }
    storage.shutdown().await
}

pub async fn run_requeue(config: &ApflowConfig, id: i64) -> Result<(), ApflowError> {
    let storage = app::open_storage(config).await?;
    storage.requeue_poison(id).await?;
    println!("entry #{id} requeued");
    storage.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_payloads_are_truncated() {
        assert_eq!(preview("{\"a\":\n1}"), "{\"a\":1}");
        let long = "x".repeat(200);
        let shown = preview(&long);
        assert!(shown.ends_with("..."));
        assert_eq!(shown.chars().count(), PAYLOAD_PREVIEW + 3);
    }

    #[test]
    fn description_names_queue_and_error() {
        let entry = QueueEntry {
            id: 9,
            queue_name: "raw-mail".to_string(),
            payload: "not json".to_string(),
            status: "poison".to_string(),
            dequeue_count: 5,
            max_deliveries: 5,
            visible_at: String::new(),
            last_error: Some("serialization error".to_string()),
            created_at: String::new(),
            updated_at: String::new(),
        };
        let text = describe(&entry);
        assert!(text.starts_with("#9 [raw-mail] deliveries=5 last_error=serialization error"));
        assert!(text.contains("not json"));
    }
}
