//! Work item files
//!
//! Work items are exchanged with other producers and consumers as a JSON array of
//! `{"payload": {...}, "files": {}}` objects.

use std::path::Path;

use crate::error::{Error, Result};
use crate::types::WorkItem;

/// Write work items as pretty-printed JSON, creating parent directories as needed
pub async fn save_work_items(path: &Path, items: &[WorkItem]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }

    let json = serde_json::to_vec_pretty(items)?;
    tokio::fs::write(path, json).await?;
    tracing::info!(path = ?path, items = items.len(), "saved work items");
    Ok(())
}

/// Read work items written by [`save_work_items`] or another producer
///
/// # Errors
///
/// Returns [`Error::Io`] when the file cannot be read and [`Error::InvalidDocument`]
/// when it is not an array of objects with an object `payload`.
pub async fn load_work_items(path: &Path) -> Result<Vec<WorkItem>> {
    let bytes = tokio::fs::read(path).await?;
    let items: Vec<WorkItem> = serde_json::from_slice(&bytes).map_err(|e| {
        Error::InvalidDocument(format!(
            "{} is not a work item array: {e}",
            path.display()
        ))
    })?;
    tracing::debug!(path = ?path, items = items.len(), "loaded work items");
    Ok(items)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TrafficData;
    use serde_json::json;

    #[tokio::test]
    async fn saved_items_load_back_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output").join("work_items.json");
        let items = vec![
            WorkItem::new(&TrafficData {
                country: "LVA".into(),
                year: json!(2019),
                rate: json!(4.4),
            }),
            WorkItem::new(&TrafficData {
                country: "LTU".into(),
                year: serde_json::Value::Null,
                rate: json!(1.2),
            }),
        ];

        save_work_items(&path, &items).await.unwrap();
        let loaded = load_work_items(&path).await.unwrap();
        assert_eq!(loaded, items);
    }

    #[tokio::test]
    async fn written_file_uses_interchange_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("work_items.json");
        let items = vec![WorkItem::new(&TrafficData {
            country: "LVA".into(),
            year: json!(2019),
            rate: json!(4.4),
        })];

        save_work_items(&path, &items).await.unwrap();
        let raw: serde_json::Value =
            serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        assert_eq!(
            raw,
            json!([{"payload": {"traffic_data": {"country": "LVA", "year": 2019, "rate": 4.4}}, "files": {}}])
        );
    }

    #[tokio::test]
    async fn loads_items_from_external_producers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("external.json");
        tokio::fs::write(
            &path,
            br#"[
                {"payload": {"traffic_data": {"country": 12, "year": "x"}}},
                {"payload": {"message": "No payloads to save"}, "files": {}}
            ]"#,
        )
        .await
        .unwrap();

        let items = load_work_items(&path).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].traffic_data(), json!({"country": 12, "year": "x"}));
        assert_eq!(items[1], WorkItem::no_data());
    }

    #[tokio::test]
    async fn rejects_non_array_documents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        tokio::fs::write(&path, br#"{"payload": {}}"#).await.unwrap();

        let err = load_work_items(&path).await.unwrap_err();
        assert!(
            matches!(err, Error::InvalidDocument(_)),
            "unexpected error: {err:?}"
        );
    }

    #[tokio::test]
    async fn rejects_items_without_object_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        tokio::fs::write(&path, br#"[{"payload": "text"}]"#).await.unwrap();

        assert!(matches!(
            load_work_items(&path).await,
            Err(Error::InvalidDocument(_))
        ));
    }
}
