use crate::record::FieldMap;
use crate::table::{TableApi, TableApiError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

/// Separator inside continuation tokens. Table keys never contain control
/// characters, so this cannot collide with key content.
const TOKEN_SEP: char = '\u{1f}';

/// In-memory [`TableApi`] implementation.
///
/// Keeps rows in key order per table, evaluates the equality-conjunction
/// filter grammar the adapter emits, and pages with a resume-after token.
/// Useful for tests and for exercising the full read/write path without a
/// remote table service. A token is handed out whenever a page came back
/// exactly full, matching the common table-service behavior of only
/// discovering end-of-results on the next call.
#[derive(Default)]
pub struct MemoryTable {
    tables: Mutex<BTreeMap<String, BTreeMap<(String, String), FieldMap>>>,
}

impl MemoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently held in `table`, 0 when it does not exist.
    pub async fn row_count(&self, table: &str) -> usize {
        self.tables
            .lock()
            .await
            .get(table)
            .map(|rows| rows.len())
            .unwrap_or(0)
    }

    fn clause_matches(entry: &FieldMap, clause: &str) -> bool {
        let mut parts = clause.splitn(3, ' ');
        let (field, op, raw) = match (parts.next(), parts.next(), parts.next()) {
            (Some(f), Some(o), Some(r)) => (f, o, r),
            _ => return false,
        };

        let expected = if raw.starts_with('\'') && raw.ends_with('\'') && raw.len() >= 2 {
            serde_json::Value::String(raw[1..raw.len() - 1].replace("''", "'"))
        } else if raw == "true" || raw == "false" {
            serde_json::Value::Bool(raw == "true")
        } else if let Ok(n) = raw.parse::<i64>() {
            serde_json::Value::from(n)
        } else if let Ok(n) = raw.parse::<f64>() {
            serde_json::Value::from(n)
        } else {
            return false;
        };

        let equal = entry.get(field) == Some(&expected);
        match op {
            "eq" => equal,
            "ne" => !equal,
            _ => false,
        }
    }

    fn matches(entry: &FieldMap, filter: &str) -> bool {
        filter
            .split(" and ")
            .all(|clause| Self::clause_matches(entry, clause))
    }
}

#[async_trait]
impl TableApi for MemoryTable {
    async fn create_table(&self, table: &str) -> Result<(), TableApiError> {
        let mut tables = self.tables.lock().await;
        if tables.contains_key(table) {
            return Err(TableApiError::AlreadyExists);
        }
        tables.insert(table.to_string(), BTreeMap::new());
        Ok(())
    }

    async fn insert(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
        fields: &FieldMap,
    ) -> Result<(), TableApiError> {
        let mut tables = self.tables.lock().await;
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| TableApiError::backend(format!("no such table: {table}")))?;

        let key = (partition_key.to_string(), row_key.to_string());
        if rows.contains_key(&key) {
            return Err(TableApiError::Conflict);
        }
        rows.insert(key, fields.clone());
        Ok(())
    }

    async fn query(
        &self,
        table: &str,
        filter: &str,
        page_size: usize,
        _select: &[&str],
        continuation: Option<&str>,
    ) -> Result<(Vec<FieldMap>, Option<String>), TableApiError> {
        let tables = self.tables.lock().await;
        let rows = tables
            .get(table)
            .ok_or_else(|| TableApiError::backend(format!("no such table: {table}")))?;

        let resume_after = continuation.map(|t| {
            let (pk, rk) = t.split_once(TOKEN_SEP).unwrap_or((t, ""));
            (pk.to_string(), rk.to_string())
        });

        let mut page = Vec::new();
        let mut token = None;
        for ((pk, rk), entry) in rows.iter() {
            if let Some(after) = &resume_after {
                if (pk.as_str(), rk.as_str()) <= (after.0.as_str(), after.1.as_str()) {
                    continue;
                }
            }
            if !Self::matches(entry, filter) {
                continue;
            }
            page.push(entry.clone());
            if page.len() == page_size {
                token = Some(format!("{pk}{TOKEN_SEP}{rk}"));
                break;
            }
        }

        Ok((page, token))
    }

    async fn point_get(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<FieldMap>, TableApiError> {
        let tables = self.tables.lock().await;
        let rows = tables
            .get(table)
            .ok_or_else(|| TableApiError::backend(format!("no such table: {table}")))?;

        rows.get(&(partition_key.to_string(), row_key.to_string()))
            .cloned()
            .map(Some)
            .ok_or(TableApiError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(pairs: &[(&str, serde_json::Value)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn filter_grammar_matches_strings_numbers_and_booleans() {
        let e = entry(&[
            ("LogLevel", json!("ERROR")),
            ("Count", json!(42)),
            ("Flag", json!(true)),
        ]);
        assert!(MemoryTable::matches(&e, "LogLevel eq 'ERROR'"));
        assert!(MemoryTable::matches(&e, "Count eq 42 and Flag eq true"));
        assert!(!MemoryTable::matches(&e, "LogLevel eq 'INFO'"));
        assert!(!MemoryTable::matches(&e, "LogLevel eq 'ERROR' and Count eq 7"));
    }

    #[test]
    fn catch_all_filter_matches_rows_with_nonempty_partition() {
        let e = entry(&[("PartitionKey", json!("t1"))]);
        assert!(MemoryTable::matches(&e, "PartitionKey ne ''"));
        let blank = entry(&[("PartitionKey", json!(""))]);
        assert!(!MemoryTable::matches(&blank, "PartitionKey ne ''"));
    }

    #[test]
    fn quoted_values_unescape_doubled_quotes() {
        let e = entry(&[("Message", json!("it's fine"))]);
        assert!(MemoryTable::matches(&e, "Message eq 'it''s fine'"));
    }

    #[tokio::test]
    async fn create_table_is_not_idempotent_at_this_layer() {
        let api = MemoryTable::new();
        api.create_table("logs").await.unwrap();
        assert!(matches!(
            api.create_table("logs").await,
            Err(TableApiError::AlreadyExists)
        ));
    }

    #[tokio::test]
    async fn duplicate_insert_conflicts() {
        let api = MemoryTable::new();
        api.create_table("logs").await.unwrap();
        let fields = entry(&[("Message", json!("m"))]);
        api.insert("logs", "p", "r", &fields).await.unwrap();
        assert!(matches!(
            api.insert("logs", "p", "r", &fields).await,
            Err(TableApiError::Conflict)
        ));
    }

    #[tokio::test]
    async fn query_pages_in_key_order_with_resume_token() {
        let api = MemoryTable::new();
        api.create_table("logs").await.unwrap();
        for rk in ["a", "b", "c"] {
            let fields = entry(&[("PartitionKey", json!("p")), ("RowKey", json!(rk))]);
            api.insert("logs", "p", rk, &fields).await.unwrap();
        }

        let (page, token) = api
            .query("logs", "PartitionKey ne ''", 2, &[], None)
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
        let token = token.expect("full page carries a token");

        let (rest, _) = api
            .query("logs", "PartitionKey ne ''", 2, &[], Some(&token))
            .await
            .unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0]["RowKey"], "c");
    }

    #[tokio::test]
    async fn point_get_reports_missing_rows_as_not_found() {
        let api = MemoryTable::new();
        api.create_table("logs").await.unwrap();
        assert!(matches!(
            api.point_get("logs", "p", "missing").await,
            Err(TableApiError::NotFound)
        ));
    }
}
