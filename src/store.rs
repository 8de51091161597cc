use crate::error::StoreError;
use crate::record::FieldMap;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Fields a query may be ordered or filtered on. Anything else is rejected
/// with a validation error before the backing store is contacted.
pub const ORDERABLE_FIELDS: &[&str] = &[
    "Timestamp",
    "LogLevel",
    "TraceId",
    "LoggerName",
    "Location",
    "Message",
];

/// Parameters of one paged read.
///
/// `continuation_token` is the opaque cursor returned by a previous page;
/// the store keeps no cursor state of its own between calls.
#[derive(Debug, Clone)]
pub struct LogQuery {
    pub page_size: usize,
    pub continuation_token: Option<String>,
    pub order_by: String,
    pub ascending: bool,
    pub filters: Option<BTreeMap<String, serde_json::Value>>,
}

impl Default for LogQuery {
    fn default() -> Self {
        LogQuery {
            page_size: 50,
            continuation_token: None,
            order_by: "Timestamp".to_string(),
            ascending: false,
            filters: None,
        }
    }
}

/// One page of query results.
///
/// `continuation_token` is present only when the page came back exactly
/// full; a short page is taken to mean end-of-results.
#[derive(Debug, Clone)]
pub struct LogPage {
    pub entries: Vec<FieldMap>,
    pub continuation_token: Option<String>,
}

/// Asynchronous destination for log rows produced by [`TableLogger`] and
/// query surface for reading them back.
///
/// Implementations persist rows in a partitioned table keyed by
/// (partition key, row key). The facade only writes; read paths are called
/// on the store directly. All methods validate their inputs before issuing
/// any I/O and never retry internally.
///
/// [`TableLogger`]: crate::logger::TableLogger
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Persist one row under `(partition_key, row_key)`.
    ///
    /// Fails with a validation error when either key is empty or `fields`
    /// lacks a non-empty `Message`. Any backing-store failure, including a
    /// duplicate-key conflict, surfaces as [`StoreError::Storage`].
    async fn store_log(
        &self,
        partition_key: &str,
        row_key: &str,
        fields: &FieldMap,
    ) -> Result<(), StoreError>;

    /// Fetch one page of rows matching `query.filters`, sorted within the
    /// page by `query.order_by` (descending unless `query.ascending`).
    async fn get_logs(&self, query: &LogQuery) -> Result<LogPage, StoreError>;

    /// Point lookup by key pair. A row the backing store does not have is
    /// `Ok(None)`, not an error.
    async fn get_log_entry(
        &self,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<FieldMap>, StoreError>;
}
