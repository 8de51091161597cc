use crate::error::{StoreError, ValidationError};
use crate::record::FieldMap;
use crate::store::{LogPage, LogQuery, LogStore, ORDERABLE_FIELDS};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::error::Error;
use std::sync::Arc;
use tracing::{debug, warn};

/// Wire fields selected on every query, so a returned row always carries
/// the full record shape.
pub const SELECT_FIELDS: &[&str] = &[
    "PartitionKey",
    "RowKey",
    "LogLevel",
    "Timestamp",
    "TraceId",
    "LoggerName",
    "Location",
    "Message",
    "Metadata",
];

/// Error type returned by a [`TableApi`] backend.
///
/// `AlreadyExists`, `Conflict` and `NotFound` are the three outcomes the
/// adapter gives distinct treatment; everything else travels in `Backend`.
#[derive(thiserror::Error, Debug)]
pub enum TableApiError {
    #[error("table already exists")]
    AlreadyExists,

    #[error("an entity with this partition and row key already exists")]
    Conflict,

    #[error("entity not found")]
    NotFound,

    #[error("table service error: {0}")]
    Backend(#[source] Box<dyn Error + Send + Sync>),
}

impl TableApiError {
    pub fn backend(err: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        TableApiError::Backend(err.into())
    }
}

/// Capability contract of the remote partitioned table service.
///
/// Implementations transport entities to a concrete backend (the REST
/// client, an in-memory table for tests). Every method is scoped by table
/// name; the adapter supplies its configured table on each call. The handle
/// is long-lived and shared read-only across concurrent calls, per the
/// backing store's own thread-safety contract.
#[async_trait]
pub trait TableApi: Send + Sync {
    /// Create `table`, returning [`TableApiError::AlreadyExists`] when it
    /// is already provisioned.
    async fn create_table(&self, table: &str) -> Result<(), TableApiError>;

    /// Insert one entity keyed by `(partition_key, row_key)`. A key pair
    /// that already exists is [`TableApiError::Conflict`].
    async fn insert(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
        fields: &FieldMap,
    ) -> Result<(), TableApiError>;

    /// Run one page of a filtered query, selecting `select` columns and
    /// returning at most `page_size` rows plus the store's opaque
    /// continuation token when more rows remain.
    async fn query(
        &self,
        table: &str,
        filter: &str,
        page_size: usize,
        select: &[&str],
        continuation: Option<&str>,
    ) -> Result<(Vec<FieldMap>, Option<String>), TableApiError>;

    /// Fetch a single entity by key pair, [`TableApiError::NotFound`] when
    /// the store has no such row.
    async fn point_get(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<FieldMap>, TableApiError>;
}

/// [`LogStore`] implementation over any [`TableApi`] backend.
///
/// Owns filter construction, pagination and per-page sort. Stateless across
/// calls beyond the shared backend handle; continuation state lives entirely
/// in the token the caller passes back.
pub struct TableLogStore {
    api: Arc<dyn TableApi>,
    table: String,
}

impl std::fmt::Debug for TableLogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableLogStore")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl TableLogStore {
    /// Build a store over `api`, provisioning `table` if it does not exist
    /// yet. An already-provisioned table is success; any other provisioning
    /// failure propagates as [`StoreError::Storage`].
    pub async fn connect(
        api: Arc<dyn TableApi>,
        table: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let table = table.into();
        if table.is_empty() {
            return Err(ValidationError::EmptyTableName.into());
        }

        match api.create_table(&table).await {
            Ok(()) => debug!(table = %table, "created log table"),
            Err(TableApiError::AlreadyExists) => {
                debug!(table = %table, "log table already exists")
            }
            Err(e) => return Err(StoreError::Storage(Box::new(e))),
        }

        Ok(TableLogStore { api, table })
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Build the equality-conjunction filter expression for `filters`.
    ///
    /// Text values are quoted with embedded quotes doubled, numbers are
    /// emitted bare, booleans as lowercase tokens. Any other value type is
    /// a validation error naming the field. `BTreeMap` iteration makes the
    /// clause order deterministic.
    fn build_filter_string(
        filters: Option<&BTreeMap<String, serde_json::Value>>,
    ) -> Result<Option<String>, ValidationError> {
        let filters = match filters {
            Some(f) if !f.is_empty() => f,
            _ => return Ok(None),
        };

        let mut conditions = Vec::with_capacity(filters.len());
        for (field, value) in filters {
            let clause = match value {
                serde_json::Value::String(s) => {
                    format!("{} eq '{}'", field, s.replace('\'', "''"))
                }
                serde_json::Value::Number(n) => format!("{} eq {}", field, n),
                serde_json::Value::Bool(b) => format!("{} eq {}", field, b),
                _ => return Err(ValidationError::InvalidFilterValue(field.clone())),
            };
            conditions.push(clause);
        }
        Ok(Some(conditions.join(" and ")))
    }

    fn sort_key(entry: &FieldMap, field: &str) -> String {
        match entry.get(field) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        }
    }
}

#[async_trait]
impl LogStore for TableLogStore {
    async fn store_log(
        &self,
        partition_key: &str,
        row_key: &str,
        fields: &FieldMap,
    ) -> Result<(), StoreError> {
        if partition_key.is_empty() {
            return Err(ValidationError::EmptyPartitionKey.into());
        }
        if row_key.is_empty() {
            return Err(ValidationError::EmptyRowKey.into());
        }
        let has_message = fields
            .get("Message")
            .and_then(|v| v.as_str())
            .map(|s| !s.is_empty())
            .unwrap_or(false);
        if !has_message {
            return Err(ValidationError::MissingMessage.into());
        }

        // Single insert, no retry; a duplicate key is a storage failure the
        // caller must see rather than silently dropped data.
        self.api
            .insert(&self.table, partition_key, row_key, fields)
            .await
            .map_err(|e| {
                warn!(table = %self.table, partition_key, row_key, error = %e, "failed to store log");
                StoreError::Storage(Box::new(e))
            })
    }

    async fn get_logs(&self, query: &LogQuery) -> Result<LogPage, StoreError> {
        if query.page_size == 0 {
            return Err(ValidationError::NonPositivePageSize.into());
        }
        if !ORDERABLE_FIELDS.contains(&query.order_by.as_str()) {
            return Err(ValidationError::InvalidOrderBy(query.order_by.clone()).into());
        }

        let filter = Self::build_filter_string(query.filters.as_ref())?
            // Catch-all that matches every partition when no filter is given.
            .unwrap_or_else(|| "PartitionKey ne ''".to_string());

        debug!(table = %self.table, %filter, page_size = query.page_size, "querying logs");

        let (mut entries, token) = self
            .api
            .query(
                &self.table,
                &filter,
                query.page_size,
                SELECT_FIELDS,
                query.continuation_token.as_deref(),
            )
            .await
            .map_err(|e| StoreError::Storage(Box::new(e)))?;

        // Sort within the page only; the store paginates in key order, so a
        // global sort across pages is not attempted. Stable in both
        // directions, ties keep store return order.
        let field = query.order_by.as_str();
        if query.ascending {
            entries.sort_by(|a, b| Self::sort_key(a, field).cmp(&Self::sort_key(b, field)));
        } else {
            entries.sort_by(|a, b| {
                match Self::sort_key(a, field).cmp(&Self::sort_key(b, field)) {
                    Ordering::Less => Ordering::Greater,
                    Ordering::Greater => Ordering::Less,
                    Ordering::Equal => Ordering::Equal,
                }
            });
        }

        // A token is surfaced only for an exactly-full page. A short final
        // page from a backend that still holds a token ends pagination
        // early; callers treat "page not full" as end-of-results.
        let continuation_token = if entries.len() == query.page_size {
            token
        } else {
            None
        };

        Ok(LogPage {
            entries,
            continuation_token,
        })
    }

    async fn get_log_entry(
        &self,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<FieldMap>, StoreError> {
        if partition_key.is_empty() {
            return Err(ValidationError::EmptyPartitionKey.into());
        }
        if row_key.is_empty() {
            return Err(ValidationError::EmptyRowKey.into());
        }

        match self.api.point_get(&self.table, partition_key, row_key).await {
            Ok(entity) => Ok(entity),
            Err(TableApiError::NotFound) => Ok(None),
            Err(e) => Err(StoreError::Storage(Box::new(e))),
        }
    }
}
