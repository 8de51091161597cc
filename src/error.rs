use std::error::Error;

/// Caller supplied structurally invalid input. Always raised before any I/O
/// is attempted and never retried.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("message cannot be empty")]
    EmptyMessage,

    #[error("trace id cannot be empty")]
    EmptyTraceId,

    #[error("partition key cannot be empty")]
    EmptyPartitionKey,

    #[error("row key cannot be empty")]
    EmptyRowKey,

    #[error("log fields must include a non-empty Message")]
    MissingMessage,

    #[error("page size must be positive")]
    NonPositivePageSize,

    #[error("invalid order_by field: {0}")]
    InvalidOrderBy(String),

    #[error("unsupported filter value type for field {0}")]
    InvalidFilterValue(String),

    #[error("connection string cannot be empty")]
    EmptyConnectionString,

    #[error("malformed connection string: {0}")]
    InvalidConnectionString(String),

    #[error("table name cannot be empty")]
    EmptyTableName,
}

/// Error type returned by the storage port.
///
/// Not-found on a point lookup is not an error; it surfaces as `Ok(None)`.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("storage backend failure: {0}")]
    Storage(#[source] Box<dyn Error + Send + Sync>),
}

impl StoreError {
    pub fn is_validation(&self) -> bool {
        matches!(self, StoreError::Validation(_))
    }
}
