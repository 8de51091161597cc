use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Flat field set persisted as one table row. Values are JSON scalars on
/// the wire; `Metadata` is either a JSON-encoded string or an explicit null.
pub type FieldMap = BTreeMap<String, serde_json::Value>;

/// Severity of a log entry. `Display` emits the uppercase wire token that
/// is stored in the `LogLevel` column and embedded in the row key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logged event, constructed once per log call and persisted immediately.
///
/// The storage key is derived, not stored: the partition key is the trace id
/// (co-locating every entry of one trace in a single partition) and the row
/// key is `"<timestamp>_<LEVEL>"`, so in-partition scan order is
/// chronological.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub level: LogLevel,
    pub timestamp: DateTime<Utc>,
    pub trace_id: String,
    pub logger_name: String,
    pub location: String,
    pub message: String,
    pub metadata: Option<BTreeMap<String, serde_json::Value>>,
}

/// Format a timestamp as fixed-width UTC ISO-8601 with microsecond
/// precision and a literal `Z`. Fixed width keeps lexical row-key order
/// equal to chronological order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl LogRecord {
    pub fn partition_key(&self) -> &str {
        &self.trace_id
    }

    pub fn row_key(&self) -> String {
        format!("{}_{}", format_timestamp(&self.timestamp), self.level)
    }

    /// Project the record into the flat wire shape of one table row.
    ///
    /// Always includes the derived `PartitionKey`/`RowKey`. Metadata is
    /// JSON-encoded into a single string column; when absent it projects as
    /// an explicit null so readers can tell "no metadata" apart from a field
    /// that was simply not selected.
    pub fn to_fields(&self) -> FieldMap {
        let metadata = match &self.metadata {
            Some(map) => serde_json::to_string(map)
                .map(serde_json::Value::String)
                .unwrap_or(serde_json::Value::Null),
            None => serde_json::Value::Null,
        };

        let mut fields = FieldMap::new();
        fields.insert("PartitionKey".into(), self.partition_key().into());
        fields.insert("RowKey".into(), self.row_key().into());
        fields.insert("LogLevel".into(), self.level.as_str().into());
        fields.insert("Message".into(), self.message.clone().into());
        fields.insert(
            "Timestamp".into(),
            format_timestamp(&self.timestamp).into(),
        );
        fields.insert("TraceId".into(), self.trace_id.clone().into());
        fields.insert("LoggerName".into(), self.logger_name.clone().into());
        fields.insert("Location".into(), self.location.clone().into());
        fields.insert("Metadata".into(), metadata);
        fields
    }
}
