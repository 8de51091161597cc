use crate::error::{StoreError, ValidationError};
use crate::record::{LogLevel, LogRecord};
use crate::store::LogStore;
use chrono::Utc;
use std::collections::BTreeMap;
use std::future::Future;
use std::panic::Location;
use std::sync::Arc;

/// Caller-supplied structured metadata attached to one entry.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Write-side facade: turns a leveled log call into a [`LogRecord`] and
/// persists it through a [`LogStore`].
///
/// Each instance carries a logger name and a default trace id; a call may
/// override the trace id per entry. Call-site location is captured through
/// `#[track_caller]`, so the stored `Location` is the file and line of the
/// application call, not of this module. Callers that wrap the logger can
/// pass an explicit location through [`TableLogger::log_at`].
///
/// The facade performs no recovery: validation failures are reported before
/// any I/O, and storage failures propagate unchanged.
pub struct TableLogger {
    store: Arc<dyn LogStore>,
    logger_name: String,
    default_trace_id: String,
}

impl TableLogger {
    pub fn new(
        store: Arc<dyn LogStore>,
        logger_name: impl Into<String>,
        default_trace_id: impl Into<String>,
    ) -> Self {
        TableLogger {
            store,
            logger_name: logger_name.into(),
            default_trace_id: default_trace_id.into(),
        }
    }

    /// Log `message` at `level`.
    ///
    /// An empty message, or an explicitly provided but empty trace id, is a
    /// validation error and nothing is written. `None` for the trace id
    /// resolves to this logger's default.
    #[track_caller]
    pub fn log(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        trace_id: Option<String>,
        metadata: Option<Metadata>,
    ) -> impl Future<Output = Result<(), StoreError>> + '_ {
        // Captured before the future is built so it names the call site.
        let caller = Location::caller();
        let location = format!("{}:{}", caller.file(), caller.line());
        let message = message.into();
        async move { self.write(level, message, trace_id, metadata, location).await }
    }

    /// Like [`TableLogger::log`] but with an explicitly supplied source
    /// location, for callers that route log calls through their own layer.
    pub fn log_at(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        trace_id: Option<String>,
        metadata: Option<Metadata>,
        location: impl Into<String>,
    ) -> impl Future<Output = Result<(), StoreError>> + '_ {
        let message = message.into();
        let location = location.into();
        async move { self.write(level, message, trace_id, metadata, location).await }
    }

    #[track_caller]
    pub fn debug(
        &self,
        message: impl Into<String>,
        trace_id: Option<String>,
        metadata: Option<Metadata>,
    ) -> impl Future<Output = Result<(), StoreError>> + '_ {
        self.log(LogLevel::Debug, message, trace_id, metadata)
    }

    #[track_caller]
    pub fn info(
        &self,
        message: impl Into<String>,
        trace_id: Option<String>,
        metadata: Option<Metadata>,
    ) -> impl Future<Output = Result<(), StoreError>> + '_ {
        self.log(LogLevel::Info, message, trace_id, metadata)
    }

    #[track_caller]
    pub fn warning(
        &self,
        message: impl Into<String>,
        trace_id: Option<String>,
        metadata: Option<Metadata>,
    ) -> impl Future<Output = Result<(), StoreError>> + '_ {
        self.log(LogLevel::Warning, message, trace_id, metadata)
    }

    #[track_caller]
    pub fn error(
        &self,
        message: impl Into<String>,
        trace_id: Option<String>,
        metadata: Option<Metadata>,
    ) -> impl Future<Output = Result<(), StoreError>> + '_ {
        self.log(LogLevel::Error, message, trace_id, metadata)
    }

    #[track_caller]
    pub fn critical(
        &self,
        message: impl Into<String>,
        trace_id: Option<String>,
        metadata: Option<Metadata>,
    ) -> impl Future<Output = Result<(), StoreError>> + '_ {
        self.log(LogLevel::Critical, message, trace_id, metadata)
    }

    async fn write(
        &self,
        level: LogLevel,
        message: String,
        trace_id: Option<String>,
        metadata: Option<Metadata>,
        location: String,
    ) -> Result<(), StoreError> {
        if message.is_empty() {
            return Err(ValidationError::EmptyMessage.into());
        }
        if let Some(t) = &trace_id {
            if t.is_empty() {
                return Err(ValidationError::EmptyTraceId.into());
            }
        }

        let record = LogRecord {
            level,
            timestamp: Utc::now(),
            trace_id: trace_id.unwrap_or_else(|| self.default_trace_id.clone()),
            logger_name: self.logger_name.clone(),
            location,
            message,
            metadata,
        };

        let fields = record.to_fields();
        self.store
            .store_log(record.partition_key(), &record.row_key(), &fields)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldMap;
    use crate::store::{LogPage, LogQuery};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every `store_log` call so tests can assert what was (or was
    /// not) written.
    #[derive(Default)]
    struct RecordingStore {
        stored: Mutex<Vec<(String, String, FieldMap)>>,
    }

    #[async_trait]
    impl LogStore for RecordingStore {
        async fn store_log(
            &self,
            partition_key: &str,
            row_key: &str,
            fields: &FieldMap,
        ) -> Result<(), StoreError> {
            self.stored.lock().unwrap().push((
                partition_key.to_string(),
                row_key.to_string(),
                fields.clone(),
            ));
            Ok(())
        }

        async fn get_logs(&self, _query: &LogQuery) -> Result<LogPage, StoreError> {
            Ok(LogPage {
                entries: Vec::new(),
                continuation_token: None,
            })
        }

        async fn get_log_entry(
            &self,
            _partition_key: &str,
            _row_key: &str,
        ) -> Result<Option<FieldMap>, StoreError> {
            Ok(None)
        }
    }

    fn logger_with_store() -> (TableLogger, Arc<RecordingStore>) {
        let store = Arc::new(RecordingStore::default());
        let logger = TableLogger::new(store.clone(), "test_logger", "default-trace");
        (logger, store)
    }

    #[tokio::test]
    async fn log_derives_keys_from_trace_timestamp_and_level() {
        let (logger, store) = logger_with_store();
        logger
            .log(LogLevel::Info, "hello", None, None)
            .await
            .unwrap();

        let stored = store.stored.lock().unwrap();
        let (pk, rk, fields) = &stored[0];
        assert_eq!(pk, "default-trace");
        assert!(rk.ends_with("_INFO"));
        assert_eq!(rk, &format!("{}_INFO", fields["Timestamp"].as_str().unwrap()));
        assert_eq!(fields["LoggerName"], "test_logger");
    }

    #[tokio::test]
    async fn empty_message_fails_before_any_store_call() {
        let (logger, store) = logger_with_store();
        let err = logger
            .log(LogLevel::Info, "", None, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Validation(ValidationError::EmptyMessage)
        ));
        assert!(store.stored.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn explicit_empty_trace_id_is_rejected() {
        let (logger, store) = logger_with_store();
        let err = logger
            .log(LogLevel::Error, "boom", Some(String::new()), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Validation(ValidationError::EmptyTraceId)
        ));
        assert!(store.stored.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn explicit_trace_id_overrides_default() {
        let (logger, store) = logger_with_store();
        logger
            .log(LogLevel::Info, "first", Some("custom".into()), None)
            .await
            .unwrap();
        logger.log(LogLevel::Info, "second", None, None).await.unwrap();

        let stored = store.stored.lock().unwrap();
        assert_eq!(stored[0].2["TraceId"], "custom");
        assert_eq!(stored[1].2["TraceId"], "default-trace");
    }

    #[tokio::test]
    async fn convenience_methods_fix_the_level() {
        let (logger, store) = logger_with_store();
        logger.debug("d", None, None).await.unwrap();
        logger.info("i", None, None).await.unwrap();
        logger.warning("w", None, None).await.unwrap();
        logger.error("e", None, None).await.unwrap();
        logger.critical("c", None, None).await.unwrap();

        let stored = store.stored.lock().unwrap();
        let levels: Vec<_> = stored
            .iter()
            .map(|(_, _, f)| f["LogLevel"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(levels, ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"]);
    }

    #[tokio::test]
    async fn location_names_the_call_site() {
        let (logger, store) = logger_with_store();
        logger.info("here", None, None).await.unwrap();

        let stored = store.stored.lock().unwrap();
        let location = stored[0].2["Location"].as_str().unwrap();
        assert!(location.contains("logger.rs"), "got {location}");
    }

    #[tokio::test]
    async fn log_at_uses_the_supplied_location() {
        let (logger, store) = logger_with_store();
        logger
            .log_at(LogLevel::Info, "routed", None, None, "app/handler.rs:42")
            .await
            .unwrap();

        let stored = store.stored.lock().unwrap();
        assert_eq!(stored[0].2["Location"], "app/handler.rs:42");
    }
}
