pub mod env;
pub mod error;
pub mod logger;
pub mod memory;
pub mod record;
pub mod store;
pub mod table;

#[cfg(feature = "rest")]
pub mod rest;

pub use error::{StoreError, ValidationError};
pub use logger::{Metadata, TableLogger};
pub use record::{FieldMap, LogLevel, LogRecord};
pub use store::{LogPage, LogQuery, LogStore};
pub use table::{TableApi, TableApiError, TableLogStore};
