/// Environment variable names used by this crate for convenient
/// configuration of the REST table backend from services.
///
/// These are purely helpers; the core store types remain decoupled from
/// environment access.

/// Base table endpoint, e.g. `http://127.0.0.1:10002/devstoreaccount1`.
pub const TABLELOG_ENDPOINT_ENV: &str = "TABLELOG_ENDPOINT";

/// Optional shared-access-signature query string (without the leading `?`).
pub const TABLELOG_SAS_TOKEN_ENV: &str = "TABLELOG_SAS_TOKEN";

/// Target table name.
pub const TABLELOG_TABLE_ENV: &str = "TABLELOG_TABLE";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
