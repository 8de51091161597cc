use crate::env::{env_or, TABLELOG_ENDPOINT_ENV, TABLELOG_SAS_TOKEN_ENV, TABLELOG_TABLE_ENV};
use crate::error::{StoreError, ValidationError};
use crate::record::FieldMap;
use crate::table::{TableApi, TableApiError, TableLogStore};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use tracing::debug;

/// Separator inside continuation tokens; the two halves are the
/// `NextPartitionKey`/`NextRowKey` pair the service hands back in headers.
const TOKEN_SEP: char = '\u{1f}';

const CONTINUATION_PK_HEADER: &str = "x-ms-continuation-NextPartitionKey";
const CONTINUATION_RK_HEADER: &str = "x-ms-continuation-NextRowKey";

/// Configuration for [`RestTableClient`].
///
/// The client speaks the Azure-Table-compatible REST dialect (Azurite and
/// the real service both work) over HTTPS/HTTP with optional shared-access
/// -signature authentication.
#[derive(Clone, Debug)]
pub struct RestTableConfig {
    /// Base table endpoint without trailing slash, e.g.
    /// "http://127.0.0.1:10002/devstoreaccount1".
    pub endpoint: String,
    /// Pre-signed SAS query string, without the leading '?'.
    pub sas_token: Option<String>,
}

impl RestTableConfig {
    /// Parse a `key=value;` connection string. Recognized keys are
    /// `TableEndpoint` and `SharedAccessSignature`; anything else is
    /// ignored, matching how table services treat unknown pairs.
    pub fn from_connection_string(conn: &str) -> Result<Self, ValidationError> {
        if conn.trim().is_empty() {
            return Err(ValidationError::EmptyConnectionString);
        }

        let mut endpoint = None;
        let mut sas_token = None;
        for pair in conn.split(';').filter(|p| !p.trim().is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| ValidationError::InvalidConnectionString(pair.to_string()))?;
            match key.trim() {
                "TableEndpoint" => endpoint = Some(value.trim().trim_end_matches('/').to_string()),
                "SharedAccessSignature" => sas_token = Some(value.trim().to_string()),
                _ => {}
            }
        }

        let endpoint = endpoint.ok_or_else(|| {
            ValidationError::InvalidConnectionString("missing TableEndpoint".to_string())
        })?;
        Ok(RestTableConfig { endpoint, sas_token })
    }

    /// Read the endpoint and optional SAS token from the environment,
    /// defaulting to a local Azurite instance.
    pub fn from_env() -> Self {
        RestTableConfig {
            endpoint: env_or(TABLELOG_ENDPOINT_ENV, "http://127.0.0.1:10002/devstoreaccount1"),
            sas_token: std::env::var(TABLELOG_SAS_TOKEN_ENV).ok(),
        }
    }
}

/// [`TableApi`] implementation over the table service's REST interface.
#[derive(Clone)]
pub struct RestTableClient {
    client: Client,
    config: RestTableConfig,
}

impl RestTableClient {
    pub fn new(config: RestTableConfig) -> Self {
        RestTableClient {
            client: Client::new(),
            config,
        }
    }

    fn url(&self, path: &str, extra_query: &str) -> String {
        let mut url = format!("{}/{}", self.config.endpoint, path);
        let mut sep = '?';
        if let Some(sas) = &self.config.sas_token {
            url.push(sep);
            url.push_str(sas);
            sep = '&';
        }
        if !extra_query.is_empty() {
            url.push(sep);
            url.push_str(extra_query);
        }
        url
    }

    async fn failure(resp: reqwest::Response, what: &str) -> TableApiError {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
        TableApiError::backend(format!("{what} failed with status {status}: {body}"))
    }
}

#[async_trait]
impl TableApi for RestTableClient {
    async fn create_table(&self, table: &str) -> Result<(), TableApiError> {
        let url = self.url("Tables", "");
        let resp = self
            .client
            .post(&url)
            .header("Accept", "application/json;odata=nometadata")
            .json(&serde_json::json!({ "TableName": table }))
            .send()
            .await
            .map_err(TableApiError::backend)?;

        match resp.status() {
            StatusCode::CONFLICT => Err(TableApiError::AlreadyExists),
            s if s.is_success() => Ok(()),
            _ => Err(Self::failure(resp, "table creation").await),
        }
    }

    async fn insert(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
        fields: &FieldMap,
    ) -> Result<(), TableApiError> {
        let mut entity = fields.clone();
        entity.insert("PartitionKey".into(), partition_key.into());
        entity.insert("RowKey".into(), row_key.into());

        let url = self.url(table, "");
        let resp = self
            .client
            .post(&url)
            .header("Accept", "application/json;odata=nometadata")
            .json(&entity)
            .send()
            .await
            .map_err(TableApiError::backend)?;

        match resp.status() {
            StatusCode::CONFLICT => Err(TableApiError::Conflict),
            s if s.is_success() => Ok(()),
            _ => Err(Self::failure(resp, "entity insert").await),
        }
    }

    async fn query(
        &self,
        table: &str,
        filter: &str,
        page_size: usize,
        select: &[&str],
        continuation: Option<&str>,
    ) -> Result<(Vec<FieldMap>, Option<String>), TableApiError> {
        let mut query = format!(
            "$filter={}&$top={}&$select={}",
            urlencoding::encode(filter),
            page_size,
            urlencoding::encode(&select.join(","))
        );
        if let Some(token) = continuation {
            let (pk, rk) = token.split_once(TOKEN_SEP).unwrap_or((token, ""));
            query.push_str(&format!(
                "&NextPartitionKey={}&NextRowKey={}",
                urlencoding::encode(pk),
                urlencoding::encode(rk)
            ));
        }

        let url = self.url(&format!("{table}()"), &query);
        debug!(%table, %filter, page_size, "table query");
        let resp = self
            .client
            .get(&url)
            .header("Accept", "application/json;odata=nometadata")
            .send()
            .await
            .map_err(TableApiError::backend)?;

        if !resp.status().is_success() {
            return Err(Self::failure(resp, "query").await);
        }

        let token = match (
            resp.headers().get(CONTINUATION_PK_HEADER),
            resp.headers().get(CONTINUATION_RK_HEADER),
        ) {
            (Some(pk), rk) => {
                let pk = pk.to_str().unwrap_or_default();
                let rk = rk.and_then(|v| v.to_str().ok()).unwrap_or_default();
                (!pk.is_empty()).then(|| format!("{pk}{TOKEN_SEP}{rk}"))
            }
            _ => None,
        };

        #[derive(serde::Deserialize)]
        struct QueryResponse {
            value: Vec<FieldMap>,
        }
        let body: QueryResponse = resp.json().await.map_err(TableApiError::backend)?;

        Ok((body.value, token))
    }

    async fn point_get(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<FieldMap>, TableApiError> {
        let path = format!(
            "{}(PartitionKey='{}',RowKey='{}')",
            table,
            urlencoding::encode(&partition_key.replace('\'', "''")),
            urlencoding::encode(&row_key.replace('\'', "''"))
        );
        let resp = self
            .client
            .get(&self.url(&path, ""))
            .header("Accept", "application/json;odata=nometadata")
            .send()
            .await
            .map_err(TableApiError::backend)?;

        match resp.status() {
            StatusCode::NOT_FOUND => Err(TableApiError::NotFound),
            s if s.is_success() => {
                let entity: FieldMap = resp.json().await.map_err(TableApiError::backend)?;
                Ok(Some(entity))
            }
            _ => Err(Self::failure(resp, "point lookup").await),
        }
    }
}

/// Build a [`TableLogStore`] over the REST backend from a connection string
/// and table name. This is the main entry point for applications targeting
/// a real table service; both inputs are validated before any I/O and the
/// table is provisioned idempotently.
pub async fn connect_table_store(
    connection_string: &str,
    table: &str,
) -> Result<TableLogStore, StoreError> {
    let config = RestTableConfig::from_connection_string(connection_string)?;
    let client = Arc::new(RestTableClient::new(config));
    TableLogStore::connect(client, table).await
}

/// Environment-driven variant of [`connect_table_store`], reading endpoint,
/// SAS token and table name from `TABLELOG_*` variables.
pub async fn connect_table_store_from_env() -> Result<TableLogStore, StoreError> {
    let client = Arc::new(RestTableClient::new(RestTableConfig::from_env()));
    TableLogStore::connect(client, env_or(TABLELOG_TABLE_ENV, "logs")).await
}
