use crate::auth::{SharedKeyLite, request_date};
use crate::errors::StoreError;
use crate::filter::Filter;
use crate::metrics_defs::{REQUEST_DURATION, ROWS_RETURNED};
use crate::row::Row;
use crate::store::TableStore;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Method, Response};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::{Duration, Instant};
use url::Url;
use url::form_urlencoded::byte_serialize;

pub const API_VERSION: &str = "2019-02-02";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const NEXT_PARTITION_KEY: &str = "x-ms-continuation-NextPartitionKey";
const NEXT_ROW_KEY: &str = "x-ms-continuation-NextRowKey";

#[derive(Deserialize)]
struct QueryPage {
    value: Vec<Map<String, Value>>,
}

/// Continuation point returned by the service when a query has more pages.
struct Continuation {
    next_partition_key: String,
    next_row_key: Option<String>,
}

impl Continuation {
    fn from_response(response: &Response) -> Option<Self> {
        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(String::from)
        };

        Some(Continuation {
            next_partition_key: header(NEXT_PARTITION_KEY)?,
            next_row_key: header(NEXT_ROW_KEY),
        })
    }
}

/// Client for the Azure Table service REST API, authenticated with the
/// account's shared key.
#[derive(Clone)]
pub struct AzureTableStore {
    client: reqwest::Client,
    signer: SharedKeyLite,
    endpoint: Url,
}

impl AzureTableStore {
    /// `endpoint` overrides the public `https://<account>.table.core.windows.net`
    /// endpoint, e.g. for a local emulator.
    pub fn new(
        account_name: &str,
        account_key: &str,
        endpoint: Option<&Url>,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let endpoint = match endpoint {
            Some(url) => url.clone(),
            None => default_endpoint(account_name)?,
        };

        if endpoint.cannot_be_a_base() {
            return Err(StoreError::InvalidEndpoint(endpoint.to_string()));
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(AzureTableStore {
            client,
            signer: SharedKeyLite::new(account_name, account_key)?,
            endpoint,
        })
    }

    fn resource_url(&self, resource: &str) -> Url {
        let mut url = self.endpoint.clone();
        // Checked in new()
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(resource);
        }
        url
    }

    async fn send(
        &self,
        operation: &'static str,
        method: Method,
        url: Url,
        body: Option<&Row>,
        extra_headers: &[(&'static str, &'static str)],
    ) -> Result<Response, StoreError> {
        let date = request_date();
        let authorization = self.signer.authorization(&date, &url);

        let mut request = self
            .client
            .request(method, url)
            .header("x-ms-date", &date)
            .header("x-ms-version", API_VERSION)
            .header("DataServiceVersion", "3.0;NetFx")
            .header(ACCEPT, "application/json;odata=minimalmetadata")
            .header("Authorization", authorization);

        for (name, value) in extra_headers {
            request = request.header(*name, *value);
        }

        if let Some(row) = body {
            request = request
                .header(CONTENT_TYPE, "application/json")
                .body(serde_json::to_vec(row).map_err(|e| StoreError::Decode(e.to_string()))?);
        }

        let start = Instant::now();
        let result = request.send().await;
        let status = match &result {
            Ok(response) => response.status().as_str().to_string(),
            Err(_) => "error".to_string(),
        };
        shared::histogram!(REQUEST_DURATION, "operation" => operation, "status" => status)
            .record(start.elapsed().as_secs_f64());

        let response = result?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(operation, %status, body = %body, "table service request failed");
            return Err(StoreError::UnexpectedStatus { status, body });
        }

        tracing::debug!(operation, status = %response.status(), "table service request completed");
        Ok(response)
    }
}

pub fn default_endpoint(account_name: &str) -> Result<Url, StoreError> {
    Ok(Url::parse(&format!(
        "https://{account_name}.table.core.windows.net/"
    ))?)
}

/// `table(PartitionKey='..',RowKey='..')`, with key literals quoted the OData way.
fn entity_resource(table: &str, row: &Row) -> String {
    format!(
        "{table}(PartitionKey='{}',RowKey='{}')",
        row.partition_key().replace('\'', "''"),
        row.row_key().replace('\'', "''"),
    )
}

// The service does not decode `+` as a space, so encode spaces as %20.
fn encode_query_value(value: &str) -> String {
    byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

fn query_string(
    filter: Option<&Filter>,
    top: Option<usize>,
    continuation: Option<&Continuation>,
) -> Option<String> {
    let mut params = Vec::new();

    if let Some(filter) = filter {
        params.push(format!("$filter={}", encode_query_value(&filter.to_odata())));
    }
    if let Some(top) = top {
        params.push(format!("$top={top}"));
    }
    if let Some(c) = continuation {
        params.push(format!(
            "NextPartitionKey={}",
            encode_query_value(&c.next_partition_key)
        ));
        if let Some(row_key) = &c.next_row_key {
            params.push(format!("NextRowKey={}", encode_query_value(row_key)));
        }
    }

    if params.is_empty() {
        None
    } else {
        Some(params.join("&"))
    }
}

#[async_trait]
impl TableStore for AzureTableStore {
    async fn query(
        &self,
        table: &str,
        filter: Option<&Filter>,
        top: Option<usize>,
    ) -> Result<Vec<Row>, StoreError> {
        let mut rows = Vec::new();
        let mut continuation: Option<Continuation> = None;
        let mut pages = 0;

        loop {
            let remaining = top.map(|t| t.saturating_sub(rows.len()));
            let mut url = self.resource_url(&format!("{table}()"));
            url.set_query(query_string(filter, remaining, continuation.as_ref()).as_deref());

            let response = self.send("query", Method::GET, url, None, &[]).await?;
            continuation = Continuation::from_response(&response);
            let page = response.json::<QueryPage>().await?;
            pages += 1;

            for entity in page.value {
                rows.push(Row::try_from(entity)?);
            }

            let satisfied = top.is_some_and(|t| rows.len() >= t);
            if satisfied || continuation.is_none() {
                break;
            }
        }

        if let Some(t) = top {
            rows.truncate(t);
        }

        tracing::debug!(table, pages, rows = rows.len(), "query finished");
        shared::histogram!(ROWS_RETURNED).record(rows.len() as f64);
        Ok(rows)
    }

    async fn insert(&self, table: &str, row: &Row) -> Result<(), StoreError> {
        let url = self.resource_url(table);
        self.send(
            "insert",
            Method::POST,
            url,
            Some(row),
            &[("Prefer", "return-no-content")],
        )
        .await?;
        Ok(())
    }

    async fn update(&self, table: &str, row: &Row) -> Result<(), StoreError> {
        let url = self.resource_url(&entity_resource(table, row));
        self.send("update", Method::PUT, url, Some(row), &[("If-Match", "*")])
            .await?;
        Ok(())
    }
}
