use crate::errors::TriggerError;
use crate::metrics_defs::REQUEST_DURATION;
use crate::request::{RequestError, UpdateRequest};
use crate::resolver::resolve;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use shared::http::{make_json_response, make_text_response};
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use table_store::{AzureTableStore, StoreError, TableStore};
use url::Url;

pub const SENT_REQUEST: &str = "Sent request";

/// Opens a table store for the credentials carried by one request.
pub trait StoreFactory: Send + Sync {
    fn connect(
        &self,
        account_name: &str,
        account_key: &str,
    ) -> Result<Box<dyn TableStore>, StoreError>;
}

/// Builds a new Azure Table client per request.
pub struct AzureStoreFactory {
    endpoint: Option<Url>,
    timeout: Duration,
}

impl AzureStoreFactory {
    pub fn new(endpoint: Option<Url>, timeout: Duration) -> Self {
        AzureStoreFactory { endpoint, timeout }
    }
}

impl StoreFactory for AzureStoreFactory {
    fn connect(
        &self,
        account_name: &str,
        account_key: &str,
    ) -> Result<Box<dyn TableStore>, StoreError> {
        let store = AzureTableStore::new(
            account_name,
            account_key,
            self.endpoint.as_ref(),
            self.timeout,
        )?;
        Ok(Box::new(store))
    }
}

/// JSON body accepted by the trigger. Every field is optional at the decode
/// stage; presence is checked afterwards so a well-formed body with missing
/// fields gets a distinct error from an undecodable one.
#[derive(Deserialize, Debug)]
struct TriggerBody {
    account_name: Option<String>,
    account_key: Option<String>,
    table_name: Option<String>,
    partition_key: Option<String>,
    filter_name: Option<String>,
    filter_value: Option<String>,
    name1: Option<String>,
    value1: Option<String>,
    name2: Option<String>,
    value2: Option<String>,
    name3: Option<String>,
    value3: Option<String>,
    name4: Option<String>,
    value4: Option<String>,
    name5: Option<String>,
    value5: Option<String>,
}

/// A decoded body with every required field present.
struct Invocation {
    account_name: String,
    account_key: String,
    table_name: String,
    partition_key: String,
    request: UpdateRequest,
}

// Empty strings count as absent for the required fields.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl TryFrom<TriggerBody> for Invocation {
    type Error = RequestError;

    fn try_from(body: TriggerBody) -> Result<Self, Self::Error> {
        let required = [
            ("account_name", present(body.account_name)),
            ("account_key", present(body.account_key)),
            ("table_name", present(body.table_name)),
            ("partition_key", present(body.partition_key)),
            ("filter_name", present(body.filter_name)),
            ("filter_value", present(body.filter_value)),
            ("name1", present(body.name1)),
            ("value1", present(body.value1)),
        ];

        let missing: Vec<&'static str> = required
            .iter()
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(RequestError::MissingFields(missing));
        }

        let [
            account_name,
            account_key,
            table_name,
            partition_key,
            filter_name,
            filter_value,
            name1,
            value1,
        ] = required.map(|(_, value)| value.unwrap_or_default());

        let pairs = [
            (Some(name1), Some(value1)),
            (body.name2, body.value2),
            (body.name3, body.value3),
            (body.name4, body.value4),
            (body.name5, body.value5),
        ];

        Ok(Invocation {
            account_name,
            account_key,
            table_name,
            partition_key,
            request: UpdateRequest::from_optional_pairs(filter_name, filter_value, pairs)?,
        })
    }
}

#[derive(Serialize)]
struct ErrorBody {
    #[serde(rename = "Error")]
    error: String,
}

/// The upsert HTTP trigger. Any method and path is accepted; the request
/// body carries everything, credentials included.
#[derive(Clone)]
pub struct TriggerService {
    factory: Arc<dyn StoreFactory>,
}

impl TriggerService {
    pub fn new(factory: Arc<dyn StoreFactory>) -> Self {
        TriggerService { factory }
    }

    /// Handles one request body. Returns 200 once the upsert ran, 400 for
    /// bodies that cannot be used, and 500 when the table service fails.
    pub async fn handle_body(&self, body: &[u8]) -> Response<Bytes> {
        match self.upsert(body).await {
            Ok(()) => make_text_response(StatusCode::OK, SENT_REQUEST),
            Err(e) => {
                let status = e.status_code();
                if status.is_server_error() {
                    tracing::error!(error = %e, "upsert failed");
                } else {
                    tracing::warn!(error = %e, "rejected trigger request");
                }
                make_json_response(
                    status,
                    &ErrorBody {
                        error: e.to_string(),
                    },
                )
            }
        }
    }

    async fn upsert(&self, body: &[u8]) -> Result<(), TriggerError> {
        let body: TriggerBody = serde_json::from_slice(body)?;
        let invocation = Invocation::try_from(body)?;

        let store = self
            .factory
            .connect(&invocation.account_name, &invocation.account_key)?;

        let outcome = resolve(
            store.as_ref(),
            &invocation.table_name,
            &invocation.partition_key,
            &invocation.request,
        )
        .await?;

        tracing::info!(
            table = %invocation.table_name,
            outcome = outcome.as_str(),
            row_key = outcome.row().row_key(),
            "processed trigger request"
        );
        Ok(())
    }
}

impl Service<Request<Incoming>> for TriggerService {
    type Response = Response<BoxBody<Bytes, Infallible>>;
    type Error = Infallible;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let service = self.clone();

        Box::pin(async move {
            let start = Instant::now();
            tracing::debug!(method = %req.method(), path = %req.uri().path(), "received request");

            let response = match req.into_body().collect().await {
                Ok(collected) => service.handle_body(&collected.to_bytes()).await,
                Err(e) => {
                    let e = TriggerError::ReadBody(e.to_string());
                    tracing::warn!(error = %e, "rejected trigger request");
                    make_json_response(
                        e.status_code(),
                        &ErrorBody {
                            error: e.to_string(),
                        },
                    )
                }
            };

            shared::histogram!(REQUEST_DURATION, "status" => response.status().as_str().to_string())
                .record(start.elapsed().as_secs_f64());

            Ok(response.map(|body| Full::new(body).boxed()))
        })
    }
}
