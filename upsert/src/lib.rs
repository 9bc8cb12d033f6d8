//! Upsert of pipeline rows: the resolver that decides between an in-place
//! update and an insert, and the HTTP trigger that exposes it.

pub mod config;
pub mod errors;
pub mod metrics_defs;
pub mod request;
pub mod resolver;
pub mod trigger;

pub use errors::{TriggerError, UpsertError};
pub use request::{FieldUpdate, MAX_FIELDS, RequestError, UpdateRequest};
pub use resolver::{UpsertOutcome, resolve};

use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::sync::Arc;
use trigger::{AzureStoreFactory, TriggerService};

/// Serves the trigger and the admin probes until either listener fails.
pub async fn run(config: config::Config) -> Result<(), UpsertError> {
    config.validate()?;

    let factory = AzureStoreFactory::new(config.table_endpoint.clone(), config.request_timeout());
    let trigger_service = TriggerService::new(Arc::new(factory));

    let trigger_task = run_http_service::<_, _, UpsertError>(
        &config.listener.host,
        config.listener.port,
        trigger_service,
    );
    // Nothing to warm up: every request opens its own store handle.
    let admin_task = run_http_service::<_, _, UpsertError>(
        &config.admin_listener.host,
        config.admin_listener.port,
        AdminService::new(|| true),
    );

    tokio::try_join!(trigger_task, admin_task)?;
    Ok(())
}
