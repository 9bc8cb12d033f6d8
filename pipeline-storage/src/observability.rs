use crate::config::{LoggingConfig, MetricsConfig};
use metrics_exporter_statsd::StatsdBuilder;
use shared::metrics_defs::describe_all;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const METRICS_PREFIX: &str = "pipeline_storage";

#[derive(thiserror::Error, Debug)]
pub enum ObservabilityError {
    #[error("could not set up statsd exporter: {0}")]
    Statsd(String),
    #[error("a metrics recorder is already installed")]
    RecorderAlreadySet,
    #[error("invalid sentry DSN: {0}")]
    InvalidSentryDsn(#[from] sentry::types::ParseDsnError),
}

/// Installs the global tracing subscriber. Logs go to stderr so command
/// output on stdout stays clean. With a sentry DSN configured, sentry is
/// initialised and receives error events; the returned guard flushes it on
/// drop and must be held for the life of the process.
pub fn init_logging(
    logging: Option<&LoggingConfig>,
) -> Result<Option<sentry::ClientInitGuard>, ObservabilityError> {
    let guard = match logging {
        Some(config) => {
            let dsn: sentry::types::Dsn = config.sentry_dsn.parse()?;
            Some(sentry::init(sentry::ClientOptions {
                dsn: Some(dsn),
                release: sentry::release_name!(),
                environment: config.environment.clone().map(Into::into),
                ..Default::default()
            }))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(guard.as_ref().map(|_| sentry::integrations::tracing::layer()))
        .init();

    Ok(guard)
}

/// Sends every metric defined by the workspace to statsd.
pub fn init_metrics(config: &MetricsConfig) -> Result<(), ObservabilityError> {
    let recorder = StatsdBuilder::from(config.statsd_host.clone(), config.statsd_port)
        .build(Some(METRICS_PREFIX))
        .map_err(|e| ObservabilityError::Statsd(e.to_string()))?;

    metrics::set_global_recorder(recorder).map_err(|_| ObservabilityError::RecorderAlreadySet)?;

    describe_all(upsert::metrics_defs::ALL_METRICS);
    describe_all(table_store::metrics_defs::ALL_METRICS);

    tracing::info!(
        host = %config.statsd_host,
        port = config.statsd_port,
        "metrics exported to statsd"
    );
    Ok(())
}
