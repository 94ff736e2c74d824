//! Telemetry for the Schema Drift Agent
//!
//! Prometheus collectors plus the tracing setup used by the binary.

pub mod metrics;

pub use metrics::DriftMetrics;

use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogFormat;

/// Telemetry errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Subscriber error: {0}")]
    Subscriber(String),
}

pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Install the global tracing subscriber.
///
/// Filter comes from `RUST_LOG`, defaulting to `info`. Logs go to stderr so
/// CLI output on stdout stays machine-readable.
pub fn init_tracing(format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    }
    .map_err(|e| TelemetryError::Subscriber(e.to_string()))
}
