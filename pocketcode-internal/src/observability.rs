use clap::ValueEnum;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Layer, Registry};

use crate::error::{Error, ErrorDetails};

const DEFAULT_LOG_FILTER: &str = "warn,gateway=info,pocketcode_internal=info";
const DEBUG_LOG_FILTER: &str = "warn,gateway=debug,pocketcode_internal=debug";

#[derive(Clone, Debug, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// Handle for raising the log level once the config file has been read.
///
/// Logging is set up before the config is loaded so that config errors are logged,
/// which means `gateway.debug` can only be applied afterwards.
pub struct DelayedDebugLogs {
    handle: reload::Handle<EnvFilter, Registry>,
}

impl DelayedDebugLogs {
    /// Switch our crates to debug level. An explicit `RUST_LOG` always wins.
    pub fn enable_debug(&self) -> Result<(), Error> {
        if std::env::var("RUST_LOG").is_ok() {
            tracing::info!("`RUST_LOG` is set, so `gateway.debug` does not change the log filter");
            return Ok(());
        }
        let filter = parse_filter(DEBUG_LOG_FILTER)?;
        self.handle.reload(filter).map_err(|e| {
            Error::new(ErrorDetails::Observability {
                message: format!("Failed to enable debug logs: {e}"),
            })
        })
    }
}

fn parse_filter(directives: &str) -> Result<EnvFilter, Error> {
    EnvFilter::try_new(directives).map_err(|e| {
        Error::new_without_logging(ErrorDetails::Config {
            message: format!("Invalid log filter `{directives}`: {e}"),
        })
    })
}

/// Builds the log filter from `RUST_LOG`, falling back to the gateway default.
pub fn build_env_filter() -> Result<EnvFilter, Error> {
    match std::env::var("RUST_LOG") {
        Ok(directives) => parse_filter(&directives),
        Err(_) => parse_filter(DEFAULT_LOG_FILTER),
    }
}

/// Installs the global `tracing` subscriber. Must be called once, before anything logs.
pub fn setup_observability(log_format: LogFormat) -> Result<DelayedDebugLogs, Error> {
    let (filter, handle) = reload::Layer::new(build_env_filter()?);
    let fmt_layer = match log_format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer().boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .boxed(),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| {
            Error::new_without_logging(ErrorDetails::Observability {
                message: format!("Failed to initialize tracing subscriber: {e}"),
            })
        })?;
    Ok(DelayedDebugLogs { handle })
}

/// Installs the Prometheus recorder backing every `metrics::counter!` in the crate.
pub fn setup_metrics() -> Result<PrometheusHandle, Error> {
    PrometheusBuilder::new().install_recorder().map_err(|e| {
        Error::new(ErrorDetails::Observability {
            message: format!("Failed to install Prometheus exporter: {e}"),
        })
    })
}
