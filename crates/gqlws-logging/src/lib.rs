//! # gqlws-logging
//!
//! Process-wide `tracing` subscriber setup.
//!
//! - `RUST_LOG` takes precedence over the configured level
//! - Output is either human-readable (`pretty`) or one JSON object per line
//! - Initialisation is idempotent-safe: a second call reports an error
//!   instead of panicking

#![deny(unsafe_code)]

use gqlws_settings::{LogFormat, LoggingSettings};
use thiserror::Error;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The configured level is not a valid filter directive.
    #[error("invalid log filter '{directive}': {source}")]
    InvalidFilter {
        /// Directive that failed to parse.
        directive: String,
        /// Parser error.
        #[source]
        source: ParseError,
    },
    /// A global subscriber is already installed.
    #[error("logging already initialised: {0}")]
    AlreadyInitialized(String),
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Build the filter: `RUST_LOG` when set and valid, else the configured level.
pub fn build_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level).map_err(|source| LoggingError::InvalidFilter {
        directive: level.to_owned(),
        source,
    })
}

fn fmt_layer(format: LogFormat) -> BoxedLayer {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(true)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .boxed(),
    }
}

/// Install the global subscriber. Call once at startup.
pub fn init_logging(settings: &LoggingSettings) -> Result<(), LoggingError> {
    let filter = build_filter(&settings.level)?;
    tracing_subscriber::registry()
        .with(fmt_layer(settings.format).with_filter(filter))
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))
}
