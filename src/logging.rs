use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::error::{GripError, Result};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    clap::ValueEnum,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Directive used when `RUST_LOG` is not set
    pub fn to_filter(&self) -> String {
        format!("gripmeter={self}")
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    clap::ValueEnum,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, human oriented
    Pretty,
    /// One line per event
    #[default]
    Compact,
    /// Structured, one JSON object per event
    Json,
}

/// Install the global stderr subscriber; `RUST_LOG` overrides `level`
pub fn init_logging(level: LogLevel, format: LogFormat) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_filter()));

    let layer = match format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(false)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .map_err(|e| GripError::config(format!("logging already initialised: {e}")))?;

    tracing::debug!(%level, %format, "logging initialised");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_targets_this_crate() {
        assert_eq!(LogLevel::Debug.to_filter(), "gripmeter=debug");
        assert_eq!(LogLevel::default().to_filter(), "gripmeter=warn");
    }

    #[test]
    fn second_init_is_an_error() {
        // Either this call or one from another test installs the subscriber;
        // the next call must fail rather than panic.
        let _ = init_logging(LogLevel::Warn, LogFormat::Compact);
        assert!(init_logging(LogLevel::Warn, LogFormat::Json).is_err());
    }
}
