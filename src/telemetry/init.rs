// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Subscriber setup.

use std::io;

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// How the process-wide `tracing` subscriber is built.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Level used when neither `RUST_LOG` nor `filter` is set.
    pub level: Level,

    /// Explicit filter directive. Takes precedence over `RUST_LOG`.
    pub filter: Option<String>,

    pub ansi: bool,

    /// Include file/line and span enter/close events.
    pub detailed: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            filter: None,
            ansi: true,
            detailed: false,
        }
    }
}

impl TelemetryConfig {
    /// Settings for the `conductor` binary, whose stdout carries results.
    /// Warnings only unless `verbose` or `RUST_LOG` asks for more.
    pub fn cli(verbose: bool) -> Self {
        Self {
            level: if verbose { Level::DEBUG } else { Level::WARN },
            ansi: false,
            detailed: verbose,
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    fn env_filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::new(self.level.to_string());
        match &self.filter {
            Some(directive) => EnvFilter::try_new(directive).unwrap_or_else(|_| fallback()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback()),
        }
    }
}

/// Returned by [`init_telemetry`]. On drop, logs the metrics report at
/// debug level so short CLI runs leave a record of what the core did.
pub struct TelemetryGuard {
    _private: (),
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        #[cfg(feature = "telemetry")]
        tracing::debug!(
            "{}",
            super::metrics::GLOBAL_METRICS.snapshot().format_report()
        );
    }
}

/// Install the global subscriber. Logs go to stderr.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_telemetry(config: &TelemetryConfig) -> io::Result<TelemetryGuard> {
    let span_events = if config.detailed {
        FmtSpan::ENTER | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(config.ansi)
        .with_file(config.detailed)
        .with_line_number(config.detailed)
        .with_span_events(span_events)
        .compact();

    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(layer)
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

    Ok(TelemetryGuard { _private: () })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_levels() {
        assert_eq!(TelemetryConfig::cli(false).level, Level::WARN);
        assert_eq!(TelemetryConfig::cli(true).level, Level::DEBUG);
        assert!(!TelemetryConfig::cli(true).ansi);
        assert!(TelemetryConfig::cli(true).detailed);
    }

    #[test]
    fn test_with_filter() {
        let config = TelemetryConfig::default().with_filter("conductor=trace");
        assert_eq!(config.filter.as_deref(), Some("conductor=trace"));
        assert_eq!(config.level, Level::INFO);
    }
}
