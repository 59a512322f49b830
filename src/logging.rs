//! Tracing subscriber setup.
//!
//! Events go to stderr (stdout is reserved for command output such as the
//! `check-board` report) or, when a log directory is configured, to a
//! daily-rolling file written through a non-blocking worker.

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{Builder, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, layer::Layered, layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSection};

const LOG_FILE_PREFIX: &str = "taskboard";

type BoxedLayer = Box<dyn Layer<Layered<EnvFilter, Registry>> + Send + Sync + 'static>;

/// Logging configuration options
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is unset
    pub filter: String,
    pub format: LogFormat,
    /// Raise the default filter to debug and show targets
    pub verbose: bool,
    /// Write rolling log files here instead of stderr
    pub dir: Option<PathBuf>,
    pub keep_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::from_section(&LoggingSection::default(), false)
    }
}

impl LoggingConfig {
    pub fn from_section(section: &LoggingSection, verbose: bool) -> Self {
        Self {
            filter: section.filter.clone(),
            format: section.format,
            verbose,
            dir: section.dir.clone(),
            keep_files: section.keep_files,
        }
    }
}

/// `RUST_LOG` wins; otherwise the configured filter, raised to debug by
/// `--verbose`.
pub fn build_filter(config: &LoggingConfig, rust_log: Option<&str>) -> Result<EnvFilter> {
    if let Some(directives) = rust_log.filter(|d| !d.trim().is_empty()) {
        return EnvFilter::try_new(directives)
            .with_context(|| format!("Invalid RUST_LOG '{}'", directives));
    }
    let directives = if config.verbose {
        "taskboard=debug,tower_http=debug".to_string()
    } else {
        config.filter.clone()
    };
    EnvFilter::try_new(&directives)
        .with_context(|| format!("Invalid log filter '{}'", directives))
}

/// Install the global subscriber. The returned guard must be held for the
/// life of the process when logging to a file, or buffered lines are lost.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let filter = build_filter(config, rust_log.as_deref())?;
    let registry = Registry::default().with(filter);

    let (layer, guard): (BoxedLayer, Option<WorkerGuard>) = match &config.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = Builder::new()
                .rotation(Rotation::DAILY)
                .filename_prefix(LOG_FILE_PREFIX)
                .filename_suffix("log")
                .max_log_files(config.keep_files.max(1))
                .build(dir)
                .context("Failed to create rolling log file")?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = match config.format {
                LogFormat::Json => fmt::layer().json().with_writer(writer).boxed(),
                LogFormat::Pretty => fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(writer)
                    .boxed(),
            };
            (layer, Some(guard))
        }
        None => {
            let layer = match config.format {
                LogFormat::Json => fmt::layer().json().with_writer(io::stderr).boxed(),
                LogFormat::Pretty => fmt::layer()
                    .with_target(config.verbose)
                    .with_writer(io::stderr)
                    .boxed(),
            };
            (layer, None)
        }
    };

    registry
        .with(layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_uses_info_filter() {
        let config = LoggingConfig::default();
        assert_eq!(config.filter, "taskboard=info");
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(config.dir.is_none());
        let filter = build_filter(&config, None).unwrap();
        assert!(filter.to_string().contains("taskboard=info"));
    }

    #[test]
    fn test_verbose_raises_filter() {
        let config = LoggingConfig {
            verbose: true,
            ..Default::default()
        };
        let filter = build_filter(&config, None).unwrap();
        assert!(filter.to_string().contains("taskboard=debug"));
    }

    #[test]
    fn test_rust_log_takes_precedence() {
        let config = LoggingConfig {
            verbose: true,
            ..Default::default()
        };
        let filter = build_filter(&config, Some("warn")).unwrap();
        assert_eq!(filter.to_string(), "warn");

        // Blank RUST_LOG falls through to the configured filter.
        let filter = build_filter(&config, Some("  ")).unwrap();
        assert!(filter.to_string().contains("taskboard=debug"));
    }

    #[test]
    fn test_invalid_filter_is_an_error() {
        let config = LoggingConfig {
            filter: "taskboard=loud".to_string(),
            ..Default::default()
        };
        assert!(build_filter(&config, None).is_err());
    }
}
