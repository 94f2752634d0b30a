//! Subscriber construction.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::error::{TelemetryError, TelemetryResult};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Line format of log output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, human-oriented.
    Pretty,
    /// Single line per event.
    #[default]
    Compact,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(TelemetryError::ConfigError(format!(
                "unknown log format '{other}' (expected pretty, compact or json)"
            ))),
        }
    }
}

/// Where log output goes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LogTarget {
    /// Standard error only.
    #[default]
    Stderr,
    /// Daily-rolling files `<dir>/<prefix>.YYYY-MM-DD`.
    File {
        /// Directory for log files.
        dir: PathBuf,
        /// File name prefix.
        prefix: String,
    },
    /// Both standard error and rolling files.
    Both {
        /// Directory for log files.
        dir: PathBuf,
        /// File name prefix.
        prefix: String,
    },
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default level (`error`, `warn`, `info`, `debug`, `trace`).
    pub level: String,
    /// Output format.
    pub format: LogFormat,
    /// Output destination.
    pub target: LogTarget,
    /// Extra `EnvFilter` directives, e.g. `suite_agent=debug`.
    pub directives: Vec<String>,
}

impl LogConfig {
    /// Configuration at `level`, compact format, stderr.
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            format: LogFormat::default(),
            target: LogTarget::default(),
            directives: Vec::new(),
        }
    }

    /// Set the output format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the output destination.
    #[must_use]
    pub fn with_target(mut self, target: LogTarget) -> Self {
        self.target = target;
        self
    }

    /// Add a filter directive.
    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    /// Build the filter: `RUST_LOG` if set, else `level`, plus directives.
    fn filter(&self) -> TelemetryResult<EnvFilter> {
        let mut filter = match EnvFilter::try_from_default_env() {
            Ok(f) => f,
            Err(_) => EnvFilter::try_new(&self.level)
                .map_err(|e| TelemetryError::ConfigError(format!("invalid level: {e}")))?,
        };
        for directive in &self.directives {
            let parsed = directive.parse().map_err(|e| {
                TelemetryError::ConfigError(format!("invalid directive '{directive}': {e}"))
            })?;
            filter = filter.add_directive(parsed);
        }
        Ok(filter)
    }
}

/// Keeps the non-blocking file writer alive.
///
/// Dropping the guard flushes buffered file output.
#[must_use = "dropping the guard stops file logging"]
#[derive(Debug, Default)]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

fn fmt_layer<W>(format: LogFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(true);
    match format {
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

fn file_layer(
    format: LogFormat,
    dir: &PathBuf,
    prefix: &str,
) -> TelemetryResult<(BoxedLayer, WorkerGuard)> {
    std::fs::create_dir_all(dir)?;
    let appender = tracing_appender::rolling::daily(dir, prefix);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    Ok((fmt_layer(format, writer, false), guard))
}

/// Install the global subscriber described by `config`.
///
/// # Errors
///
/// Returns [`TelemetryError::ConfigError`] for invalid levels or directives,
/// [`TelemetryError::IoError`] if the log directory cannot be created, and
/// [`TelemetryError::InitError`] if a global subscriber is already set.
pub fn setup_logging(config: &LogConfig) -> TelemetryResult<LogGuard> {
    let filter = config.filter()?;
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut guard = LogGuard::default();

    match &config.target {
        LogTarget::Stderr => layers.push(fmt_layer(config.format, std::io::stderr, true)),
        LogTarget::File { dir, prefix } => {
            let (layer, g) = file_layer(config.format, dir, prefix)?;
            layers.push(layer);
            guard._file = Some(g);
        },
        LogTarget::Both { dir, prefix } => {
            layers.push(fmt_layer(config.format, std::io::stderr, true));
            let (layer, g) = file_layer(config.format, dir, prefix)?;
            layers.push(layer);
            guard._file = Some(g);
        },
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| TelemetryError::InitError(e.to_string()))?;

    Ok(guard)
}

/// Install an `info`-level compact stderr subscriber.
///
/// # Errors
///
/// See [`setup_logging`].
pub fn setup_default_logging() -> TelemetryResult<LogGuard> {
    setup_logging(&LogConfig::new("info"))
}
