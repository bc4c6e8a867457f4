//! Tracing subscriber setup shared by the binaries.

use std::env::var;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{level_filters::LevelFilter, warn};
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{Layer, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable selecting the output format
pub const FORMAT_ENV: &str = "PROBER_LOG_FORMAT";

/// Log line layout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" | "" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format {other:?} (expected compact or json)")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Compact => "compact",
            Self::Json => "json",
        })
    }
}

/// Format from `PROBER_LOG_FORMAT`, falling back to `default`
pub fn format_from_env(default: LogFormat) -> LogFormat {
    match var(FORMAT_ENV) {
        Ok(value) => value.parse().unwrap_or_else(|error: String| {
            warn!("Ignoring {FORMAT_ENV}: {error}");
            default
        }),
        Err(_) => default,
    }
}

/// Compact output at INFO unless the environment says otherwise
pub fn init_from_env() -> Result<(), TryInitError> {
    init(format_from_env(LogFormat::Compact), LevelFilter::INFO)
}

/// Install the global subscriber. `RUST_LOG` directives take precedence
/// over `level`.
pub fn init(format: LogFormat, level: LevelFilter) -> Result<(), TryInitError> {
    let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

    let log_layer = match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(env_filter)
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .without_time()
            .with_writer(std::io::stderr)
            .with_filter(env_filter)
            .boxed(),
    };

    tracing_subscriber::registry().with(log_layer).try_init()
}
