//! Logging configuration for the service binary.

use clap::{ArgAction, Parser, ValueEnum};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Full format with timestamp, level, target, and spans.
    #[default]
    Full,
    /// Compact format with minimal metadata.
    Compact,
    /// JSON format for structured logging.
    Json,
}

/// Logging arguments.
///
/// Verbosity: `-v` (INFO), `-vv` (DEBUG), `-vvv` (TRACE). Default is WARN.
/// `RUST_LOG` overrides the verbosity flag when set.
#[derive(Debug, Clone, Default, Parser)]
pub struct LogArgs {
    /// Increase logging verbosity (-v, -vv, -vvv).
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbosity: u8,

    /// Log output format (full, compact, json).
    #[arg(long = "log-format", env = "GAS_LOG_FORMAT", default_value = "full", global = true)]
    pub format: LogFormat,
}

impl LogArgs {
    /// Converts verbosity to a [`LevelFilter`].
    pub const fn log_level_filter(&self) -> LevelFilter {
        match self.verbosity {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }

    /// Installs the global tracing subscriber.
    pub fn init_tracing(&self) -> eyre::Result<()> {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.log_level_filter().to_string()));

        let builder = tracing_subscriber::fmt().with_env_filter(filter);
        let result = match self.format {
            LogFormat::Full => builder.try_init(),
            LogFormat::Compact => builder.compact().try_init(),
            LogFormat::Json => builder.json().try_init(),
        };
        result.map_err(|err| eyre::eyre!("failed to initialize tracing: {err}"))
    }
}
