use crate::env::{LOG_FACADE_FORMAT_ENV, LOG_FACADE_LEVEL_ENV, LOG_FACADE_WRITER_BUFFER_ENV};
use crate::format::{Format, ParseFormatError};
use crate::layer::FacadeLayer;
use crate::level::{parse_level, Level};
use crate::logger::RecordLogger;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Logger configuration.
///
/// **Fields**
/// - `level`: most verbose level still emitted.
/// - `format`: line encoding written to standard error.
/// - `writer_buffer`: capacity, in chunks, of the channel behind each
///   [`LogWriter`](crate::writer::LogWriter); writes block once it is full.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggerConfig {
    pub level: Level,
    pub format: Format,
    pub writer_buffer: usize,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: Level::Debug,
            format: Format::Json,
            writer_buffer: 16,
        }
    }
}

impl LoggerConfig {
    /// Build a configuration from the `LOG_FACADE_*` environment variables.
    ///
    /// An unknown level name falls back to `debug` and an unparsable buffer
    /// size to the default; an unknown format is an error.
    pub fn from_env() -> Result<Self, ParseFormatError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ParseFormatError> {
        let defaults = Self::default();
        let level = lookup(LOG_FACADE_LEVEL_ENV)
            .map(|name| parse_level(&name))
            .unwrap_or(defaults.level);
        let format = match lookup(LOG_FACADE_FORMAT_ENV) {
            Some(name) => name.parse()?,
            None => defaults.format,
        };
        let writer_buffer = lookup(LOG_FACADE_WRITER_BUFFER_ENV)
            .and_then(|raw| raw.trim().parse().ok())
            .unwrap_or(defaults.writer_buffer);

        Ok(Self {
            level,
            format,
            writer_buffer,
        })
    }
}

/// Error returned by the initialization helpers.
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("invalid LOG_FACADE_FORMAT: {0}")]
    Format(#[from] ParseFormatError),

    #[error("a global tracing subscriber is already installed")]
    AlreadyInstalled(#[from] SetGlobalDefaultError),
}

/// Install `logger` as the global `tracing` subscriber.
///
/// **Effects**
///
/// A [`Registry`] combined with [`FacadeLayer`] becomes the process-wide
/// default, so every `tracing` event is rendered by `logger`.
pub fn init_tracing(logger: &RecordLogger) -> Result<(), InitError> {
    let subscriber = Registry::default().with(FacadeLayer::new(logger.clone()));
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Build a standard-error logger from the environment and install it with
/// [`init_tracing`].
///
/// This is the recommended entrypoint for binaries.
pub fn init_from_env() -> Result<RecordLogger, InitError> {
    let config = LoggerConfig::from_env()?;
    let logger = RecordLogger::from_config(&config);
    init_tracing(&logger)?;
    Ok(logger)
}
