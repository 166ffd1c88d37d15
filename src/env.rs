//! Environment variable names read by
//! [`LoggerConfig::from_env`](crate::init::LoggerConfig::from_env).
//!
//! Loggers can always be built from an explicit
//! [`LoggerConfig`](crate::init::LoggerConfig) without touching the environment.

/// Threshold name, parsed with [`parse_level`](crate::level::parse_level).
pub const LOG_FACADE_LEVEL_ENV: &str = "LOG_FACADE_LEVEL";

/// Output format, `text` or `json`.
pub const LOG_FACADE_FORMAT_ENV: &str = "LOG_FACADE_FORMAT";

/// Capacity (in chunks) of the channel behind each stream writer.
pub const LOG_FACADE_WRITER_BUFFER_ENV: &str = "LOG_FACADE_WRITER_BUFFER";
