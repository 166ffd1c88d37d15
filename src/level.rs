use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Severity of a log record.
///
/// Variants are ordered by ascending verbosity: `Panic` is the most severe
/// and least verbose (0), `Debug` the most verbose (5). A logger configured
/// with threshold `t` emits a record at level `l` iff `l <= t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Level {
    /// Logs, then panics with the message.
    Panic = 0,
    /// Logs, then exits the process with status 1.
    Fatal = 1,
    Error = 2,
    Warn = 3,
    Info = 4,
    /// Very verbose; usually only enabled while debugging.
    Debug = 5,
}

impl Level {
    /// All levels, from most severe to most verbose.
    pub const ALL: [Level; 6] = [
        Level::Panic,
        Level::Fatal,
        Level::Error,
        Level::Warn,
        Level::Info,
        Level::Debug,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Level::Panic => "panic",
            Level::Fatal => "fatal",
            Level::Error => "error",
            Level::Warn => "warn",
            Level::Info => "info",
            Level::Debug => "debug",
        }
    }

    /// Whether a record at `self` passes a logger configured with `threshold`.
    pub fn enabled_at(self, threshold: Level) -> bool {
        self <= threshold
    }
}

/// Parse a textual level name.
///
/// Only the exact lowercase names `panic`, `fatal`, `error`, `warn` and
/// `info` are recognized. Everything else, including `debug` and the empty
/// string, yields [`Level::Debug`] so a bad setting never disables logging.
pub fn parse_level(name: &str) -> Level {
    match name {
        "panic" => Level::Panic,
        "fatal" => Level::Fatal,
        "error" => Level::Error,
        "warn" => Level::Warn,
        "info" => Level::Info,
        _ => Level::Debug,
    }
}

impl FromStr for Level {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(parse_level(s))
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::ERROR => Level::Error,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::INFO => Level::Info,
            _ => Level::Debug,
        }
    }
}
