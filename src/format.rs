use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::str::FromStr;

use chrono::SecondsFormat;
use serde::Serialize;
use serde_json::Value;

use crate::record::LogRecord;

/// Keys every rendered line carries; user fields with these names are
/// moved under `fields.<key>`.
pub const TIMESTAMP_KEY: &str = "timestamp";
pub const LEVEL_KEY: &str = "level";
pub const MESSAGE_KEY: &str = "message";

const RESERVED_KEYS: [&str; 3] = [TIMESTAMP_KEY, LEVEL_KEY, MESSAGE_KEY];

/// Output encoding of a logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// Human-readable `key=value` line.
    Text,
    /// One JSON object per line.
    #[default]
    Json,
}

/// Error returned when parsing an unknown format name.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown log format {0:?} (expected \"text\" or \"json\")")]
pub struct ParseFormatError(pub String);

impl FromStr for Format {
    type Err = ParseFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Format::Text),
            "json" => Ok(Format::Json),
            _ => Err(ParseFormatError(s.to_string())),
        }
    }
}

impl Format {
    /// Render `record` as a single newline-terminated line.
    pub fn render(self, record: &LogRecord) -> Vec<u8> {
        let mut line = match self {
            Format::Text => render_text(record).into_bytes(),
            Format::Json => render_json(record),
        };
        line.push(b'\n');
        line
    }
}

fn timestamp(record: &LogRecord) -> String {
    record.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Field keys as they appear on the wire, with reserved names prefixed.
fn output_key(key: &str) -> Cow<'_, str> {
    if RESERVED_KEYS.contains(&key) {
        Cow::Owned(format!("fields.{key}"))
    } else {
        Cow::Borrowed(key)
    }
}

#[derive(Serialize)]
struct JsonLine<'a> {
    timestamp: String,
    level: &'static str,
    message: &'a str,
    #[serde(flatten)]
    fields: BTreeMap<Cow<'a, str>, &'a Value>,
}

fn render_json(record: &LogRecord) -> Vec<u8> {
    let line = JsonLine {
        timestamp: timestamp(record),
        level: record.level.as_str(),
        message: &record.message,
        fields: record
            .fields
            .iter()
            .map(|(k, v)| (output_key(k), v))
            .collect(),
    };
    // Every value is already a `serde_json::Value` and every key a string.
    serde_json::to_vec(&line).unwrap_or_else(|e| encode_failure(&e.to_string()))
}

fn encode_failure(detail: &str) -> Vec<u8> {
    serde_json::json!({
        LEVEL_KEY: "error",
        MESSAGE_KEY: format!("failed to encode log record: {detail}"),
    })
    .to_string()
    .into_bytes()
}

fn render_text(record: &LogRecord) -> String {
    let mut out = String::with_capacity(64 + record.message.len());
    push_pair(&mut out, TIMESTAMP_KEY, &timestamp(record));
    out.push(' ');
    push_pair(&mut out, LEVEL_KEY, record.level.as_str());
    out.push(' ');
    push_pair(&mut out, MESSAGE_KEY, &record.message);
    for (key, value) in &record.fields {
        out.push(' ');
        let text = match value {
            Value::String(s) => Cow::Borrowed(s.as_str()),
            other => Cow::Owned(other.to_string()),
        };
        push_pair(&mut out, &output_key(key), &text);
    }
    out
}

fn push_pair(out: &mut String, key: &str, value: &str) {
    out.push_str(key);
    out.push('=');
    if needs_quoting(value) {
        let _ = write!(out, "{value:?}");
    } else {
        out.push_str(value);
    }
}

fn needs_quoting(value: &str) -> bool {
    value.is_empty()
        || !value.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '/' | '@' | '^' | '+')
        })
}
