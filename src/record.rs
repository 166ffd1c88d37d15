use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::level::Level;

/// A single normalized log entry, ready to be rendered by a
/// [`Format`](crate::format::Format).
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub message: String,
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl LogRecord {
    /// Build a record stamped with the current time.
    pub fn now(
        level: Level,
        message: String,
        fields: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        LogRecord {
            timestamp: Utc::now(),
            level,
            message,
            fields,
        }
    }
}
