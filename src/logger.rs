use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::format::Format;
use crate::init::LoggerConfig;
use crate::level::Level;
use crate::record::LogRecord;
use crate::sink::{LogSink, StderrSink};
use crate::writer::LogWriter;

/// Structured logging facade.
///
/// Callers depend on this trait rather than on a concrete engine. Messages
/// are passed as [`fmt::Arguments`], so call sites read
/// `log.info(format_args!("user {} logged in", id))`.
pub trait Logger: Send + Sync {
    fn debug(&self, args: fmt::Arguments<'_>);
    fn info(&self, args: fmt::Arguments<'_>);
    fn warn(&self, args: fmt::Arguments<'_>);
    fn error(&self, args: fmt::Arguments<'_>);

    /// Log regardless of the threshold, then exit the process with status 1.
    fn fatal(&self, args: fmt::Arguments<'_>) -> !;

    /// Log regardless of the threshold, then panic with the message.
    fn panic(&self, args: fmt::Arguments<'_>) -> !;

    /// Derive a handle that also carries `key = value`. The receiver is not
    /// modified.
    fn with_field(&self, key: &str, value: Value) -> Box<dyn Logger>;

    /// Byte sink whose lines are logged at [`Level::Error`]. The caller owns
    /// the returned writer and should [`close`](LogWriter::close) it.
    fn writer(&self) -> LogWriter;
}

/// Plain-text logger on standard error at the given threshold.
pub fn new(level: Level) -> Box<dyn Logger> {
    Box::new(RecordLogger::with_sink(Format::Text, level, Arc::new(StderrSink)))
}

/// JSON logger on standard error at the given threshold.
pub fn new_json(level: Level) -> Box<dyn Logger> {
    Box::new(RecordLogger::with_sink(Format::Json, level, Arc::new(StderrSink)))
}

/// JSON logger on standard error that emits everything.
pub fn new_default() -> Box<dyn Logger> {
    new_json(Level::Debug)
}

/// State shared by a logger and every handle derived from it.
struct Engine {
    threshold: Level,
    format: Format,
    sink: Arc<dyn LogSink>,
    writer_buffer: usize,
    failed_writes: AtomicU64,
}

/// [`Logger`] that renders [`LogRecord`]s and appends them to a [`LogSink`].
///
/// Cloning is cheap; clones and derived handles share the threshold, the
/// format and the sink, and differ only in their fields.
#[derive(Clone)]
pub struct RecordLogger {
    engine: Arc<Engine>,
    fields: Arc<BTreeMap<String, Value>>,
}

impl RecordLogger {
    /// Construct a logger writing to an arbitrary sink.
    ///
    /// **Parameters**
    /// - `format`: line encoding.
    /// - `threshold`: most verbose level still emitted.
    /// - `sink`: destination shared by every derived handle.
    pub fn with_sink(format: Format, threshold: Level, sink: Arc<dyn LogSink>) -> Self {
        Self::build(format, threshold, sink, LoggerConfig::default().writer_buffer)
    }

    /// Construct a standard-error logger from a [`LoggerConfig`].
    pub fn from_config(config: &LoggerConfig) -> Self {
        Self::build(
            config.format,
            config.level,
            Arc::new(StderrSink),
            config.writer_buffer,
        )
    }

    /// Like [`from_config`](Self::from_config) but with a custom sink.
    pub fn from_config_with_sink(config: &LoggerConfig, sink: Arc<dyn LogSink>) -> Self {
        Self::build(config.format, config.level, sink, config.writer_buffer)
    }

    fn build(format: Format, threshold: Level, sink: Arc<dyn LogSink>, writer_buffer: usize) -> Self {
        RecordLogger {
            engine: Arc::new(Engine {
                threshold,
                format,
                sink,
                writer_buffer: writer_buffer.max(1),
                failed_writes: AtomicU64::new(0),
            }),
            fields: Arc::new(BTreeMap::new()),
        }
    }

    /// Typed counterpart of [`Logger::with_field`].
    pub fn field(&self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut fields = (*self.fields).clone();
        fields.insert(key.into(), value.into());
        RecordLogger {
            engine: Arc::clone(&self.engine),
            fields: Arc::new(fields),
        }
    }

    pub fn level(&self) -> Level {
        self.engine.threshold
    }

    pub fn format(&self) -> Format {
        self.engine.format
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    pub fn enabled(&self, level: Level) -> bool {
        level.enabled_at(self.engine.threshold)
    }

    /// Number of lines the sink refused so far, across all derived handles.
    pub fn failed_writes(&self) -> u64 {
        self.engine.failed_writes.load(Ordering::Relaxed)
    }

    pub(crate) fn writer_buffer(&self) -> usize {
        self.engine.writer_buffer
    }

    /// Handle with the same engine and no fields.
    pub(crate) fn without_fields(&self) -> Self {
        RecordLogger {
            engine: Arc::clone(&self.engine),
            fields: Arc::new(BTreeMap::new()),
        }
    }

    fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        if self.enabled(level) {
            self.emit(level, render_message(args), BTreeMap::new());
        }
    }

    /// Render and write one record unconditionally. `extra` is merged over
    /// the handle's own fields.
    pub(crate) fn emit(&self, level: Level, message: String, extra: BTreeMap<String, Value>) {
        let fields = if extra.is_empty() {
            (*self.fields).clone()
        } else {
            let mut fields = (*self.fields).clone();
            fields.extend(extra);
            fields
        };
        let record = LogRecord::now(level, message, fields);
        let line = self.engine.format.render(&record);
        if self.engine.sink.write_line(&line).is_err() {
            self.engine.failed_writes.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn emit_final(&self, level: Level, args: fmt::Arguments<'_>) -> String {
        let message = render_message(args);
        self.emit(level, message.clone(), BTreeMap::new());
        if self.engine.sink.flush().is_err() {
            self.engine.failed_writes.fetch_add(1, Ordering::Relaxed);
        }
        message
    }
}

impl fmt::Debug for RecordLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordLogger")
            .field("threshold", &self.engine.threshold)
            .field("format", &self.engine.format)
            .field("fields", &self.fields)
            .finish()
    }
}

impl Logger for RecordLogger {
    fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args);
    }

    fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Info, args);
    }

    fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Warn, args);
    }

    fn error(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Error, args);
    }

    fn fatal(&self, args: fmt::Arguments<'_>) -> ! {
        self.emit_final(Level::Fatal, args);
        std::process::exit(1)
    }

    fn panic(&self, args: fmt::Arguments<'_>) -> ! {
        let message = self.emit_final(Level::Panic, args);
        panic!("{message}")
    }

    fn with_field(&self, key: &str, value: Value) -> Box<dyn Logger> {
        Box::new(self.field(key, value))
    }

    fn writer(&self) -> LogWriter {
        LogWriter::spawn(self.without_fields(), Level::Error)
    }
}

/// Best-effort rendering: a failing `Display`/`Debug` impl keeps whatever
/// was written before the failure.
fn render_message(args: fmt::Arguments<'_>) -> String {
    if let Some(s) = args.as_str() {
        return s.to_string();
    }
    let mut message = String::new();
    if fmt::write(&mut message, args).is_err() {
        message.push_str("<format error>");
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use std::io;
    use std::panic::AssertUnwindSafe;

    fn memory_logger(threshold: Level) -> (RecordLogger, MemorySink) {
        let sink = MemorySink::new();
        let logger = RecordLogger::with_sink(Format::Json, threshold, Arc::new(sink.clone()));
        (logger, sink)
    }

    struct Broken;

    impl fmt::Display for Broken {
        fn fmt(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
            Err(fmt::Error)
        }
    }

    struct FailingSink;

    impl LogSink for FailingSink {
        fn write_line(&self, _line: &[u8]) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }
    }

    #[test]
    fn threshold_filters_verbose_levels() {
        let (logger, sink) = memory_logger(Level::Warn);
        logger.debug(format_args!("d"));
        logger.info(format_args!("i"));
        logger.warn(format_args!("w"));
        logger.error(format_args!("e"));

        let levels: Vec<_> = sink
            .json_records()
            .iter()
            .map(|r| r["level"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(levels, vec!["warn", "error"]);
    }

    #[test]
    fn message_is_formatted_from_arguments() {
        let (logger, sink) = memory_logger(Level::Debug);
        logger.info(format_args!("user {} has {} items", "bob", 3));
        assert_eq!(sink.json_records()[0]["message"], "user bob has 3 items");
    }

    #[test]
    fn failing_display_degrades_instead_of_panicking() {
        let (logger, sink) = memory_logger(Level::Debug);
        logger.info(format_args!("value: {}", Broken));
        assert_eq!(sink.json_records()[0]["message"], "value: <format error>");
    }

    #[test]
    fn field_derivation_does_not_touch_parent() {
        let (parent, sink) = memory_logger(Level::Debug);
        let child = parent.field("k", "v");
        parent.info(format_args!("parent"));
        child.info(format_args!("child"));

        let records = sink.json_records();
        assert!(records[0].get("k").is_none());
        assert_eq!(records[1]["k"], "v");
        assert!(parent.fields().is_empty());
    }

    #[test]
    fn last_write_wins_for_a_key() {
        let (logger, sink) = memory_logger(Level::Debug);
        logger.field("k", "1").field("k", "2").info(format_args!("x"));
        assert_eq!(sink.json_records()[0]["k"], "2");
    }

    #[test]
    fn trait_object_with_field_keeps_engine() {
        let (logger, sink) = memory_logger(Level::Info);
        let boxed: Box<dyn Logger> = Box::new(logger);
        let child = boxed.with_field("request_id", Value::from(7));
        child.debug(format_args!("hidden"));
        child.info(format_args!("shown"));

        let records = sink.json_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["request_id"], 7);
    }

    #[test]
    fn sink_failures_are_counted() {
        let logger = RecordLogger::with_sink(Format::Text, Level::Debug, Arc::new(FailingSink));
        let child = logger.field("a", 1);
        logger.info(format_args!("one"));
        child.error(format_args!("two"));
        assert_eq!(logger.failed_writes(), 2);
    }

    #[test]
    fn panic_logs_before_unwinding() {
        let (logger, sink) = memory_logger(Level::Panic);
        let logger = logger.field("component", "db");
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            Logger::panic(&logger, format_args!("invariant {} broken", 42));
        }));

        let payload = result.unwrap_err();
        assert_eq!(
            payload.downcast_ref::<String>().map(String::as_str),
            Some("invariant 42 broken")
        );
        let records = sink.json_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["level"], "panic");
        assert_eq!(records[0]["component"], "db");
    }

    #[test]
    fn config_drives_construction() {
        let config = LoggerConfig {
            level: Level::Error,
            format: Format::Text,
            writer_buffer: 0,
        };
        let logger = RecordLogger::from_config_with_sink(&config, Arc::new(MemorySink::new()));
        assert_eq!(logger.level(), Level::Error);
        assert_eq!(logger.format(), Format::Text);
        assert_eq!(logger.writer_buffer(), 1);
        assert!(logger.enabled(Level::Fatal));
        assert!(!logger.enabled(Level::Warn));
    }
}
