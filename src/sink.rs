use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

/// Byte destination for rendered log lines.
///
/// Implementations receive one complete, newline-terminated line per call
/// and must append it atomically: concurrent callers may never observe
/// interleaved or partial lines.
pub trait LogSink: Send + Sync {
    /// Append a single rendered line.
    ///
    /// **Returns**
    /// - `Ok(())` if the line was written.
    /// - `Err(..)` if the destination failed. The logger counts the failure
    ///   and carries on; it never retries.
    fn write_line(&self, line: &[u8]) -> io::Result<()>;

    /// Flush any buffered output. Called before `fatal` exits and before
    /// `panic` unwinds.
    ///
    /// Default implementation is a no-op.
    fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Writes every line to the process's standard error stream.
#[derive(Clone, Copy, Debug, Default)]
pub struct StderrSink;

impl LogSink for StderrSink {
    fn write_line(&self, line: &[u8]) -> io::Result<()> {
        let mut stderr = io::stderr().lock();
        stderr.write_all(line)
    }

    fn flush(&self) -> io::Result<()> {
        io::stderr().lock().flush()
    }
}

/// Keeps every line in memory.
///
/// Useful for tests that need to assert on emitted records. Clones share
/// the same buffer.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Captured lines without their trailing newline.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Captured lines decoded as JSON; lines that are not JSON are skipped.
    pub fn json_records(&self) -> Vec<serde_json::Value> {
        self.lines()
            .iter()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl LogSink for MemorySink {
    fn write_line(&self, line: &[u8]) -> io::Result<()> {
        let decoded = String::from_utf8_lossy(line);
        let text = decoded.strip_suffix('\n').unwrap_or(&decoded).to_string();
        // A poisoned lock still holds whole lines; keep capturing.
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text);
        Ok(())
    }
}
