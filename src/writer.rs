use std::fmt;
use std::io::{self, Write};
use std::thread::{self, JoinHandle};

use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::mpsc;

use crate::level::Level;
use crate::logger::RecordLogger;

/// Longest line the drain buffers before emitting it without a terminator.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Write end of an in-process pipe whose lines become log records.
///
/// Bytes are handed to a background thread over a bounded channel. The
/// thread splits them on `\n` and emits one record per line at a fixed
/// level; when the channel closes, any unterminated tail is emitted as a
/// last record.
///
/// [`io::Write::write`] blocks while the channel is full. Inside a
/// multi-thread tokio runtime it blocks via `block_in_place`; on a
/// current-thread runtime it fails with [`io::ErrorKind::Unsupported`] and
/// [`write_async`](Self::write_async) must be used instead. Call
/// [`close`](Self::close) to wait until every line has been logged.
/// Dropping the writer closes the channel without waiting.
pub struct LogWriter {
    sender: Option<mpsc::Sender<Vec<u8>>>,
    drain: Option<JoinHandle<()>>,
}

impl LogWriter {
    pub(crate) fn spawn(logger: RecordLogger, level: Level) -> Self {
        let (tx, rx) = mpsc::channel::<Vec<u8>>(logger.writer_buffer());

        let spawned = thread::Builder::new()
            .name("log-writer-drain".to_string())
            .spawn(move || drain(&logger, level, rx));

        match spawned {
            Ok(handle) => LogWriter {
                sender: Some(tx),
                drain: Some(handle),
            },
            Err(e) => {
                eprintln!("failed to start log writer drain thread: {}", e);
                LogWriter {
                    sender: None,
                    drain: None,
                }
            }
        }
    }

    /// Async counterpart of [`io::Write::write_all`].
    pub async fn write_async(&mut self, buf: &[u8]) -> io::Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        let sender = self.sender.as_ref().ok_or_else(broken_pipe)?;
        sender.send(buf.to_vec()).await.map_err(|_| broken_pipe())
    }

    /// Close the pipe and wait for the drain to log every pending line.
    pub fn close(mut self) -> io::Result<()> {
        self.sender.take();
        match self.drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer drain thread panicked")),
            None => Ok(()),
        }
    }
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let sender = self.sender.as_ref().ok_or_else(broken_pipe)?;
        let chunk = buf.to_vec();
        let sent = match Handle::try_current() {
            Err(_) => sender.blocking_send(chunk),
            Ok(handle) => match handle.runtime_flavor() {
                RuntimeFlavor::MultiThread => {
                    tokio::task::block_in_place(|| sender.blocking_send(chunk))
                }
                // A current-thread runtime cannot park its only worker.
                _ => {
                    return Err(io::Error::new(
                        io::ErrorKind::Unsupported,
                        "blocking log writer used on a current-thread runtime; use write_async",
                    ))
                }
            },
        };
        sent.map_err(|_| broken_pipe())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        self.sender.take();
    }
}

impl fmt::Debug for LogWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogWriter")
            .field("open", &self.sender.is_some())
            .finish()
    }
}

fn broken_pipe() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "log writer is closed")
}

fn drain(logger: &RecordLogger, level: Level, mut rx: mpsc::Receiver<Vec<u8>>) {
    let mut pending: Vec<u8> = Vec::new();

    while let Some(chunk) = rx.blocking_recv() {
        pending.extend_from_slice(&chunk);

        let mut start = 0;
        while let Some(pos) = pending[start..].iter().position(|b| *b == b'\n') {
            emit_line(logger, level, &pending[start..start + pos]);
            start += pos + 1;
        }
        pending.drain(..start);

        while pending.len() >= MAX_LINE_BYTES {
            let cut = char_boundary(&pending[..MAX_LINE_BYTES]);
            emit_line(logger, level, &pending[..cut]);
            pending.drain(..cut);
        }
    }

    if !pending.is_empty() {
        emit_line(logger, level, &pending);
    }
}

/// Length of `bytes` without a trailing incomplete UTF-8 sequence.
fn char_boundary(bytes: &[u8]) -> usize {
    let len = bytes.len();
    for back in 1..=len.min(3) {
        let b = bytes[len - back];
        if b & 0xC0 == 0x80 {
            continue;
        }
        let width = match b {
            0xF0..=0xFF => 4,
            0xE0..=0xEF => 3,
            0xC0..=0xDF => 2,
            _ => 1,
        };
        if width > back && back < len {
            return len - back;
        }
        return len;
    }
    len
}

fn emit_line(logger: &RecordLogger, level: Level, line: &[u8]) {
    if !logger.enabled(level) {
        return;
    }
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let message = String::from_utf8_lossy(line).into_owned();
    logger.emit(level, message, Default::default());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Format;
    use crate::logger::Logger;
    use crate::sink::MemorySink;
    use std::sync::Arc;

    fn setup(threshold: Level) -> (RecordLogger, MemorySink) {
        let sink = MemorySink::new();
        let logger = RecordLogger::with_sink(Format::Json, threshold, Arc::new(sink.clone()));
        (logger, sink)
    }

    fn messages(sink: &MemorySink) -> Vec<String> {
        sink.json_records()
            .iter()
            .map(|r| r["message"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn terminated_line_becomes_one_error_record() {
        let (logger, sink) = setup(Level::Debug);
        let mut w = logger.writer();
        w.write_all(b"hello\n").unwrap();
        w.close().unwrap();

        let records = sink.json_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["level"], "error");
        assert_eq!(records[0]["message"], "hello");
    }

    #[test]
    fn unterminated_tail_is_flushed_on_close() {
        let (logger, sink) = setup(Level::Debug);
        let mut w = logger.writer();
        w.write_all(b"partial").unwrap();
        w.close().unwrap();
        assert_eq!(messages(&sink), vec!["partial"]);
    }

    #[test]
    fn lines_split_across_writes_are_reassembled() {
        let (logger, sink) = setup(Level::Debug);
        let mut w = logger.writer();
        w.write_all(b"first li").unwrap();
        w.write_all(b"ne\r\nsecond\n\nthi").unwrap();
        w.write_all(b"rd").unwrap();
        w.close().unwrap();
        assert_eq!(messages(&sink), vec!["first line", "second", "", "third"]);
    }

    #[test]
    fn long_lines_are_emitted_in_pieces() {
        let (logger, sink) = setup(Level::Debug);
        let mut w = logger.writer();
        w.write_all(&vec![b'x'; MAX_LINE_BYTES + 10]).unwrap();
        w.write_all(b"\n").unwrap();
        w.close().unwrap();

        let lens: Vec<usize> = messages(&sink).iter().map(String::len).collect();
        assert_eq!(lens, vec![MAX_LINE_BYTES, 10]);
    }

    #[test]
    fn long_lines_are_cut_on_char_boundaries() {
        let (logger, sink) = setup(Level::Debug);
        let text = format!("x{}", "é".repeat(40_000));
        let mut w = logger.writer();
        w.write_all(text.as_bytes()).unwrap();
        w.write_all(b"\n").unwrap();
        w.close().unwrap();

        let parts = messages(&sink);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].len(), MAX_LINE_BYTES - 1);
        assert!(parts.iter().all(|p| !p.contains('\u{FFFD}')));
        assert_eq!(parts.concat(), text);
    }

    #[test]
    fn char_boundary_steps_back_over_split_sequences() {
        assert_eq!(char_boundary(b"abc"), 3);
        assert_eq!(char_boundary("aé".as_bytes()), 3);
        assert_eq!(char_boundary(&"aé".as_bytes()[..2]), 1);
        assert_eq!(char_boundary(&"a€".as_bytes()[..3]), 1);
        assert_eq!(char_boundary(&"a😀".as_bytes()[..4]), 1);
        assert_eq!(char_boundary("a😀".as_bytes()), 5);
    }

    #[test]
    fn writer_respects_threshold() {
        let (logger, sink) = setup(Level::Fatal);
        let mut w = logger.writer();
        w.write_all(b"dropped\n").unwrap();
        w.close().unwrap();
        assert!(sink.is_empty());
    }

    #[test]
    fn writer_records_do_not_carry_handle_fields() {
        let (logger, sink) = setup(Level::Debug);
        let mut w = logger.field("component", "worker").writer();
        w.write_all(b"from pipe\n").unwrap();
        w.close().unwrap();
        assert!(sink.json_records()[0].get("component").is_none());
    }

    #[test]
    fn empty_writes_are_ignored() {
        let (logger, sink) = setup(Level::Debug);
        let mut w = logger.writer();
        assert_eq!(w.write(b"").unwrap(), 0);
        w.close().unwrap();
        assert!(sink.is_empty());
    }

    #[test]
    fn dropped_writer_still_flushes_eventually() {
        let (logger, sink) = setup(Level::Debug);
        {
            let mut w = logger.writer();
            w.write_all(b"bye").unwrap();
        }
        for _ in 0..200 {
            if !sink.is_empty() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert_eq!(messages(&sink), vec!["bye"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn blocking_write_inside_multi_thread_runtime() {
        let (logger, sink) = setup(Level::Debug);
        let mut w = logger.writer();
        w.write_all(b"hello\n").unwrap();
        w.close().unwrap();
        assert_eq!(messages(&sink), vec!["hello"]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn blocking_write_on_current_thread_runtime_is_an_error() {
        let (logger, sink) = setup(Level::Debug);
        let mut w = logger.writer();
        let err = w.write_all(b"hello\n").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);

        w.write_async(b"async instead\n").await.unwrap();
        w.close().unwrap();
        assert_eq!(messages(&sink), vec!["async instead"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn async_writes_reach_the_sink() {
        let (logger, sink) = setup(Level::Debug);
        let mut w = logger.writer();
        w.write_async(b"async one\nasync ").await.unwrap();
        w.write_async(b"two\n").await.unwrap();
        w.close().unwrap();
        assert_eq!(messages(&sink), vec!["async one", "async two"]);
    }
}
