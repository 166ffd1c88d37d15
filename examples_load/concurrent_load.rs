use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use log_facade::format::Format;
use log_facade::sink::MemorySink;
use log_facade::{Level, Logger, RecordLogger};

fn main() {
    let sink = MemorySink::new();
    let logger = RecordLogger::with_sink(Format::Json, Level::Info, Arc::new(sink.clone()));

    let threads: u64 = 8;
    let per_thread: u64 = 10_000;
    let start = Instant::now();

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let logger = logger.field("thread", t);
            thread::spawn(move || {
                for i in 0..per_thread {
                    logger.info(format_args!("iteration {i}"));
                }
            })
        })
        .collect();
    for handle in handles {
        let _ = handle.join();
    }

    let mut pipe = logger.writer();
    for i in 0..per_thread {
        let _ = writeln!(pipe, "piped line {i}");
    }
    let _ = pipe.close();

    let n = threads * per_thread + per_thread;
    let elapsed = start.elapsed();
    println!(
        "emitted {} records ({} captured) in {:?} (~{:.0} rec/s)",
        n,
        sink.len(),
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );
}
