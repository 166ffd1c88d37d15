use std::io::Write;

use log_facade::init::init_from_env;
use log_facade::Logger;
use tracing::{error, info};

fn main() {
    // LOG_FACADE_FORMAT=text LOG_FACADE_LEVEL=info cargo run --example tracing_bridge
    let logger = match init_from_env() {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("logger setup failed: {e}");
            std::process::exit(2);
        }
    };

    info!("starting service");
    error!(user_id = 42, reason = "invalid password", "authentication failed");

    let request = logger.field("request_id", "r-17");
    request.info(format_args!("handled in {} ms", 12));

    let mut child_stderr = logger.writer();
    let _ = child_stderr.write_all(b"subprocess: warning line\nsubprocess: last line");
    let _ = child_stderr.close();
}
