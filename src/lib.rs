pub mod level;
pub mod record;
pub mod format;
pub mod sink;
pub mod logger;
pub mod writer;
pub mod layer;

pub mod env;
pub mod init;

pub use level::{parse_level, Level};
pub use logger::{new, new_default, new_json, Logger, RecordLogger};
