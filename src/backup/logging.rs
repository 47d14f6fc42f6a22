use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::EnvFilter;

static DEFAULT_FILTER: &str = "info";

fn open_log_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(Error::from)
        .with_msg(format!("Open log file failed: {:?}", path))
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Status lines go to stdout, and are also appended to `log_file` when given.
///
/// `RUST_LOG` overrides the default `info` level.
pub fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let (writer, ansi) = match log_file {
        None => (BoxMakeWriter::new(std::io::stdout), true),
        Some(path) => {
            let file = Mutex::new(open_log_file(path)?);
            (BoxMakeWriter::new(std::io::stdout.and(file)), false)
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(writer)
        .with_ansi(ansi)
        .init();
    Ok(())
}
