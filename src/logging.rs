//! Structured logging setup: stderr output plus a rotating log file at the
//! OS-conventional user log directory.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::constants::{APP_NAME, LOG_FILENAME};

/// Verbosity requested on the command line. Mirrors the teacher's flag precedence:
/// `RUST_LOG` always wins if set, otherwise the most specific flag wins.
pub struct Verbosity {
    pub verbose: bool,
    pub quiet: bool,
    pub debug: bool,
}

impl Verbosity {
    fn level(&self) -> &'static str {
        if self.debug {
            "debug"
        } else if self.verbose {
            "info"
        } else if self.quiet {
            "error"
        } else {
            "warn"
        }
    }
}

fn user_log_dir() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_NAME)
        .join("logs")
}

/// Initialize the global tracing subscriber. Returns the file-appender guard; the
/// caller must keep it alive for the process lifetime or buffered log lines are lost.
pub fn init(verbosity: &Verbosity) -> anyhow::Result<WorkerGuard> {
    let log_dir = user_log_dir();
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILENAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(verbosity.level())
    };

    let stderr_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let file_layer = fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(non_blocking);

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}
