use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "clubnath_edge=info";

/// Initialize tracing. Filter comes from RUST_LOG, defaulting to info for
/// this crate.
///
/// Logs go to a daily rolling file under the data directory unless
/// `to_stderr` is set or no data directory can be found.
pub fn init(to_stderr: bool) -> Result<()> {
  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

  let log_dir = if to_stderr { None } else { log_dir() };

  match log_dir {
    Some(dir) => {
      std::fs::create_dir_all(&dir)
        .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

      // Synchronous writes; the CLI is short-lived and must not lose lines on exit
      let file_appender = tracing_appender::rolling::daily(&dir, "clubnath-edge.log");

      tracing_subscriber::registry()
        .with(
          fmt::layer()
            .with_writer(file_appender)
            .with_ansi(false)
            .with_file(true)
            .with_line_number(true),
        )
        .with(filter)
        .try_init()
        .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

      tracing::debug!(path = %dir.display(), "Logging to file");
    }
    None => {
      tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .with(filter)
        .try_init()
        .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;
    }
  }

  Ok(())
}

fn log_dir() -> Option<PathBuf> {
  dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .map(|p| p.join("clubnath").join("logs"))
}
