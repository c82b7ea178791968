mod app;
mod cache;
mod config;
mod gesture;
mod http;
mod logging;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "clubnath-edge")]
#[command(about = "Offline cache router and pull-to-refresh controller for the ClubNath client")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/clubnath/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Log to stderr instead of the rolling log file
  #[arg(long)]
  log_stderr: bool,

  #[command(subcommand)]
  command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
  /// Install and activate the configured cache generation
  Install,
  /// Route one request through the worker
  Fetch {
    /// Absolute URL or path relative to the configured origin
    target: String,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
  },
  /// Show which cache stores hold an entry for a request
  Lookup {
    /// Absolute URL or path relative to the configured origin
    target: String,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
  },
  /// List cache stores and their entry counts
  Stores,
  /// Post a client message, e.g. '{"type":"SKIP_WAITING"}'
  Message { json: String },
  /// Replay a recorded touch trace against the pull-to-refresh controller
  Replay { trace: PathBuf },
}

impl From<Cmd> for app::Command {
  fn from(cmd: Cmd) -> Self {
    match cmd {
      Cmd::Install => app::Command::Install,
      Cmd::Fetch { target, method } => app::Command::Fetch { target, method },
      Cmd::Lookup { target, method } => app::Command::Lookup { target, method },
      Cmd::Stores => app::Command::Stores,
      Cmd::Message { json } => app::Command::Message { json },
      Cmd::Replay { trace } => app::Command::Replay { trace },
    }
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  logging::init(args.log_stderr)?;

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  app::run(config, args.command.into()).await
}
