//! simstore-rebuild: replay every stored session payload into a fresh
//! database.
//!
//! ```text
//! simstore-rebuild --source sessions.db --target rebuilt.db [--overwrite]
//! ```
//!
//! Exits 0 on success and 1 on any failure. A failed run leaves `--target`
//! untouched.

use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use simstore_server::expand_tilde;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Rebuild normalized tables from raw session payloads")]
struct Cli {
  /// Database to read raw payloads from. Opened read-only.
  #[arg(long, default_value = "sessions.db")]
  source: PathBuf,

  /// Database to write. Must not exist unless `--overwrite` is given.
  #[arg(long, default_value = "sessions.db")]
  target: PathBuf,

  /// Replace `--target` if it already exists.
  #[arg(long)]
  overwrite: bool,
}

fn main() -> ExitCode {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let source = expand_tilde(&cli.source);
  let target = expand_tilde(&cli.target);

  match simstore_store_sqlite::rebuild(&source, &target, cli.overwrite) {
    Ok(report) => {
      println!(
        "rebuilt {} session(s) into {} ({} skipped)",
        report.processed,
        target.display(),
        report.skipped
      );
      ExitCode::SUCCESS
    }
    Err(e) => {
      tracing::error!(error = %e, "rebuild failed");
      ExitCode::FAILURE
    }
  }
}
