use std::path::PathBuf;

use anyhow::Context;
use bocad::daemon::{DaemonConfig, DaemonRuntime};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(author, version, about = "Mirror BOCA contests into a local directory")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
enum Command {
    /// Download statements and runs, for the whole mirror or the node at PATH
    Sync { path: Option<PathBuf> },
    /// Print the mirror with its badges
    Tree,
    /// Submit a solution file from a problem directory
    Submit { file: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = DaemonConfig::from_env()?;
    let daemon = DaemonRuntime::bootstrap(config).await?;

    match cli.command {
        Command::Sync { path } => {
            let report = daemon.sync(path.as_deref()).await?;
            info!(
                synchronized = report.synchronized.len(),
                skipped = report.skipped.len(),
                failed = report.failures.len(),
                "sync finished"
            );
            for (path, err) in &report.failures {
                warn!(path = %path.display(), error = %err, "not synchronized");
            }
            if !report.is_clean() {
                anyhow::bail!("{} node(s) failed to synchronize", report.failures.len());
            }
        }
        Command::Tree => print!("{}", daemon.render_tree().await),
        Command::Submit { file } => {
            let run = daemon
                .submit(&file)
                .await
                .context("submission rejected")?;
            println!("{run}");
        }
    }
    Ok(())
}
