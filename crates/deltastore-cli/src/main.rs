use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use deltastore_storage::{delete_backup, VfsDriver};

#[derive(Parser)]
#[command(name = "deltastore", version, about = "Delta block backup store CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Remove a backup from the backup store
    Rm(RmArgs),
}

#[derive(Args)]
struct RmArgs {
    /// Backup URL, e.g. vfs:///srv/backups?backup=<name>&volume=<name>
    backup_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    VfsDriver::register()?;

    let cli = Cli::parse();
    match cli.command {
        Command::Rm(args) => {
            if args.backup_url.is_empty() {
                bail!("required backup URL is missing");
            }
            delete_backup(&args.backup_url)
                .await
                .context("failed to remove backup")?;
        }
    }
    Ok(())
}
