mod completion;
mod dispatch;
#[cfg(windows)]
mod host;
mod logging;
mod render;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::completion::CliCompletionShell;

#[derive(Parser, Debug)]
#[command(name = "rdplauncher")]
#[command(about = "Installs and manages the RDP launcher Windows service", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML file with configuration defaults; environment variables override it
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Commands {
    /// Apply registry settings and register the service
    Install,
    /// Stop and delete the service, then restore the registry
    #[command(alias = "uninstall")]
    Remove,
    Start,
    Stop,
    Status,
    /// Print the saved registry backup
    ShowBackups,
    /// Re-apply the saved registry originals without uninstalling
    RestoreBackups,
    /// Service host entry point used by the service control manager
    #[command(hide = true)]
    Run,
    /// Print a shell completion script
    Completions {
        #[arg(value_enum)]
        shell: CliCompletionShell,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Remove => "remove",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Status => "status",
            Self::ShowBackups => "show-backups",
            Self::RestoreBackups => "restore-backups",
            Self::Run => "run",
            Self::Completions { .. } => "completions",
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    dispatch::run_cli(cli)
}
