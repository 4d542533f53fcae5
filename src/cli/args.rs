use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "bare", version, about = "Backup sessions to disks, remotes and local paths")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[arg(long, global = true)]
    pub dry_run: bool,
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Session file; defaults to ./session.yml then ~/.config/bare/session.yml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the configured sessions (default)
    Backup(BackupArgs),
    /// Unmount everything a previous run left mounted
    #[command(alias = "unmount")]
    Umount,
    /// Show the configured sessions
    List,
    /// Run restic against each session's repository
    Restic(ResticArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct BackupArgs {
    /// Only run the named session
    #[arg(long)]
    pub target: Option<String>,
    /// Run a one-off session to this destination instead of the configured ones
    #[arg(long)]
    pub destination: Option<String>,
    #[arg(long, requires = "destination")]
    pub source: Vec<PathBuf>,
    #[arg(long, requires = "destination")]
    pub hostname: Option<String>,
    #[arg(long, requires = "destination")]
    pub restic_password: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ResticArgs {
    #[arg(long)]
    pub target: Option<String>,
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}
