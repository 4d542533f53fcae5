use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::args::{BackupArgs, Cli, Command};
use crate::cli::commands::{backup, exit_for_error, list, restic, umount};
use crate::config::load::locate_config;
use crate::types::RunMode;

const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod args;
pub mod commands;

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let run_mode = RunMode {
        dry_run: cli.dry_run,
        verbose: cli.verbose,
    };
    let config_path = locate_config(cli.config.as_deref());
    if run_mode.verbose {
        match &config_path {
            Some(path) => println!("bare {} using {}", VERSION, path.display()),
            None => println!("bare {} (no session file found)", VERSION),
        }
    }

    let command = cli
        .command
        .clone()
        .unwrap_or_else(|| Command::Backup(BackupArgs::default()));
    let ok = match command {
        Command::Backup(args) => {
            backup::run_backup_command(config_path.as_deref(), args, run_mode)
        }
        Command::Umount => umount::run_umount(config_path.as_deref(), run_mode),
        Command::List => list::run_list(config_path.as_deref()).map(|()| true),
        Command::Restic(args) => restic::run_restic(config_path.as_deref(), args, run_mode),
    }
    .unwrap_or_else(|err| exit_for_error(&err));

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
