use std::path::Path;
use std::time::Duration;

use chrono::Local;

use crate::backup::SystemExecutor;
use crate::cli::args::BackupArgs;
use crate::cli::commands::{known_remotes, open_registry, select_sessions};
use crate::config::load::{build_session, load_config};
use crate::config::model::{OneOrMany, ResticTarget, Session, SessionConfig};
use crate::error::{ConfigError, Result};
use crate::mask::{backend_for, MaskAdapter};
use crate::mount::resolver::MountResolver;
use crate::mount::SystemMounter;
use crate::registry::registry_path;
use crate::session::SessionOrchestrator;
use crate::signal_handler::{signal_handler, InterruptTracker};
use crate::types::RunMode;
use crate::util::host::local_hostname;
use crate::util::paths::home_dir;

pub const ADHOC_SESSION: &str = "cmdline";

pub fn run_backup_command(config_path: Option<&Path>, args: BackupArgs, run_mode: RunMode) -> Result<bool> {
    println!("{}", Local::now().format("%d-%m-%Y %H:%M"));

    let cfg = load_config(config_path)?;
    let local_host = local_hostname();
    let sessions = match &args.destination {
        Some(destination) => vec![adhoc_session(&args, destination, &local_host)?],
        None => select_sessions(&cfg.sessions, args.target.as_deref())?,
    };
    if sessions.is_empty() {
        return Err(ConfigError::Invalid(
            "no sessions configured; add one to session.yml or pass --destination".to_string(),
        )
        .into());
    }
    if run_mode.verbose {
        println!("running {} session(s)", sessions.len());
    }

    let remotes = known_remotes(&cfg, run_mode);
    let mut registry = open_registry(&cfg.mount_base);
    let tracker = InterruptTracker::with_registry(registry_path(&cfg.mount_base));
    signal_handler(&tracker, run_mode);

    let mounter = SystemMounter::new(run_mode, Duration::from_secs(cfg.mount_timeout_secs));
    let backend = backend_for(cfg.mask_backend, run_mode);
    let executor = SystemExecutor::new(run_mode, cfg.low_priority);
    let results = {
        let mut orchestrator = SessionOrchestrator::new(
            MountResolver::new(&mounter, cfg.mount_base.clone()),
            MaskAdapter::new(backend.as_ref()),
            &executor,
            &mut registry,
            local_host,
            remotes,
        )
        .with_tracker(tracker);
        orchestrator.run(&sessions)
    };

    println!();
    for result in &results {
        println!("{}", result.summary());
    }
    println!("{}", Local::now().format("%d-%m-%Y %H:%M"));
    Ok(results.iter().all(|r| r.succeeded()))
}

fn adhoc_session(args: &BackupArgs, destination: &str, local_host: &str) -> Result<Session> {
    let sources: Vec<String> = if args.source.is_empty() {
        vec![home_dir().to_string_lossy().to_string()]
    } else {
        args.source
            .iter()
            .map(|s| s.to_string_lossy().to_string())
            .collect()
    };
    let raw = SessionConfig {
        name: ADHOC_SESSION.to_string(),
        hostname: args.hostname.clone(),
        destination: Some(destination.to_string()),
        source: Some(OneOrMany::Many(sources)),
        mask: None,
        check_hostname: false,
        restic: ResticTarget {
            password: args.restic_password.clone(),
            ..ResticTarget::default()
        },
        rsync: Default::default(),
    };
    build_session(raw, local_host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn adhoc_session_defaults_to_home_and_local_host() {
        let args = BackupArgs {
            destination: Some("/mnt/backup".to_string()),
            restic_password: Some("pw".to_string()),
            ..BackupArgs::default()
        };
        let session = adhoc_session(&args, "/mnt/backup", "box").expect("session");
        assert_eq!(session.name, ADHOC_SESSION);
        assert_eq!(session.hostname, "box");
        assert_eq!(session.sources, vec![home_dir()]);
        assert_eq!(session.restic.password.as_deref(), Some("pw"));
        assert!(session.restic.enable);
        assert!(!session.rsync.enable);
    }

    #[test]
    fn adhoc_session_keeps_explicit_sources() {
        let args = BackupArgs {
            destination: Some("gdrive:bk".to_string()),
            source: vec![PathBuf::from("/etc"), PathBuf::from("/srv")],
            hostname: Some("other".to_string()),
            ..BackupArgs::default()
        };
        let session = adhoc_session(&args, "gdrive:bk", "box").expect("session");
        assert_eq!(session.hostname, "other");
        assert_eq!(session.sources.len(), 2);
    }
}
