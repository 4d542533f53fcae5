pub mod backup;
pub mod list;
pub mod restic;
pub mod umount;

use std::path::Path;

use tracing::warn;

use crate::config::model::{RuntimeConfig, Session};
use crate::destination::normalize_remote_name;
use crate::error::{BareError, ConfigError, Result};
use crate::mount::list_remotes;
use crate::registry::{registry_path, CleanupRegistry};
use crate::types::RunMode;

pub fn exit_for_error(err: &BareError) -> ! {
    let code = match err {
        BareError::Config(_) => 2,
        BareError::Mount(_) => 14,
        BareError::Mask(_) => 15,
        _ => 1,
    };
    println!("{}", err);
    std::process::exit(code);
}

/// Configured remotes plus, when enabled, whatever rclone reports.
pub fn known_remotes(cfg: &RuntimeConfig, run_mode: RunMode) -> Vec<String> {
    let mut remotes: Vec<String> = cfg
        .remotes
        .iter()
        .map(|r| normalize_remote_name(r).to_string())
        .collect();
    if cfg.discover_remotes {
        match list_remotes(run_mode) {
            Ok(found) => {
                for name in found {
                    if !remotes.contains(&name) {
                        remotes.push(name);
                    }
                }
            }
            Err(err) => warn!(error = %err, "could not list rclone remotes"),
        }
    }
    remotes
}

pub fn select_sessions(sessions: &[Session], target: Option<&str>) -> Result<Vec<Session>> {
    let Some(name) = target else {
        return Ok(sessions.to_vec());
    };
    let selected: Vec<Session> = sessions.iter().filter(|s| s.name == name).cloned().collect();
    if selected.is_empty() {
        return Err(ConfigError::Invalid(format!("session not found: {}", name)).into());
    }
    Ok(selected)
}

/// Opens the persisted registry, reporting mounts an earlier run never
/// released. An unreadable ledger is moved aside rather than blocking the run.
pub fn open_registry(mount_base: &Path) -> CleanupRegistry {
    let registry = CleanupRegistry::open_or_reset(&registry_path(mount_base));
    for stale in registry.list_active() {
        println!(
            "stale mount from an earlier run: {} ({}); run `bare umount` to release it",
            stale.mountpoint.display(),
            stale.source
        );
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load::parse_config;

    #[test]
    fn target_selects_one_session() {
        let cfg = parse_config(
            "discover_remotes: false\nremotes: ['gdrive:']\nsessions:\n  - {name: a, destination: /x, source: /y}\n  - {name: b, destination: /x, source: /y}\n",
            "h",
        )
        .expect("parse");
        let selected = select_sessions(&cfg.sessions, Some("b")).expect("select");
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].name, "b");
        assert!(matches!(
            select_sessions(&cfg.sessions, Some("zzz")),
            Err(BareError::Config(_))
        ));
        assert_eq!(select_sessions(&cfg.sessions, None).expect("all").len(), 2);
        assert_eq!(known_remotes(&cfg, RunMode::default()), vec!["gdrive"]);
    }

    #[test]
    fn corrupt_registry_does_not_block_commands() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = registry_path(dir.path());
        std::fs::write(&path, "mounts: {{{").expect("write");
        let registry = open_registry(dir.path());
        assert!(registry.is_empty());
        assert!(path.with_extension("yaml.bad").exists());
    }
}
