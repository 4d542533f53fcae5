use std::path::Path;
use std::time::Duration;

use crate::config::load::load_config;
use crate::error::Result;
use crate::mount::SystemMounter;
use crate::registry::{registry_path, remove_leftover_dirs, reverse_all, CleanupRegistry, ReversalAction};
use crate::types::RunMode;

pub fn run_umount(config_path: Option<&Path>, run_mode: RunMode) -> Result<bool> {
    let cfg = load_config(config_path)?;
    let mounter = SystemMounter::new(run_mode, Duration::from_secs(cfg.mount_timeout_secs));
    let mut registry = CleanupRegistry::open_or_reset(&registry_path(&cfg.mount_base));

    let outcomes = reverse_all(&mounter, &mut registry, &cfg.mount_base);
    if outcomes.is_empty() {
        println!("no bare mounts found under {}", cfg.mount_base.display());
    }
    for outcome in &outcomes {
        let source = outcome
            .source
            .as_deref()
            .map(|s| format!(" ({})", s))
            .unwrap_or_default();
        match &outcome.result {
            Ok(ReversalAction::Unmounted) => {
                println!("unmounted {}{}", outcome.mountpoint.display(), source)
            }
            Ok(ReversalAction::AlreadyUnmounted) => {
                println!("already unmounted {}{}", outcome.mountpoint.display(), source)
            }
            Err(err) => println!("failed {}{}: {}", outcome.mountpoint.display(), source, err),
        }
    }
    for dir in remove_leftover_dirs(&mounter, &cfg.mount_base) {
        println!("removed {}", dir.display());
    }
    Ok(outcomes.iter().all(|o| o.succeeded()))
}
