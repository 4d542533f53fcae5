use std::path::Path;
use std::time::Duration;

use tracing::warn;

use crate::backup::restic::{environment, passthrough_args, repository_path};
use crate::cli::args::ResticArgs;
use crate::cli::commands::{known_remotes, open_registry, select_sessions};
use crate::config::load::load_config;
use crate::config::model::Session;
use crate::destination::classify;
use crate::error::Result;
use crate::mount::resolver::MountResolver;
use crate::mount::SystemMounter;
use crate::registry::registry_path;
use crate::signal_handler::{signal_handler, InterruptTracker};
use crate::types::RunMode;
use crate::util::command::{command_from_args, run_command};

/// Mounts each selected session's destination, runs `restic <args>` against
/// its repository and unmounts again.
pub fn run_restic(config_path: Option<&Path>, args: ResticArgs, run_mode: RunMode) -> Result<bool> {
    let cfg = load_config(config_path)?;
    let sessions: Vec<Session> = select_sessions(&cfg.sessions, args.target.as_deref())?
        .into_iter()
        .filter(|s| s.restic.enable)
        .collect();
    if sessions.is_empty() {
        println!("no session with restic enabled");
        return Ok(true);
    }

    let remotes = known_remotes(&cfg, run_mode);
    let mut registry = open_registry(&cfg.mount_base);
    let tracker = InterruptTracker::with_registry(registry_path(&cfg.mount_base));
    signal_handler(&tracker, run_mode);
    let mounter = SystemMounter::new(run_mode, Duration::from_secs(cfg.mount_timeout_secs));
    let resolver = MountResolver::new(&mounter, cfg.mount_base.clone());

    let mut ok = true;
    for session in &sessions {
        let kind = classify(&session.destination, &remotes);
        let destination = match resolver.resolve(&kind, &mut registry) {
            Ok(destination) => destination,
            Err(err) => {
                println!("{}: {}", session.name, err);
                ok = false;
                continue;
            }
        };
        if let Some(handle) = destination.handle().filter(|h| h.created_by_us) {
            tracker.track(&handle.mountpoint, handle.created_dir);
        }

        println!("== {} ==", session.name);
        let repo = repository_path(&session.restic, destination.path());
        let argv = passthrough_args(&session.restic, &repo, &args.args);
        let result = command_from_args(&argv).and_then(|mut cmd| {
            for (key, value) in environment(&session.restic) {
                cmd.env(key, value);
            }
            run_command(&mut cmd, run_mode)
        });
        match result {
            Ok(0) => {}
            Ok(code) => {
                println!("{}: restic exited with code {}", session.name, code);
                ok = false;
            }
            Err(err) => {
                println!("{}: {}", session.name, err);
                ok = false;
            }
        }

        if let Some(handle) = destination.handle() {
            match resolver.unmount(handle, &mut registry) {
                Ok(()) => tracker.untrack(&handle.mountpoint),
                Err(err) => {
                    warn!(mountpoint = %handle.mountpoint.display(), error = %err, "unmount failed");
                    ok = false;
                }
            }
        }
    }
    Ok(ok)
}
