use std::path::PathBuf;

use tracing::{error, info, warn};

use crate::backup::{enabled_targets, BackupExecutor, ToolRequest};
use crate::config::model::Session;
use crate::destination::classify;
use crate::error::{BareError, ConfigError, MaskError};
use crate::mask::{validate_masks, MaskAdapter};
use crate::mount::resolver::MountResolver;
use crate::registry::CleanupRegistry;
use crate::session::unwind::{Teardown, UnwindStack};
use crate::session::{SessionOutcome, SessionResult, SessionState, TargetResult};
use crate::signal_handler::InterruptTracker;
use crate::types::MaskBackendKind;

pub struct SessionOrchestrator<'a> {
    resolver: MountResolver<'a>,
    masks: MaskAdapter<'a>,
    executor: &'a dyn BackupExecutor,
    registry: &'a mut CleanupRegistry,
    tracker: Option<InterruptTracker>,
    local_host: String,
    remotes: Vec<String>,
}

enum Progress {
    Finished,
    Skipped(String),
}

impl<'a> SessionOrchestrator<'a> {
    pub fn new(
        resolver: MountResolver<'a>,
        masks: MaskAdapter<'a>,
        executor: &'a dyn BackupExecutor,
        registry: &'a mut CleanupRegistry,
        local_host: impl Into<String>,
        remotes: Vec<String>,
    ) -> Self {
        Self {
            resolver,
            masks,
            executor,
            registry,
            tracker: None,
            local_host: local_host.into(),
            remotes,
        }
    }

    pub fn with_tracker(mut self, tracker: InterruptTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Runs every session in order. A failing session never stops the ones
    /// after it.
    pub fn run(&mut self, sessions: &[Session]) -> Vec<SessionResult> {
        sessions.iter().map(|s| self.run_session(s)).collect()
    }

    pub fn run_session(&mut self, session: &Session) -> SessionResult {
        let mut state = SessionState::Pending;
        let mut stack = UnwindStack::new();
        let mut targets = Vec::new();

        let progress = self.drive(session, &mut state, &mut stack, &mut targets);
        let teardown_errors = self.unwind(&mut stack, &mut state);

        let outcome = match progress {
            Ok(Progress::Finished) => {
                state = SessionState::Done;
                SessionOutcome::Done
            }
            Ok(Progress::Skipped(reason)) => SessionOutcome::Skipped { reason },
            Err(err) => {
                error!(session = %session.name, state = %state, error = %err, "session failed");
                SessionOutcome::Failed { state, error: err }
            }
        };
        info!(session = %session.name, state = %state, "session finished");

        SessionResult {
            name: session.name.clone(),
            outcome,
            targets,
            teardown_errors,
        }
    }

    fn drive(
        &mut self,
        session: &Session,
        state: &mut SessionState,
        stack: &mut UnwindStack,
        targets: &mut Vec<TargetResult>,
    ) -> Result<Progress, BareError> {
        if session.sources.is_empty() {
            return Err(ConfigError::Invalid(format!("session {}: no sources", session.name)).into());
        }
        validate_masks(&session.sources, &session.masks)?;

        if session.check_hostname && session.hostname != self.local_host {
            let reason = format!(
                "hostname {} does not match this host ({})",
                session.hostname, self.local_host
            );
            info!(session = %session.name, "{}", reason);
            return Ok(Progress::Skipped(reason));
        }
        *state = SessionState::HostnameChecked;

        let kind = classify(&session.destination, &self.remotes);
        info!(session = %session.name, destination = %session.destination, kind = kind.describe(), "resolving destination");
        let destination = self.resolver.resolve(&kind, self.registry)?;
        if let Some(handle) = destination.handle() {
            if handle.created_by_us {
                if let Some(tracker) = &self.tracker {
                    tracker.track(&handle.mountpoint, handle.created_dir);
                }
            }
            stack.push(Teardown::Unmount(handle.clone()));
        }
        *state = SessionState::DestinationResolved;

        let mask_set = self.masks.apply_masks(&session.sources, &session.masks)?;
        if let Some(tracker) = &self.tracker {
            for binding in mask_set.bindings() {
                if binding.backend == MaskBackendKind::Native {
                    tracker.track_created(&binding.mask, &binding.created);
                }
            }
        }
        let sources: Vec<PathBuf> = mask_set.effective_sources();
        let prefix = mask_set.command_prefix().to_vec();
        stack.push(Teardown::Unmask(mask_set));
        *state = SessionState::Masked;

        let request = ToolRequest {
            session: &session.name,
            hostname: &session.hostname,
            sources: &sources,
            destination: destination.path(),
            prefix: &prefix,
        };
        let enabled = enabled_targets(session);
        if enabled.is_empty() {
            warn!(session = %session.name, "no backup target enabled");
        }
        for options in enabled {
            let tool = options.tool();
            info!(session = %session.name, tool = %tool, "running backup");
            let result = self.executor.run_tool(options, &request);
            match &result {
                Ok(()) => info!(session = %session.name, tool = %tool, "backup finished"),
                Err(err) => error!(session = %session.name, tool = %tool, error = %err, "backup failed"),
            }
            targets.push(TargetResult { tool, result });
        }
        *state = SessionState::Executed;
        Ok(Progress::Finished)
    }

    /// Runs every pending teardown, newest first. Failures are logged and
    /// collected; the remaining steps still run.
    fn unwind(&mut self, stack: &mut UnwindStack, state: &mut SessionState) -> Vec<BareError> {
        let reached_execution = *state == SessionState::Executed;
        let mut errors = Vec::new();
        while let Some(step) = stack.pop() {
            match step {
                Teardown::Unmask(mut set) => {
                    let masks: Vec<PathBuf> = set.bindings().iter().map(|b| b.mask.clone()).collect();
                    let failed = self.masks.remove_masks(&mut set);
                    if let Some(tracker) = &self.tracker {
                        for mask in &masks {
                            if !failed.iter().any(|e| mask_error_path(e) == Some(mask)) {
                                tracker.untrack(mask);
                            }
                        }
                    }
                    errors.extend(failed.into_iter().map(BareError::from));
                    if reached_execution {
                        *state = SessionState::Unmasked;
                    }
                }
                Teardown::Unmount(handle) => match self.resolver.unmount(&handle, self.registry) {
                    Ok(()) => {
                        if let Some(tracker) = &self.tracker {
                            tracker.untrack(&handle.mountpoint);
                        }
                        if reached_execution {
                            *state = SessionState::Unmounted;
                        }
                    }
                    Err(err) => {
                        warn!(mountpoint = %handle.mountpoint.display(), error = %err, "unmount failed; run `bare umount` later");
                        errors.push(err.into());
                    }
                },
            }
        }
        errors
    }
}

fn mask_error_path(err: &MaskError) -> Option<&PathBuf> {
    match err {
        MaskError::BindFailed { mask, .. } | MaskError::UnbindFailed { mask, .. } => Some(mask),
        MaskError::BackendUnavailable { .. } => None,
    }
}
