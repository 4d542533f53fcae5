//! Per-session lifecycle: resolve the destination, mask sources, run the
//! enabled backup tools, and always tear down what was acquired.

pub mod orchestrator;
pub mod unwind;

use std::fmt;

use crate::error::{BareError, ToolError};
use crate::types::BackupTool;

pub use orchestrator::SessionOrchestrator;
pub use unwind::{Teardown, UnwindStack};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Pending,
    HostnameChecked,
    DestinationResolved,
    Masked,
    Executed,
    Unmasked,
    Unmounted,
    Done,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Pending => "pending",
            SessionState::HostnameChecked => "hostname-checked",
            SessionState::DestinationResolved => "destination-resolved",
            SessionState::Masked => "masked",
            SessionState::Executed => "executed",
            SessionState::Unmasked => "unmasked",
            SessionState::Unmounted => "unmounted",
            SessionState::Done => "done",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub enum SessionOutcome {
    Done,
    Skipped { reason: String },
    /// `state` is the last state the session reached before `error`.
    Failed { state: SessionState, error: BareError },
}

#[derive(Debug)]
pub struct TargetResult {
    pub tool: BackupTool,
    pub result: Result<(), ToolError>,
}

#[derive(Debug)]
pub struct SessionResult {
    pub name: String,
    pub outcome: SessionOutcome,
    pub targets: Vec<TargetResult>,
    pub teardown_errors: Vec<BareError>,
}

impl SessionResult {
    /// Skipped sessions count as successful.
    pub fn succeeded(&self) -> bool {
        !matches!(self.outcome, SessionOutcome::Failed { .. })
            && self.targets.iter().all(|t| t.result.is_ok())
            && self.teardown_errors.is_empty()
    }

    pub fn summary(&self) -> String {
        let mut line = match &self.outcome {
            SessionOutcome::Done => format!("{}: done", self.name),
            SessionOutcome::Skipped { reason } => format!("{}: skipped ({})", self.name, reason),
            SessionOutcome::Failed { state, error } => {
                format!("{}: failed after {}: {}", self.name, state, error)
            }
        };
        for target in &self.targets {
            match &target.result {
                Ok(()) => line.push_str(&format!(", {} ok", target.tool)),
                Err(err) => line.push_str(&format!(", {}", err)),
            }
        }
        if !self.teardown_errors.is_empty() {
            line.push_str(&format!(", {} teardown error(s)", self.teardown_errors.len()));
        }
        line
    }
}
