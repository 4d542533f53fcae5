pub mod backup;
pub mod cli;
pub mod config;
pub mod destination;
pub mod error;
pub mod mask;
pub mod mount;
pub mod registry;
pub mod session;
pub mod signal_handler;
pub mod types;
pub mod util;

pub use error::{BareError, Result};
pub use session::{SessionOrchestrator, SessionOutcome, SessionResult, SessionState};
