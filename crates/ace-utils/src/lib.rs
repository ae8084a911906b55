//! Foundation types and helpers shared by every ACE workflow crate.

pub mod atomic_write;
pub mod canonical;
pub mod error;
pub mod exit_codes;
pub mod logging;
pub mod paths;
pub mod session_id;
pub mod types;

pub use error::{AceError, UserFriendlyError};
pub use exit_codes::ExitCode;
pub use types::{DocumentStatus, PhaseId, Verdict};
