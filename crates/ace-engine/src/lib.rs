//! ACE workflow engine
//!
//! Ties the phase templates, the reasoning collaborator and the session
//! history together:
//!
//! - [`session`]: completed documents and the state machine derived from them
//! - [`validator`]: cross-phase reference checks
//! - [`audience`]: prompt assembly
//! - [`workflow`]: the [`WorkflowEngine`] façade and its transition guard
//! - [`journal`] and [`drafts`]: what survives between processes

pub mod audience;
pub mod drafts;
pub mod journal;
pub mod session;
pub mod validator;
pub mod workflow;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use audience::RenderedPrompt;
pub use drafts::{Draft, DraftStore};
pub use journal::{Journal, JournalRecord};
pub use session::{Supersession, WorkflowSession, WorkflowState};
pub use workflow::{
    DocumentSummary, DraftSummary, SessionStatus, TransitionGuard, WorkflowEngine,
    WorkflowEngineBuilder,
};
