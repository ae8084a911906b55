//! ace-workflow - the ACE method as a checked, resumable workflow
//!
//! The ACE method splits a piece of work into five phases: START, ANALYZE,
//! CREATE (repeatable), EVALUATE and COMMIT. Each phase is driven by a
//! template with user-input slots, AI instructions and an expected output
//! structure. This crate binds inputs to those templates, checks that every
//! cross-phase reference points at completed work, renders the prompt for a
//! reasoning collaborator and records each completed phase in an
//! append-only session journal.
//!
//! It can be used in two ways:
//! - **CLI**: the `workflow` binary (`workflow start`, `fill`, `validate`,
//!   `render`, `status`, `show`, `templates`)
//! - **Library**: drive a [`WorkflowEngine`] directly
//!
//! # Quick Start (CLI)
//!
//! ```bash
//! workflow start --template start --audience "product owner"
//! workflow fill start "Project Name=Checkout" "Problem Statement=Carts are abandoned"
//! workflow validate start
//! workflow render start --dry-run
//! workflow render start
//! workflow status --json
//! ```
//!
//! # Quick Start (Library)
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ace_workflow::{PhaseId, TemplateStore, WorkflowEngine, from_config, Config};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = Config::minimal_for_testing();
//! let templates = Arc::new(TemplateStore::embedded()?);
//! let engine = WorkflowEngine::builder("demo", templates, from_config(&config)?).build();
//!
//! engine.begin(PhaseId::Start, Some("executives".to_string()))?;
//! engine.fill(
//!     PhaseId::Start,
//!     [
//!         ("Project Name".to_string(), "Checkout".to_string()),
//!         ("Problem Statement".to_string(), "Carts are abandoned".to_string()),
//!     ]
//!     .into(),
//!     None,
//! )?;
//! engine.validate(PhaseId::Start)?;
//! let document = engine.complete(PhaseId::Start, None, None).await?;
//! println!("{}", document.id());
//! # Ok(())
//! # }
//! ```
//!
//! # JSON Contracts
//!
//! Journal records and `--json` output are emitted in JCS (RFC 8785)
//! canonical form; use [`emit_jcs`] for your own integrations.

pub mod cli;

pub use ace_config::{CliArgs, Config, ConfigBuilder, ConfigSource};
pub use ace_engine::{
    Draft, DraftStore, Journal, JournalRecord, RenderedPrompt, SessionStatus, TransitionGuard,
    WorkflowEngine, WorkflowEngineBuilder, WorkflowSession, WorkflowState,
};
pub use ace_llm::{ReasoningCollaborator, from_config};
pub use ace_phase_api::{DocumentId, PhaseDocument, PhaseOutput, Reference};
pub use ace_templates::{Template, TemplateStore};
pub use ace_utils::canonical::emit_jcs;
pub use ace_utils::error::{AceError, UserFriendlyError};
pub use ace_utils::exit_codes::ExitCode;
pub use ace_utils::types::{DocumentStatus, PhaseId, Verdict};
