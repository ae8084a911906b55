//! Shared state and helpers for CLI commands
//!
//! Every invocation reopens the session from disk: the journal supplies the
//! completed history and `drafts/` the open drafts.

use anyhow::{Context, Result};
use async_trait::async_trait;
use camino::Utf8PathBuf;
use std::sync::Arc;

use ace_engine::{DraftStore, WorkflowEngine};
use ace_llm::ReasoningCollaborator;
use ace_lock::SessionLock;
use ace_templates::TemplateStore;
use ace_utils::error::CollaboratorError;
use ace_utils::paths::session_root;

use crate::{AceError, Config, PhaseId};

/// What every command needs to find and open its session.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub session_id: String,
    pub session_dir: Utf8PathBuf,
    pub config: Config,
    /// Take over a stale session lock.
    pub force: bool,
}

impl CommandContext {
    #[must_use]
    pub fn new(session_id: String, config: Config, force: bool) -> Self {
        let session_dir = session_root(&session_id);
        Self {
            session_id,
            session_dir,
            config,
            force,
        }
    }

    /// Embedded templates, overridden from the configured directory.
    pub fn templates(&self) -> Result<Arc<TemplateStore>> {
        let store = TemplateStore::load(self.config.templates.dir.as_deref())
            .map_err(AceError::Template)?;
        Ok(Arc::new(store))
    }

    /// Exclusive lock on the session directory, held for one command.
    pub fn lock(&self) -> Result<SessionLock> {
        SessionLock::acquire(
            &self.session_dir,
            &self.session_id,
            self.force,
            Some(self.config.lock_ttl_seconds()),
        )
        .map_err(|e| AceError::from(e).into())
    }

    #[must_use]
    pub fn drafts(&self) -> DraftStore {
        DraftStore::new(&self.session_dir)
    }

    /// Replay the journal and reinstate the saved drafts.
    pub fn open_engine(
        &self,
        templates: Arc<TemplateStore>,
        collaborator: Arc<dyn ReasoningCollaborator>,
    ) -> Result<WorkflowEngine> {
        let engine = WorkflowEngine::open(
            &self.session_id,
            &self.session_dir,
            templates,
            collaborator,
            &self.config,
        )?;
        let drafts = self
            .drafts()
            .list()
            .with_context(|| format!("Failed to read drafts of session '{}'", self.session_id))?;
        for draft in drafts {
            engine.restore_draft(draft)?;
        }
        Ok(engine)
    }

    /// Engine for commands that never call the collaborator.
    pub fn open_offline(&self) -> Result<WorkflowEngine> {
        self.open_engine(self.templates()?, Arc::new(OfflineCollaborator))
    }

    /// Persist the engine's draft for `phase`, or delete the file once the
    /// phase has completed.
    pub fn save_draft(&self, engine: &WorkflowEngine, phase: PhaseId) -> Result<()> {
        let store = self.drafts();
        match engine.draft(phase) {
            Some(draft) => store
                .save(&draft)
                .with_context(|| format!("Failed to save {phase} draft")),
            None => store
                .remove(phase)
                .with_context(|| format!("Failed to remove {phase} draft")),
        }
    }
}

/// Stand-in collaborator for commands that only inspect or edit drafts.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineCollaborator;

#[async_trait]
impl ReasoningCollaborator for OfflineCollaborator {
    fn provider(&self) -> &str {
        "offline"
    }

    async fn render(&self, _prompt: &str) -> Result<String, CollaboratorError> {
        Err(CollaboratorError::Misconfiguration(
            "no collaborator is available for this command".to_string(),
        ))
    }
}

/// Next-step hint printed after a command changes the session.
pub fn print_next_phases(engine: &WorkflowEngine) {
    let state = engine.state();
    let next = state.legal_next();
    if next.is_empty() {
        println!("  Workflow complete.");
    } else {
        let names: Vec<&str> = next.iter().map(PhaseId::as_str).collect();
        println!("  Next: workflow start --template <{}>", names.join("|"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ace_utils::paths::with_isolated_home;

    #[test]
    fn test_context_places_session_under_home() {
        let home = with_isolated_home();
        let context = CommandContext::new("checkout".into(), Config::minimal_for_testing(), false);
        assert_eq!(context.session_dir, home.home().join("sessions").join("checkout"));
    }

    #[test]
    fn test_lock_is_exclusive_per_session() {
        let _home = with_isolated_home();
        let context = CommandContext::new("checkout".into(), Config::minimal_for_testing(), false);
        let held = context.lock().unwrap();
        let err = context.lock().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AceError>(),
            Some(AceError::SessionBusy { .. })
        ));
        drop(held);
        assert!(context.lock().is_ok());
    }

    #[tokio::test]
    async fn test_offline_collaborator_refuses() {
        let err = OfflineCollaborator.render("prompt").await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Misconfiguration(_)));
    }
}
