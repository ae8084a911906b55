//! Workflow engine façade.
//!
//! [`WorkflowEngine`] owns one session: its completed history, its open
//! drafts, the shared template store and the reasoning collaborator. Every
//! mutating call takes the session's [`TransitionGuard`] first, so two
//! transitions on the same session never interleave; the loser gets
//! `SessionBusy` instead of waiting.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ace_engine::WorkflowEngine;
//! use ace_llm::ScriptedCollaborator;
//! use ace_templates::TemplateStore;
//! use ace_utils::types::PhaseId;
//!
//! # async fn demo() -> Result<(), ace_utils::AceError> {
//! let templates = Arc::new(TemplateStore::embedded()?);
//! let collaborator = Arc::new(ScriptedCollaborator::new("## Problem Summary\n..."));
//! let engine = WorkflowEngine::builder("demo", templates, collaborator).build();
//!
//! let inputs = [
//!     ("Project Name".to_string(), "Checkout".to_string()),
//!     ("Problem Statement".to_string(), "Carts are abandoned".to_string()),
//! ]
//! .into_iter()
//! .collect();
//! let start = engine.run_phase(PhaseId::Start, inputs, None).await?;
//! assert_eq!(start.phase(), PhaseId::Start);
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use camino::Utf8Path;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::Instrument;

use ace_config::{Config, DEFAULT_AUDIENCE, DEFAULT_COLLABORATOR_TIMEOUT_SECS};
use ace_llm::ReasoningCollaborator;
use ace_phase_api::{DocumentId, PhaseDocument, PhaseOutput};
use ace_templates::{ResolveContext, Template, TemplateStore, materialize_references, resolve};
use ace_utils::error::{AceError, CollaboratorError, WorkflowError};
use ace_utils::logging::{log_collaborator_failure, log_phase_complete, transition_span};
use ace_utils::types::{DocumentStatus, PhaseId, Verdict};

use crate::audience::{self, RenderedPrompt};
use crate::drafts::Draft;
use crate::journal::{Journal, JournalRecord};
use crate::session::{WorkflowSession, WorkflowState};
use crate::validator;

/// EVALUATE output section a NO-GO must fill.
const BLOCKING_ISSUES: &str = "Blocking Issues";

/// Exclusive right to run one transition on a session.
///
/// Released when dropped, including on early return and on a dropped future.
#[derive(Debug)]
pub struct TransitionGuard {
    flag: Arc<AtomicBool>,
}

impl TransitionGuard {
    pub fn try_acquire(flag: &Arc<AtomicBool>, session: &str) -> Result<Self, AceError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| AceError::SessionBusy {
                session: session.to_string(),
                detail: "another transition is in progress".to_string(),
            })?;
        Ok(Self {
            flag: Arc::clone(flag),
        })
    }
}

impl Drop for TransitionGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// One line of `status()` output per Complete document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentSummary {
    pub id: DocumentId,
    pub phase: PhaseId,
    pub iteration: u32,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<DocumentId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DraftSummary {
    pub phase: PhaseId,
    /// `None` until the inputs first resolve.
    pub status: Option<DocumentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<DocumentId>,
    pub inputs: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub state: WorkflowState,
    pub legal_next: Vec<PhaseId>,
    pub documents: Vec<DocumentSummary>,
    pub drafts: Vec<DraftSummary>,
}

#[derive(Debug, Default)]
struct EngineState {
    session: WorkflowSession,
    drafts: BTreeMap<PhaseId, Draft>,
}

pub struct WorkflowEngineBuilder {
    session_id: String,
    templates: Arc<TemplateStore>,
    collaborator: Arc<dyn ReasoningCollaborator>,
    journal: Option<Journal>,
    session: Option<WorkflowSession>,
    audience: String,
    timeout: Duration,
}

impl WorkflowEngineBuilder {
    /// Persist completed documents to `journal`.
    #[must_use]
    pub fn journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Start from an existing session instead of an empty one.
    #[must_use]
    pub fn session(mut self, session: WorkflowSession) -> Self {
        self.session = Some(session);
        self
    }

    #[must_use]
    pub fn default_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = audience.into();
        self
    }

    #[must_use]
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn build(self) -> WorkflowEngine {
        let session = self
            .session
            .unwrap_or_else(|| WorkflowSession::new(self.session_id.clone()));
        WorkflowEngine {
            session_id: self.session_id,
            templates: self.templates,
            collaborator: self.collaborator,
            journal: self.journal,
            default_audience: self.audience,
            default_timeout: self.timeout,
            state: Mutex::new(EngineState {
                session,
                drafts: BTreeMap::new(),
            }),
            busy: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// The ACE workflow for one session.
///
/// Methods take `&self`; concurrent callers are serialized by the transition
/// guard rather than by the borrow checker, so an engine can be shared behind
/// an `Arc`.
pub struct WorkflowEngine {
    session_id: String,
    templates: Arc<TemplateStore>,
    collaborator: Arc<dyn ReasoningCollaborator>,
    journal: Option<Journal>,
    default_audience: String,
    default_timeout: Duration,
    state: Mutex<EngineState>,
    busy: Arc<AtomicBool>,
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("session_id", &self.session_id)
            .field("provider", &self.collaborator.provider())
            .field("journal", &self.journal.as_ref().map(Journal::path))
            .finish_non_exhaustive()
    }
}

impl WorkflowEngine {
    pub fn builder(
        session_id: impl Into<String>,
        templates: Arc<TemplateStore>,
        collaborator: Arc<dyn ReasoningCollaborator>,
    ) -> WorkflowEngineBuilder {
        WorkflowEngineBuilder {
            session_id: session_id.into(),
            templates,
            collaborator,
            journal: None,
            session: None,
            audience: DEFAULT_AUDIENCE.to_string(),
            timeout: Duration::from_secs(DEFAULT_COLLABORATOR_TIMEOUT_SECS),
        }
    }

    /// Open the session stored in `session_dir`, replaying its journal.
    pub fn open(
        session_id: &str,
        session_dir: &Utf8Path,
        templates: Arc<TemplateStore>,
        collaborator: Arc<dyn ReasoningCollaborator>,
        config: &Config,
    ) -> Result<Self, AceError> {
        let journal = Journal::in_session_dir(session_dir);
        let session = journal.replay(session_id)?;
        Ok(Self::builder(session_id, templates, collaborator)
            .journal(journal)
            .session(session)
            .default_audience(config.audience())
            .default_timeout(config.collaborator_timeout())
            .build())
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    #[must_use]
    pub fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    /// Snapshot of the session history.
    #[must_use]
    pub fn session(&self) -> WorkflowSession {
        self.lock().session.clone()
    }

    #[must_use]
    pub fn state(&self) -> WorkflowState {
        self.lock().session.state()
    }

    #[must_use]
    pub fn draft(&self, phase: PhaseId) -> Option<Draft> {
        self.lock().drafts.get(&phase).cloned()
    }

    #[must_use]
    pub fn drafts(&self) -> Vec<Draft> {
        self.lock().drafts.values().cloned().collect()
    }

    /// Reinstate a draft saved by an earlier process.
    ///
    /// A Rendered document can only be left behind by an interrupted call and
    /// is reverted to Validated.
    pub fn restore_draft(&self, mut draft: Draft) -> Result<(), AceError> {
        let _guard = self.guard()?;
        if let Some(doc) = draft.document.take() {
            draft.document = Some(match doc.status() {
                DocumentStatus::Rendered => doc.revert_to_validated().map_err(|r| r.error)?,
                DocumentStatus::Complete => {
                    return Err(WorkflowError::DocumentState {
                        phase: doc.phase(),
                        document: doc.id().to_string(),
                        status: doc.status(),
                        operation: "be reopened as a draft".to_string(),
                    }
                    .into());
                }
                _ => doc,
            });
        }
        self.lock().drafts.insert(draft.phase, draft);
        Ok(())
    }

    /// Open a draft for the next phase.
    ///
    /// Beginning EVALUATE while CREATE iterations are still possible is the
    /// explicit CREATE → EVALUATE trigger. An existing draft for the phase is
    /// discarded.
    pub fn begin(&self, phase: PhaseId, audience: Option<String>) -> Result<Draft, AceError> {
        let _guard = self.guard()?;
        let _span = transition_span(&self.session_id, phase.as_str(), "begin").entered();
        self.begin_unguarded(phase, audience)
    }

    fn begin_unguarded(&self, phase: PhaseId, audience: Option<String>) -> Result<Draft, AceError> {
        let mut state = self.lock();
        let current = state.session.state();
        if !current.legal_next().contains(&phase) {
            return Err(WorkflowError::InvalidTransition {
                from: current.to_string(),
                to: phase,
            }
            .into());
        }
        let draft = Draft::open(phase, audience);
        if state.drafts.insert(phase, draft.clone()).is_some() {
            tracing::debug!(phase = %phase, "Replaced existing draft");
        }
        tracing::info!(session = %self.session_id, phase = %phase, state = %current, "Draft opened");
        Ok(draft)
    }

    /// Open a draft that will supersede the latest Complete START or ANALYZE
    /// document. The new draft starts from the old document's slot values.
    pub fn begin_amendment(&self, phase: PhaseId, audience: Option<String>) -> Result<Draft, AceError> {
        let _guard = self.guard()?;
        let _span = transition_span(&self.session_id, phase.as_str(), "amend").entered();

        let mut state = self.lock();
        let current = state.session.state();
        let latest = match phase {
            PhaseId::Start | PhaseId::Analyze => state.session.latest(phase),
            _ => None,
        };
        let Some(latest) = latest else {
            return Err(WorkflowError::InvalidTransition {
                from: current.to_string(),
                to: phase,
            }
            .into());
        };

        let mut draft = Draft::open(
            phase,
            audience.or_else(|| Some(latest.audience().to_string()).filter(|a| !a.is_empty())),
        );
        draft.inputs = latest
            .filled_slots()
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(slot, value)| (slot.clone(), value.clone()))
            .collect();
        draft.supersedes = Some(latest.id().clone());

        tracing::info!(
            session = %self.session_id,
            phase = %phase,
            supersedes = %latest.id(),
            "Amendment draft opened"
        );
        state.drafts.insert(phase, draft.clone());
        Ok(draft)
    }

    /// Merge `inputs` into the phase's draft and resolve it.
    ///
    /// The merged inputs are kept even when resolution fails, so a caller can
    /// fill a draft over several calls. Any earlier validation is discarded.
    pub fn fill(
        &self,
        phase: PhaseId,
        inputs: BTreeMap<String, String>,
        audience: Option<String>,
    ) -> Result<PhaseDocument, AceError> {
        let _guard = self.guard()?;
        let _span = transition_span(&self.session_id, phase.as_str(), "fill").entered();
        self.fill_unguarded(phase, inputs, audience)
    }

    fn fill_unguarded(
        &self,
        phase: PhaseId,
        inputs: BTreeMap<String, String>,
        audience: Option<String>,
    ) -> Result<PhaseDocument, AceError> {
        let template = self.templates.get(phase);
        let mut guard = self.lock();
        let EngineState { session, drafts } = &mut *guard;
        let draft = drafts
            .get_mut(&phase)
            .ok_or(WorkflowError::NoDraft { phase })?;

        // Reject the whole batch before touching the draft, so a mistyped or
        // doubled key is never stored.
        let mut unknown = Vec::new();
        let mut named: Vec<&str> = Vec::new();
        for key in inputs.keys() {
            match template.slot(key) {
                Some(slot) if named.contains(&slot.name.as_str()) => unknown.push(key.clone()),
                Some(slot) => named.push(slot.name.as_str()),
                None => unknown.push(key.clone()),
            }
        }
        if !unknown.is_empty() {
            tracing::debug!(phase = %phase, unknown = ?unknown, "fill rejected");
            return Err(AceError::IncompleteInput {
                phase,
                missing: Vec::new(),
                unknown,
            });
        }

        for (key, value) in inputs {
            // A later spelling of a slot replaces the earlier one.
            if let Some(slot) = template.slot(&key) {
                draft
                    .inputs
                    .retain(|existing, _| template.slot(existing).is_none_or(|s| s.name != slot.name));
            }
            draft.inputs.insert(key, value);
        }
        if audience.is_some() {
            draft.audience = audience;
        }
        draft.document = None;

        let document = self.resolve_draft(template, session, draft)?;
        draft.document = Some(document.clone());
        Ok(document)
    }

    /// Re-resolve the draft and check its cross-phase references.
    pub fn validate(&self, phase: PhaseId) -> Result<PhaseDocument, AceError> {
        let _guard = self.guard()?;
        let _span = transition_span(&self.session_id, phase.as_str(), "validate").entered();
        self.validate_unguarded(phase)
    }

    fn validate_unguarded(&self, phase: PhaseId) -> Result<PhaseDocument, AceError> {
        let template = self.templates.get(phase);
        let mut guard = self.lock();
        let EngineState { session, drafts } = &mut *guard;
        let draft = drafts
            .get_mut(&phase)
            .ok_or(WorkflowError::NoDraft { phase })?;
        ensure_still_legal(session, draft)?;

        let document = self.resolve_draft(template, session, draft)?;
        draft.document = Some(document.clone());
        let validated = validator::validate(document, session)?;
        draft.document = Some(validated.clone());

        tracing::debug!(phase = %phase, document = %validated.id(), "Draft validated");
        Ok(validated)
    }

    /// Assemble the collaborator prompt without sending it. The document stays
    /// Validated.
    pub fn render(&self, phase: PhaseId) -> Result<RenderedPrompt, AceError> {
        let _guard = self.guard()?;
        let _span = transition_span(&self.session_id, phase.as_str(), "render").entered();
        let state = self.lock();
        let draft = state
            .drafts
            .get(&phase)
            .ok_or(WorkflowError::NoDraft { phase })?;
        let document = validated_document(draft, "render")?;
        audience::render(self.templates.get(phase), document, &state.session)
    }

    /// Send the validated document to the collaborator and record the result.
    ///
    /// The call is bounded by `timeout` (the engine default when `None`) and
    /// abandoned as soon as `cancel` turns `true`. If anything fails the draft
    /// keeps its Validated document and the session is unchanged, so calling
    /// `complete` again retries without revalidation.
    pub async fn complete(
        &self,
        phase: PhaseId,
        timeout: Option<Duration>,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<PhaseDocument, AceError> {
        let _guard = self.guard()?;
        let span = transition_span(&self.session_id, phase.as_str(), "complete");
        self.complete_unguarded(phase, timeout, cancel)
            .instrument(span)
            .await
    }

    async fn complete_unguarded(
        &self,
        phase: PhaseId,
        timeout: Option<Duration>,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<PhaseDocument, AceError> {
        let timeout = timeout.unwrap_or(self.default_timeout);

        let (prompt, rendered) = {
            let state = self.lock();
            let draft = state
                .drafts
                .get(&phase)
                .ok_or(WorkflowError::NoDraft { phase })?;
            ensure_still_legal(&state.session, draft)?;
            let document = validated_document(draft, "complete")?;
            let prompt = audience::render(self.templates.get(phase), document, &state.session)?;
            let rendered = document.clone().into_rendered().map_err(|r| r.error)?;
            (prompt, rendered)
        };

        let started = Instant::now();
        let response = match self.call_collaborator(&prompt.text, timeout, cancel).await {
            Ok(response) => response,
            Err(error) => {
                log_collaborator_failure(
                    &self.session_id,
                    phase.as_str(),
                    &error.to_string(),
                    started.elapsed().as_millis(),
                );
                self.put_back(phase, rendered);
                return Err(error.into());
            }
        };

        let output = PhaseOutput::parse(response, self.collaborator.provider());
        if phase == PhaseId::Evaluate && output.verdict.is_none() {
            tracing::warn!(
                session = %self.session_id,
                document = %rendered.id(),
                "Evaluation response has no verdict; document left validated"
            );
            self.put_back(phase, rendered);
            return Err(WorkflowError::MissingVerdict { phase }.into());
        }
        // The CREATE revisit after a NO-GO references these issues.
        if output.verdict == Some(Verdict::NoGo)
            && output
                .section(BLOCKING_ISSUES)
                .is_none_or(|issues| issues.trim().is_empty())
        {
            tracing::warn!(
                session = %self.session_id,
                document = %rendered.id(),
                "NO-GO response lists no blocking issues; document left validated"
            );
            self.put_back(phase, rendered);
            return Err(WorkflowError::MissingBlockingIssues { phase }.into());
        }

        let complete = rendered.into_complete(output).map_err(|r| r.error)?;
        self.record_completion(&complete)?;

        log_phase_complete(
            &self.session_id,
            phase.as_str(),
            complete.id().as_str(),
            started.elapsed().as_millis(),
        );
        Ok(complete)
    }

    /// Journal first, then the in-memory session; a journal failure leaves
    /// both the session and the draft as they were.
    fn record_completion(&self, complete: &PhaseDocument) -> Result<(), AceError> {
        let at = Utc::now();
        if let Some(journal) = &self.journal {
            journal.append(&JournalRecord::Complete {
                document: complete.clone(),
            })?;
            if let Some(old) = complete.supersedes() {
                journal.append(&JournalRecord::Superseded {
                    document_id: old.clone(),
                    superseded_by: complete.id().clone(),
                    at,
                })?;
            }
        }

        let mut state = self.lock();
        state.session.append(complete.clone())?;
        if let Some(old) = complete.supersedes() {
            state
                .session
                .record_supersession(old.clone(), complete.id().clone(), at)
                .map_err(|unknown| WorkflowError::DocumentState {
                    phase: complete.phase(),
                    document: unknown.to_string(),
                    status: DocumentStatus::Complete,
                    operation: "be superseded".to_string(),
                })?;
        }
        state.drafts.remove(&complete.phase());
        Ok(())
    }

    fn put_back(&self, phase: PhaseId, rendered: PhaseDocument) {
        match rendered.revert_to_validated() {
            Ok(validated) => {
                if let Some(draft) = self.lock().drafts.get_mut(&phase) {
                    draft.document = Some(validated);
                }
            }
            Err(rejected) => tracing::error!(error = %rejected, "Failed to revert rendered document"),
        }
    }

    async fn call_collaborator(
        &self,
        prompt: &str,
        timeout: Duration,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<String, CollaboratorError> {
        let call = tokio::time::timeout(timeout, self.collaborator.render(prompt));
        let outcome = match cancel {
            None => call.await,
            Some(mut cancel) => tokio::select! {
                outcome = call => outcome,
                () = cancelled(&mut cancel) => return Err(CollaboratorError::Cancelled),
            },
        };
        outcome.map_err(|_| CollaboratorError::Timeout { duration: timeout })?
    }

    /// Begin, fill, validate and complete `phase` in one guarded call.
    pub async fn run_phase(
        &self,
        phase: PhaseId,
        inputs: BTreeMap<String, String>,
        audience: Option<String>,
    ) -> Result<PhaseDocument, AceError> {
        let _guard = self.guard()?;
        let span = transition_span(&self.session_id, phase.as_str(), "run");
        async {
            self.begin_unguarded(phase, audience)?;
            self.fill_unguarded(phase, inputs, None)?;
            self.validate_unguarded(phase)?;
            self.complete_unguarded(phase, None, None).await
        }
        .instrument(span)
        .await
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        let state = self.lock();
        let session = &state.session;
        let current = session.state();
        SessionStatus {
            session_id: self.session_id.clone(),
            state: current,
            legal_next: current.legal_next().to_vec(),
            documents: session
                .documents()
                .iter()
                .map(|doc| DocumentSummary {
                    id: doc.id().clone(),
                    phase: doc.phase(),
                    iteration: doc.iteration(),
                    created_at: doc.created_at(),
                    verdict: doc.verdict(),
                    superseded_by: session
                        .supersessions()
                        .get(doc.id())
                        .map(|s| s.superseded_by.clone()),
                })
                .collect(),
            drafts: state
                .drafts
                .values()
                .map(|draft| DraftSummary {
                    phase: draft.phase,
                    status: draft.document.as_ref().map(PhaseDocument::status),
                    supersedes: draft.supersedes.clone(),
                    inputs: draft.inputs.len(),
                })
                .collect(),
        }
    }

    fn resolve_draft(
        &self,
        template: &Template,
        session: &WorkflowSession,
        draft: &Draft,
    ) -> Result<PhaseDocument, AceError> {
        let phase = template.phase();
        let iteration = session.next_iteration(phase, draft.supersedes.as_ref());
        let references = materialize_references(template, iteration, session.no_go_pending());
        resolve(
            template,
            &draft.inputs,
            ResolveContext {
                id: DocumentId::new(phase, session.next_sequence(phase)),
                iteration,
                audience: draft
                    .audience
                    .clone()
                    .unwrap_or_else(|| self.default_audience.clone()),
                references,
                supersedes: draft.supersedes.clone(),
            },
        )
    }

    fn guard(&self) -> Result<TransitionGuard, AceError> {
        TransitionGuard::try_acquire(&self.busy, &self.session_id)
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let sender_gone = cancel.wait_for(|cancelled| *cancelled).await.is_err();
    if sender_gone {
        std::future::pending::<()>().await;
    }
}

fn validated_document<'d>(draft: &'d Draft, operation: &str) -> Result<&'d PhaseDocument, AceError> {
    match &draft.document {
        Some(doc) if doc.status() == DocumentStatus::Validated => Ok(doc),
        other => Err(WorkflowError::OutOfOrder {
            phase: draft.phase,
            operation: operation.to_string(),
            status: other.as_ref().map_or(DocumentStatus::Draft, PhaseDocument::status),
        }
        .into()),
    }
}

/// Other transitions may have completed since the draft was opened.
fn ensure_still_legal(session: &WorkflowSession, draft: &Draft) -> Result<(), AceError> {
    let current = session.state();
    let legal = match &draft.supersedes {
        Some(old) => session
            .latest(draft.phase)
            .is_some_and(|latest| latest.id() == old),
        None => current.legal_next().contains(&draft.phase),
    };
    if legal {
        Ok(())
    } else {
        Err(WorkflowError::InvalidTransition {
            from: current.to_string(),
            to: draft.phase,
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{evaluate_response, sample_inputs, sample_response, scripted_engine};
    use ace_llm::ScriptedCollaborator;

    fn inputs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    async fn run(engine: &WorkflowEngine, scripted: &ScriptedCollaborator, phase: PhaseId, response: String) -> PhaseDocument {
        scripted.push_response(response);
        engine.run_phase(phase, sample_inputs(phase), None).await.unwrap()
    }

    async fn through_create(engine: &WorkflowEngine, scripted: &ScriptedCollaborator) {
        for phase in [PhaseId::Start, PhaseId::Analyze, PhaseId::Create] {
            run(engine, scripted, phase, sample_response(phase)).await;
        }
    }

    #[tokio::test]
    async fn test_go_path_reaches_done() {
        let scripted = Arc::new(ScriptedCollaborator::default());
        let engine = scripted_engine(Arc::clone(&scripted), None);
        through_create(&engine, &scripted).await;

        let eval = run(&engine, &scripted, PhaseId::Evaluate, evaluate_response(true)).await;
        assert_eq!(eval.verdict(), Some(Verdict::Go));
        assert_eq!(engine.state(), WorkflowState::Commit);

        run(&engine, &scripted, PhaseId::Commit, sample_response(PhaseId::Commit)).await;
        assert_eq!(engine.state(), WorkflowState::Done);
        assert_eq!(engine.session().documents().len(), 5);
        assert!(engine.drafts().is_empty());
    }

    #[tokio::test]
    async fn test_no_go_forces_a_create_revisit_with_blocking_issues() {
        let scripted = Arc::new(ScriptedCollaborator::default());
        let engine = scripted_engine(Arc::clone(&scripted), None);
        through_create(&engine, &scripted).await;
        run(&engine, &scripted, PhaseId::Evaluate, evaluate_response(false)).await;

        for blocked in [PhaseId::Commit, PhaseId::Evaluate] {
            assert!(matches!(
                engine.begin(blocked, None),
                Err(AceError::Workflow(WorkflowError::InvalidTransition { .. }))
            ));
        }

        let revisit = run(&engine, &scripted, PhaseId::Create, sample_response(PhaseId::Create)).await;
        assert_eq!(revisit.iteration(), 2);
        assert!(
            revisit
                .cross_references()
                .iter()
                .any(|r| r.to_phase == PhaseId::Evaluate && r.to_slot == "Blocking Issues")
        );
        let prompt = scripted.prompts().pop().unwrap();
        assert!(prompt.contains("Token expiry is never enforced."));
        assert_eq!(engine.state(), WorkflowState::Evaluate);
    }

    #[tokio::test]
    async fn test_create_can_iterate_before_evaluate() {
        let scripted = Arc::new(ScriptedCollaborator::default());
        let engine = scripted_engine(Arc::clone(&scripted), None);
        through_create(&engine, &scripted).await;
        let second = run(&engine, &scripted, PhaseId::Create, sample_response(PhaseId::Create)).await;
        assert_eq!(second.iteration(), 2);
        assert!(second.cross_references().iter().any(|r| r.to_phase == PhaseId::Create));
        assert_eq!(second.id().as_str(), "create-2");
    }

    #[tokio::test]
    async fn test_evaluate_without_verdict_stays_validated() {
        let scripted = Arc::new(ScriptedCollaborator::default());
        let engine = scripted_engine(Arc::clone(&scripted), None);
        through_create(&engine, &scripted).await;

        engine.begin(PhaseId::Evaluate, None).unwrap();
        engine
            .fill(PhaseId::Evaluate, sample_inputs(PhaseId::Evaluate), None)
            .unwrap();
        engine.validate(PhaseId::Evaluate).unwrap();
        scripted.push_response("## Assessment\nLooks fine.");
        assert!(matches!(
            engine.complete(PhaseId::Evaluate, None, None).await,
            Err(AceError::Workflow(WorkflowError::MissingVerdict { .. }))
        ));
        let draft = engine.draft(PhaseId::Evaluate).unwrap();
        assert_eq!(draft.document.unwrap().status(), DocumentStatus::Validated);
        assert_eq!(engine.state(), WorkflowState::Evaluate);
    }

    #[tokio::test]
    async fn test_no_go_without_blocking_issues_is_not_recorded() {
        let scripted = Arc::new(ScriptedCollaborator::default());
        let engine = scripted_engine(Arc::clone(&scripted), None);
        through_create(&engine, &scripted).await;

        engine.begin(PhaseId::Evaluate, None).unwrap();
        engine
            .fill(PhaseId::Evaluate, sample_inputs(PhaseId::Evaluate), None)
            .unwrap();
        engine.validate(PhaseId::Evaluate).unwrap();
        for response in [
            "## Assessment\nNot ready.\n\nVerdict: NO-GO\n",
            "## Assessment\nNot ready.\n\n## Blocking Issues\n   \n\n## Verdict\nVerdict: NO-GO\n",
        ] {
            scripted.push_response(response);
            assert!(matches!(
                engine.complete(PhaseId::Evaluate, None, None).await,
                Err(AceError::Workflow(WorkflowError::MissingBlockingIssues { .. }))
            ));
            let draft = engine.draft(PhaseId::Evaluate).unwrap();
            assert_eq!(draft.document.unwrap().status(), DocumentStatus::Validated);
            assert_eq!(engine.state(), WorkflowState::Evaluate);
            assert_eq!(engine.session().count(PhaseId::Evaluate), 0);
        }

        // A retry that names the issues completes and unblocks the revisit.
        scripted.push_response(evaluate_response(false));
        engine.complete(PhaseId::Evaluate, None, None).await.unwrap();
        assert_eq!(engine.state(), WorkflowState::Create);
        let revisit = run(&engine, &scripted, PhaseId::Create, sample_response(PhaseId::Create)).await;
        assert_eq!(revisit.iteration(), 2);
    }

    #[tokio::test]
    async fn test_illegal_first_phase() {
        let engine = scripted_engine(Arc::new(ScriptedCollaborator::new("x")), None);
        match engine.begin(PhaseId::Create, None) {
            Err(AceError::Workflow(WorkflowError::InvalidTransition { from, to })) => {
                assert_eq!(from, "start");
                assert_eq!(to, PhaseId::Create);
            }
            other => panic!("expected InvalidTransition, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fill_without_draft_is_no_draft() {
        let engine = scripted_engine(Arc::new(ScriptedCollaborator::new("x")), None);
        assert!(matches!(
            engine.fill(PhaseId::Start, BTreeMap::new(), None),
            Err(AceError::Workflow(WorkflowError::NoDraft { phase: PhaseId::Start }))
        ));
    }

    #[tokio::test]
    async fn test_fill_keeps_partial_inputs() {
        let engine = scripted_engine(Arc::new(ScriptedCollaborator::new("x")), None);
        engine.begin(PhaseId::Start, None).unwrap();
        let err = engine
            .fill(PhaseId::Start, inputs(&[("Project Name", "Billing")]), None)
            .unwrap_err();
        assert!(matches!(err, AceError::IncompleteInput { ref missing, .. } if missing == &["Problem Statement"]));

        let doc = engine
            .fill(PhaseId::Start, inputs(&[("Problem Statement", "Invoices are late")]), None)
            .unwrap();
        assert_eq!(doc.filled_slots()["Project Name"], "Billing");
        assert_eq!(doc.status(), DocumentStatus::Draft);
    }

    #[tokio::test]
    async fn test_mistyped_key_is_not_stored_and_corrected_fill_succeeds() {
        let engine = scripted_engine(Arc::new(ScriptedCollaborator::new("x")), None);
        engine.begin(PhaseId::Start, None).unwrap();
        engine
            .fill(PhaseId::Start, inputs(&[("Project Name", "Billing")]), None)
            .unwrap_err();
        let before = engine.draft(PhaseId::Start).unwrap().inputs;

        let err = engine
            .fill(
                PhaseId::Start,
                inputs(&[("Projct Name", "typo"), ("Problem Statement", "Invoices are late")]),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, AceError::IncompleteInput { ref unknown, .. } if unknown == &["Projct Name"]));
        assert_eq!(engine.draft(PhaseId::Start).unwrap().inputs, before);

        let doc = engine
            .fill(PhaseId::Start, inputs(&[("Problem Statement", "Invoices are late")]), None)
            .unwrap();
        assert_eq!(doc.filled_slots()["Project Name"], "Billing");
        engine.validate(PhaseId::Start).unwrap();
        assert!(!engine.draft(PhaseId::Start).unwrap().inputs.contains_key("Projct Name"));
    }

    #[tokio::test]
    async fn test_refill_under_another_spelling_replaces_the_value() {
        let engine = scripted_engine(Arc::new(ScriptedCollaborator::new("x")), None);
        engine.begin(PhaseId::Start, None).unwrap();
        engine
            .fill(PhaseId::Start, sample_inputs(PhaseId::Start), None)
            .unwrap();

        let doc = engine
            .fill(PhaseId::Start, inputs(&[("project name", "Billing v2")]), None)
            .unwrap();
        assert_eq!(doc.filled_slots()["Project Name"], "Billing v2");
        let stored = engine.draft(PhaseId::Start).unwrap().inputs;
        assert!(!stored.contains_key("Project Name"));
        assert_eq!(stored["project name"], "Billing v2");

        let err = engine
            .fill(
                PhaseId::Start,
                inputs(&[("Project Name", "A"), ("project name", "B")]),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, AceError::IncompleteInput { ref unknown, .. } if unknown.len() == 1));
        assert_eq!(engine.draft(PhaseId::Start).unwrap().inputs, stored);
    }

    #[tokio::test]
    async fn test_render_before_validate_is_an_ordering_error() {
        let engine = scripted_engine(Arc::new(ScriptedCollaborator::new("x")), None);
        engine.begin(PhaseId::Start, None).unwrap();
        engine
            .fill(PhaseId::Start, sample_inputs(PhaseId::Start), None)
            .unwrap();
        assert!(matches!(
            engine.render(PhaseId::Start),
            Err(AceError::Workflow(WorkflowError::OutOfOrder { .. }))
        ));
        assert!(matches!(
            engine.complete(PhaseId::Start, None, None).await,
            Err(AceError::Workflow(WorkflowError::OutOfOrder { .. }))
        ));

        engine.validate(PhaseId::Start).unwrap();
        let prompt = engine.render(PhaseId::Start).unwrap();
        assert!(prompt.text.contains("Password reset"));
        assert_eq!(
            engine.draft(PhaseId::Start).unwrap().document.unwrap().status(),
            DocumentStatus::Validated
        );
    }

    #[tokio::test]
    async fn test_timeout_leaves_validated_and_retry_skips_validation() {
        let slow = Arc::new(ScriptedCollaborator::new("## Problem Summary\nlate").with_delay(Duration::from_secs(5)));
        let engine = scripted_engine(Arc::clone(&slow), None);
        engine.begin(PhaseId::Start, None).unwrap();
        engine
            .fill(PhaseId::Start, sample_inputs(PhaseId::Start), None)
            .unwrap();
        let validated = engine.validate(PhaseId::Start).unwrap();

        let err = engine
            .complete(PhaseId::Start, Some(Duration::from_millis(50)), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AceError::Collaborator(CollaboratorError::Timeout { .. })));
        let draft = engine.draft(PhaseId::Start).unwrap();
        assert_eq!(draft.document.as_ref(), Some(&validated));
        assert!(engine.session().documents().is_empty());

        let fast = Arc::new(ScriptedCollaborator::new(sample_response(PhaseId::Start)));
        let retry = WorkflowEngine::builder("test-session", Arc::new(TemplateStore::embedded().unwrap()), fast)
            .build();
        retry.restore_draft(draft).unwrap();
        let done = retry.complete(PhaseId::Start, None, None).await.unwrap();
        assert_eq!(done.id(), validated.id());
        assert_eq!(done.content_hash().unwrap(), validated.content_hash().unwrap());
        assert_eq!(retry.state(), WorkflowState::Analyze);
    }

    #[tokio::test]
    async fn test_cancellation_discards_the_pending_call() {
        let slow = Arc::new(ScriptedCollaborator::new("late").with_delay(Duration::from_secs(5)));
        let engine = scripted_engine(Arc::clone(&slow), None);
        engine.begin(PhaseId::Start, None).unwrap();
        engine
            .fill(PhaseId::Start, sample_inputs(PhaseId::Start), None)
            .unwrap();
        engine.validate(PhaseId::Start).unwrap();

        let (tx, rx) = watch::channel(false);
        let (result, ()) = tokio::join!(engine.complete(PhaseId::Start, None, Some(rx)), async {
            tokio::task::yield_now().await;
            tx.send(true).unwrap();
        });
        assert!(matches!(
            result,
            Err(AceError::Collaborator(CollaboratorError::Cancelled))
        ));
        assert_eq!(
            engine.draft(PhaseId::Start).unwrap().document.unwrap().status(),
            DocumentStatus::Validated
        );
    }

    #[tokio::test]
    async fn test_concurrent_transition_is_session_busy() {
        let slow = Arc::new(
            ScriptedCollaborator::new(sample_response(PhaseId::Start)).with_delay(Duration::from_millis(200)),
        );
        let engine = scripted_engine(Arc::clone(&slow), None);
        engine.begin(PhaseId::Start, None).unwrap();
        engine
            .fill(PhaseId::Start, sample_inputs(PhaseId::Start), None)
            .unwrap();
        engine.validate(PhaseId::Start).unwrap();

        let (completed, contender) = tokio::join!(engine.complete(PhaseId::Start, None, None), async {
            tokio::task::yield_now().await;
            engine.validate(PhaseId::Start)
        });
        assert!(completed.is_ok());
        assert!(matches!(contender, Err(AceError::SessionBusy { .. })));

        // Guard released after the first transition finished.
        engine.begin(PhaseId::Analyze, None).unwrap();
    }

    #[tokio::test]
    async fn test_completed_documents_never_change() {
        let scripted = Arc::new(ScriptedCollaborator::default());
        let engine = scripted_engine(Arc::clone(&scripted), None);
        let start = run(&engine, &scripted, PhaseId::Start, sample_response(PhaseId::Start)).await;
        let hash = start.content_hash().unwrap();

        run(&engine, &scripted, PhaseId::Analyze, sample_response(PhaseId::Analyze)).await;
        engine.begin_amendment(PhaseId::Start, None).unwrap();
        engine
            .fill(PhaseId::Start, inputs(&[("Project Name", "Renamed")]), None)
            .unwrap();
        engine.validate(PhaseId::Start).unwrap();
        scripted.push_response(sample_response(PhaseId::Start));
        engine.complete(PhaseId::Start, None, None).await.unwrap();

        let session = engine.session();
        let original = &session.documents()[0];
        assert_eq!(original, &start);
        assert_eq!(original.content_hash().unwrap(), hash);
        assert!(session.is_superseded(start.id()));
        assert_eq!(session.latest(PhaseId::Start).unwrap().filled_slots()["Project Name"], "Renamed");
    }

    #[tokio::test]
    async fn test_blank_outcomes_amendment_breaks_analyze_revalidation() {
        let scripted = Arc::new(ScriptedCollaborator::default());
        let engine = scripted_engine(Arc::clone(&scripted), None);

        // The response carries its own Essential Outcomes section.
        scripted.push_response(sample_response(PhaseId::Start));
        engine
            .run_phase(
                PhaseId::Start,
                inputs(&[
                    ("Project Name", "Login"),
                    ("Problem Statement", "Login is flaky"),
                    ("Essential Outcomes", "user login"),
                ]),
                None,
            )
            .await
            .unwrap();

        engine.begin(PhaseId::Analyze, None).unwrap();
        engine
            .fill(PhaseId::Analyze, sample_inputs(PhaseId::Analyze), None)
            .unwrap();
        let analyze = engine.validate(PhaseId::Analyze).unwrap();
        assert_eq!(analyze.status(), DocumentStatus::Validated);

        engine.begin_amendment(PhaseId::Start, None).unwrap();
        engine
            .fill(PhaseId::Start, inputs(&[("Essential Outcomes", "   ")]), None)
            .unwrap();
        engine.validate(PhaseId::Start).unwrap();
        scripted.push_response(sample_response(PhaseId::Start));
        engine.complete(PhaseId::Start, None, None).await.unwrap();

        match engine.validate(PhaseId::Analyze) {
            Err(AceError::ReferenceValidationFailed { issues, .. }) => {
                assert_eq!(issues.len(), 1);
                assert!(matches!(
                    &issues[0],
                    ace_utils::error::ReferenceIssue::Empty { to: PhaseId::Start, slot, .. } if slot == "Essential Outcomes"
                ));
            }
            other => panic!("expected Empty reference, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_amending_later_phases_is_rejected() {
        let scripted = Arc::new(ScriptedCollaborator::default());
        let engine = scripted_engine(Arc::clone(&scripted), None);
        through_create(&engine, &scripted).await;
        assert!(matches!(
            engine.begin_amendment(PhaseId::Create, None),
            Err(AceError::Workflow(WorkflowError::InvalidTransition { .. }))
        ));
        assert!(matches!(
            engine.begin_amendment(PhaseId::Commit, None),
            Err(AceError::Workflow(WorkflowError::InvalidTransition { .. }))
        ));
    }

    #[tokio::test]
    async fn test_stale_draft_is_rejected_after_the_state_moves() {
        let scripted = Arc::new(ScriptedCollaborator::default());
        let engine = scripted_engine(Arc::clone(&scripted), None);
        through_create(&engine, &scripted).await;

        engine.begin(PhaseId::Create, None).unwrap();
        engine
            .fill(PhaseId::Create, sample_inputs(PhaseId::Create), None)
            .unwrap();
        run(&engine, &scripted, PhaseId::Evaluate, evaluate_response(true)).await;

        assert!(matches!(
            engine.validate(PhaseId::Create),
            Err(AceError::Workflow(WorkflowError::InvalidTransition { .. }))
        ));
    }

    #[tokio::test]
    async fn test_journal_replay_reproduces_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        let scripted = Arc::new(ScriptedCollaborator::default());
        let engine = scripted_engine(Arc::clone(&scripted), Some(root));
        through_create(&engine, &scripted).await;
        engine.begin_amendment(PhaseId::Analyze, None).unwrap();
        engine.validate(PhaseId::Analyze).unwrap();
        scripted.push_response(sample_response(PhaseId::Analyze));
        engine.complete(PhaseId::Analyze, None, None).await.unwrap();

        let reopened = WorkflowEngine::open(
            "test-session",
            root,
            Arc::new(TemplateStore::embedded().unwrap()),
            scripted,
            &Config::minimal_for_testing(),
        )
        .unwrap();
        assert_eq!(reopened.session(), engine.session());
        assert_eq!(reopened.status(), engine.status());
        assert_eq!(reopened.session().supersessions().len(), 1);
    }

    #[test]
    fn test_guard_is_released_on_drop() {
        let flag = Arc::new(AtomicBool::new(false));
        let guard = TransitionGuard::try_acquire(&flag, "s").unwrap();
        assert!(matches!(
            TransitionGuard::try_acquire(&flag, "s"),
            Err(AceError::SessionBusy { .. })
        ));
        drop(guard);
        assert!(TransitionGuard::try_acquire(&flag, "s").is_ok());
    }
}
