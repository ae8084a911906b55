//! Session history and the state machine derived from it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use ace_phase_api::{DocumentId, PhaseDocument};
use ace_utils::error::WorkflowError;
use ace_utils::types::{DocumentStatus, PhaseId, Verdict};

/// Where a session stands, named after the phase it is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowState {
    /// Nothing completed yet.
    Start,
    /// START complete.
    Analyze,
    /// ANALYZE complete, or the latest EVALUATE said NO-GO.
    Create,
    /// At least one CREATE complete since the last EVALUATE.
    Evaluate,
    /// The latest EVALUATE said GO.
    Commit,
    /// COMMIT complete.
    Done,
}

impl WorkflowState {
    /// Phases a new (non-amendment) document may be opened for.
    #[must_use]
    pub fn legal_next(self) -> &'static [PhaseId] {
        match self {
            Self::Start => &[PhaseId::Start],
            Self::Analyze => &[PhaseId::Analyze],
            Self::Create => &[PhaseId::Create],
            Self::Evaluate => &[PhaseId::Create, PhaseId::Evaluate],
            Self::Commit => &[PhaseId::Commit],
            Self::Done => &[],
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Analyze => "analyze",
            Self::Create => "create",
            Self::Evaluate => "evaluate",
            Self::Commit => "commit",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Marker left when an amendment replaces an earlier document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Supersession {
    pub superseded_by: DocumentId,
    pub at: DateTime<Utc>,
}

/// Append-only record of a session's Complete documents.
///
/// Documents are never removed. An amendment appends a new document and marks
/// the old one superseded; lookups skip superseded documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkflowSession {
    id: String,
    documents: Vec<PhaseDocument>,
    superseded: BTreeMap<DocumentId, Supersession>,
}

impl WorkflowSession {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Every Complete document in completion order, superseded ones included.
    #[must_use]
    pub fn documents(&self) -> &[PhaseDocument] {
        &self.documents
    }

    #[must_use]
    pub fn supersessions(&self) -> &BTreeMap<DocumentId, Supersession> {
        &self.superseded
    }

    #[must_use]
    pub fn is_superseded(&self, id: &DocumentId) -> bool {
        self.superseded.contains_key(id)
    }

    #[must_use]
    pub fn contains(&self, id: &DocumentId) -> bool {
        self.documents.iter().any(|d| d.id() == id)
    }

    /// Most recent non-superseded Complete document of `phase`.
    #[must_use]
    pub fn latest(&self, phase: PhaseId) -> Option<&PhaseDocument> {
        self.latest_indexed(phase).map(|(_, doc)| doc)
    }

    fn latest_indexed(&self, phase: PhaseId) -> Option<(usize, &PhaseDocument)> {
        self.documents
            .iter()
            .enumerate()
            .rev()
            .find(|(_, d)| d.phase() == phase && !self.is_superseded(d.id()))
    }

    /// Verdict of the latest EVALUATE, if it came after the latest CREATE.
    #[must_use]
    pub fn pending_verdict(&self) -> Option<Verdict> {
        let (eval_at, evaluate) = self.latest_indexed(PhaseId::Evaluate)?;
        match self.latest_indexed(PhaseId::Create) {
            Some((create_at, _)) if create_at > eval_at => None,
            _ => evaluate.verdict(),
        }
    }

    /// True while a NO-GO verdict is waiting for a CREATE revisit.
    #[must_use]
    pub fn no_go_pending(&self) -> bool {
        self.pending_verdict() == Some(Verdict::NoGo)
    }

    #[must_use]
    pub fn state(&self) -> WorkflowState {
        if self.latest(PhaseId::Commit).is_some() {
            return WorkflowState::Done;
        }
        match self.pending_verdict() {
            Some(Verdict::Go) => return WorkflowState::Commit,
            Some(Verdict::NoGo) => return WorkflowState::Create,
            None => {}
        }
        if self.latest(PhaseId::Create).is_some() {
            WorkflowState::Evaluate
        } else if self.latest(PhaseId::Analyze).is_some() {
            WorkflowState::Create
        } else if self.latest(PhaseId::Start).is_some() {
            WorkflowState::Analyze
        } else {
            WorkflowState::Start
        }
    }

    /// Number of non-superseded Complete documents of `phase`.
    #[must_use]
    pub fn count(&self, phase: PhaseId) -> usize {
        self.documents
            .iter()
            .filter(|d| d.phase() == phase && !self.is_superseded(d.id()))
            .count()
    }

    /// Sequence number for the next document id of `phase`.
    #[must_use]
    pub fn next_sequence(&self, phase: PhaseId) -> u32 {
        let used = self.documents.iter().filter(|d| d.phase() == phase).count();
        u32::try_from(used).unwrap_or(u32::MAX - 1) + 1
    }

    /// Iteration for a new document of `phase`; CREATE counts up, amendments
    /// keep the iteration of the document they replace.
    #[must_use]
    pub fn next_iteration(&self, phase: PhaseId, supersedes: Option<&DocumentId>) -> u32 {
        if let Some(old) = supersedes
            && let Some(doc) = self.documents.iter().find(|d| d.id() == old)
        {
            return doc.iteration();
        }
        u32::try_from(self.count(phase)).unwrap_or(u32::MAX - 1) + 1
    }

    /// Append a Complete document.
    pub fn append(&mut self, document: PhaseDocument) -> Result<(), WorkflowError> {
        if document.status() != DocumentStatus::Complete {
            return Err(WorkflowError::DocumentState {
                phase: document.phase(),
                document: document.id().to_string(),
                status: document.status(),
                operation: "join the session".to_string(),
            });
        }
        self.documents.push(document);
        Ok(())
    }

    /// Mark `old` as replaced by `new`. Both must already be in the session.
    pub fn record_supersession(
        &mut self,
        old: DocumentId,
        new: DocumentId,
        at: DateTime<Utc>,
    ) -> Result<(), DocumentId> {
        if !self.contains(&old) {
            return Err(old);
        }
        if !self.contains(&new) {
            return Err(new);
        }
        self.superseded.insert(
            old,
            Supersession {
                superseded_by: new,
                at,
            },
        );
        Ok(())
    }
}
