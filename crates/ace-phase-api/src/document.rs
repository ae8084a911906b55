use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use ace_utils::canonical::hash_jcs;
use ace_utils::error::WorkflowError;
use ace_utils::types::{DocumentStatus, PhaseId, Verdict};

use crate::output::PhaseOutput;
use crate::reference::{Reference, slot_key};

/// Identifier of a phase document within a session, e.g. `create-3`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// `sequence` counts documents of `phase` in the session, starting at 1.
    #[must_use]
    pub fn new(phase: PhaseId, sequence: u32) -> Self {
        Self(format!("{}-{sequence}", phase.as_str()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything a resolver decides about a new draft.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub id: DocumentId,
    pub phase: PhaseId,
    pub template_id: String,
    pub iteration: u32,
    pub filled_slots: BTreeMap<String, String>,
    pub cross_references: Vec<Reference>,
    pub audience: String,
    pub supersedes: Option<DocumentId>,
}

/// A filled template moving through Draft → Validated → Rendered → Complete.
///
/// Fields are only reachable through accessors; the status changes only via
/// the consuming `into_*` methods, and once Complete a document accepts no
/// further transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseDocument {
    id: DocumentId,
    phase: PhaseId,
    template_id: String,
    iteration: u32,
    filled_slots: BTreeMap<String, String>,
    cross_references: Vec<Reference>,
    audience: String,
    created_at: DateTime<Utc>,
    status: DocumentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    supersedes: Option<DocumentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    output: Option<PhaseOutput>,
}

/// A refused status transition. The document is handed back unchanged.
#[derive(Debug)]
pub struct TransitionRejected {
    pub document: Box<PhaseDocument>,
    pub error: WorkflowError,
}

impl fmt::Display for TransitionRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for TransitionRejected {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<TransitionRejected> for WorkflowError {
    fn from(rejected: TransitionRejected) -> Self {
        rejected.error
    }
}

#[derive(Serialize)]
struct HashedContent<'a> {
    phase: PhaseId,
    template_id: &'a str,
    iteration: u32,
    filled_slots: &'a BTreeMap<String, String>,
    cross_references: &'a [Reference],
    audience: &'a str,
    supersedes: Option<&'a DocumentId>,
}

impl PhaseDocument {
    #[must_use]
    pub fn draft(new: NewDocument) -> Self {
        Self {
            id: new.id,
            phase: new.phase,
            template_id: new.template_id,
            iteration: new.iteration,
            filled_slots: new.filled_slots,
            cross_references: new.cross_references,
            audience: new.audience,
            created_at: Utc::now(),
            status: DocumentStatus::Draft,
            supersedes: new.supersedes,
            output: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    #[must_use]
    pub fn phase(&self) -> PhaseId {
        self.phase
    }

    #[must_use]
    pub fn template_id(&self) -> &str {
        &self.template_id
    }

    /// 1-based; only CREATE documents go beyond 1.
    #[must_use]
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    #[must_use]
    pub fn filled_slots(&self) -> &BTreeMap<String, String> {
        &self.filled_slots
    }

    #[must_use]
    pub fn cross_references(&self) -> &[Reference] {
        &self.cross_references
    }

    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn status(&self) -> DocumentStatus {
        self.status
    }

    #[must_use]
    pub fn supersedes(&self) -> Option<&DocumentId> {
        self.supersedes.as_ref()
    }

    #[must_use]
    pub fn output(&self) -> Option<&PhaseOutput> {
        self.output.as_ref()
    }

    #[must_use]
    pub fn verdict(&self) -> Option<Verdict> {
        self.output.as_ref().and_then(|o| o.verdict)
    }

    /// Content a reference can point at: a filled slot, else an output
    /// section, else `Response` or `Verdict`.
    ///
    /// A name declared as a slot resolves from the slot alone, even when the
    /// slot is blank; output sections only answer names that are not slots.
    /// Blank values are returned as-is; callers decide what counts as empty.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&str> {
        let key = slot_key(name);
        if let Some((_, value)) = self.filled_slots.iter().find(|(k, _)| slot_key(k) == key) {
            return Some(value.as_str());
        }

        let output = self.output.as_ref()?;
        output.section(name).or_else(|| match key.as_str() {
            "response" => Some(output.response.as_str()),
            "verdict" => output.verdict.map(|v| v.as_str()),
            _ => None,
        })
    }

    /// BLAKE3 over the JCS form of the resolved content.
    ///
    /// Excludes `id`, `created_at`, `status` and output, so resolving the same
    /// inputs twice always gives the same hash.
    pub fn content_hash(&self) -> anyhow::Result<String> {
        hash_jcs(&HashedContent {
            phase: self.phase,
            template_id: &self.template_id,
            iteration: self.iteration,
            filled_slots: &self.filled_slots,
            cross_references: &self.cross_references,
            audience: &self.audience,
            supersedes: self.supersedes.as_ref(),
        })
    }

    /// Draft → Validated.
    pub fn into_validated(self) -> Result<Self, TransitionRejected> {
        self.advance(DocumentStatus::Draft, DocumentStatus::Validated, "validate")
    }

    /// Validated → Rendered.
    pub fn into_rendered(self) -> Result<Self, TransitionRejected> {
        self.advance(DocumentStatus::Validated, DocumentStatus::Rendered, "render")
    }

    /// Rendered → Complete, attaching the collaborator output.
    pub fn into_complete(self, output: PhaseOutput) -> Result<Self, TransitionRejected> {
        let mut doc = self.advance(DocumentStatus::Rendered, DocumentStatus::Complete, "complete")?;
        doc.output = Some(output);
        Ok(doc)
    }

    /// Rendered → Validated after a failed or abandoned collaborator call.
    pub fn revert_to_validated(self) -> Result<Self, TransitionRejected> {
        self.advance(DocumentStatus::Rendered, DocumentStatus::Validated, "revert")
    }

    fn advance(
        mut self,
        expected: DocumentStatus,
        next: DocumentStatus,
        operation: &str,
    ) -> Result<Self, TransitionRejected> {
        if self.status == expected {
            self.status = next;
            return Ok(self);
        }
        let error = if self.status == DocumentStatus::Complete {
            WorkflowError::DocumentState {
                phase: self.phase,
                document: self.id.to_string(),
                status: self.status,
                operation: operation.to_string(),
            }
        } else {
            WorkflowError::OutOfOrder {
                phase: self.phase,
                operation: operation.to_string(),
                status: self.status,
            }
        };
        Err(TransitionRejected {
            document: Box::new(self),
            error,
        })
    }
}
