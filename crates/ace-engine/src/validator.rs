//! Cross-phase dependency validation.
//!
//! Every reference in a Draft document must point backward (or along one of
//! the two CREATE loops) at a non-blank value in the latest Complete document
//! of the target phase. All broken references are reported together.

use ace_phase_api::{PhaseDocument, Reference};
use ace_utils::error::{AceError, ReferenceIssue, WorkflowError};
use ace_utils::types::DocumentStatus;

use crate::session::WorkflowSession;

/// Content a reference resolves to in `session`, or why it does not.
pub fn resolve_reference<'s>(
    session: &'s WorkflowSession,
    reference: &Reference,
) -> Result<&'s str, ReferenceIssue> {
    let (from, to, slot) = (
        reference.from_phase,
        reference.to_phase,
        reference.to_slot.clone(),
    );
    if !reference.direction_allowed(session.no_go_pending()) {
        return Err(ReferenceIssue::IllegalDirection { from, to, slot });
    }
    let Some(target) = session.latest(to) else {
        return Err(ReferenceIssue::Dangling { from, to, slot });
    };
    match target.lookup(&reference.to_slot) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ReferenceIssue::Empty { from, to, slot }),
    }
}

/// Every broken reference of `document`, in reference order.
#[must_use]
pub fn reference_issues(document: &PhaseDocument, session: &WorkflowSession) -> Vec<ReferenceIssue> {
    document
        .cross_references()
        .iter()
        .filter_map(|reference| resolve_reference(session, reference).err())
        .collect()
}

/// Promote a Draft to Validated if all of its references resolve.
///
/// The session is only read. On failure the caller keeps its draft; nothing
/// about the document changes.
pub fn validate(document: PhaseDocument, session: &WorkflowSession) -> Result<PhaseDocument, AceError> {
    if document.status() != DocumentStatus::Draft {
        return Err(WorkflowError::OutOfOrder {
            phase: document.phase(),
            operation: "validate".to_string(),
            status: document.status(),
        }
        .into());
    }

    let issues = reference_issues(&document, session);
    if !issues.is_empty() {
        tracing::debug!(
            phase = %document.phase(),
            document = %document.id(),
            issues = issues.len(),
            "Reference validation failed"
        );
        return Err(AceError::ReferenceValidationFailed {
            phase: document.phase(),
            issues,
        });
    }

    document
        .into_validated()
        .map_err(|rejected| AceError::Workflow(rejected.error))
}
