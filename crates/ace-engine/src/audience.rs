//! Prompt assembly for the reasoning collaborator.

use serde::Serialize;
use std::fmt::Write as _;

use ace_config::DEFAULT_AUDIENCE;
use ace_phase_api::{DocumentId, PhaseDocument};
use ace_templates::{Template, render_inputs};
use ace_utils::error::{AceError, WorkflowError};
use ace_utils::types::{DocumentStatus, PhaseId};

use crate::session::WorkflowSession;
use crate::validator::resolve_reference;

/// The payload handed to the collaborator for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedPrompt {
    pub phase: PhaseId,
    pub document_id: DocumentId,
    /// Effective audience, after defaulting.
    pub audience: String,
    pub text: String,
}

/// Audience used for a document, falling back to the built-in default.
#[must_use]
pub fn effective_audience(audience: &str) -> &str {
    let trimmed = audience.trim();
    if trimmed.is_empty() { DEFAULT_AUDIENCE } else { trimmed }
}

/// Build the prompt for a Validated document.
///
/// Sections in order: title, audience directive (audience-aware templates
/// only), filled user inputs, context from earlier phases, the instructions
/// block verbatim, and the expected output structure.
pub fn render(
    template: &Template,
    document: &PhaseDocument,
    session: &WorkflowSession,
) -> Result<RenderedPrompt, AceError> {
    if document.status() != DocumentStatus::Validated {
        return Err(WorkflowError::OutOfOrder {
            phase: document.phase(),
            operation: "render".to_string(),
            status: document.status(),
        }
        .into());
    }

    let audience = effective_audience(document.audience()).to_string();
    let mut text = String::new();
    // Writing to a String cannot fail.
    let _ = writeln!(text, "# {}\n", template.title());

    if template.audience_aware() {
        let _ = writeln!(
            text,
            "**Audience:** {audience}. Match vocabulary, depth and examples to this audience.\n"
        );
    }

    let _ = writeln!(text, "## User Inputs\n\n{}\n", render_inputs(template, document).trim());

    if !document.cross_references().is_empty() {
        text.push_str("## Context from Earlier Phases\n\n");
        for reference in document.cross_references() {
            // Resolves unless the session changed since validation.
            let content = resolve_reference(session, reference)
                .map_err(|issue| AceError::ReferenceValidationFailed {
                    phase: document.phase(),
                    issues: vec![issue],
                })?;
            let _ = writeln!(
                text,
                "### {}: {}\n\n{}\n",
                reference.to_phase,
                reference.to_slot,
                content.trim()
            );
        }
    }

    let _ = writeln!(text, "## Instructions\n\n{}\n", template.instructions().trim());
    let _ = writeln!(
        text,
        "## Expected Output Structure\n\n{}",
        template.output_structure().trim()
    );

    tracing::debug!(
        phase = %document.phase(),
        document = %document.id(),
        audience = %audience,
        prompt_bytes = text.len(),
        "Prompt rendered"
    );

    Ok(RenderedPrompt {
        phase: document.phase(),
        document_id: document.id().clone(),
        audience,
        text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{complete_doc, sample_inputs};
    use ace_templates::{ResolveContext, TemplateStore, materialize_references, resolve};

    fn validated(
        store: &TemplateStore,
        phase: PhaseId,
        audience: &str,
        session: &WorkflowSession,
    ) -> PhaseDocument {
        let template = store.get(phase);
        let doc = resolve(
            template,
            &sample_inputs(phase),
            ResolveContext {
                id: DocumentId::new(phase, 1),
                iteration: 1,
                audience: audience.to_string(),
                references: materialize_references(template, 1, false),
                supersedes: None,
            },
        )
        .unwrap();
        crate::validator::validate(doc, session).unwrap()
    }

    #[test]
    fn test_prompt_contains_every_part_in_order() {
        let store = TemplateStore::embedded().unwrap();
        let mut session = WorkflowSession::new("s");
        session
            .append(complete_doc(PhaseId::Start, 1, "## Essential Outcomes\nUser login works"))
            .unwrap();
        let doc = validated(&store, PhaseId::Analyze, "executives", &session);

        let prompt = render(store.get(PhaseId::Analyze), &doc, &session).unwrap();
        let text = &prompt.text;
        let order = [
            "**Audience:** executives",
            "## User Inputs",
            "Existing Postgres user table",
            "## Context from Earlier Phases",
            "### START: Essential Outcomes",
            "User login works",
            "## Instructions",
            "## Expected Output Structure",
            "### Architecture Blueprint",
        ];
        let mut from = 0;
        for needle in order {
            let at = text[from..]
                .find(needle)
                .unwrap_or_else(|| panic!("missing or out of order: {needle}"));
            from += at + needle.len();
        }
        assert_eq!(prompt.audience, "executives");
    }

    #[test]
    fn test_blank_audience_gets_the_default() {
        let store = TemplateStore::embedded().unwrap();
        let session = WorkflowSession::new("s");
        let doc = validated(&store, PhaseId::Start, "   ", &session);
        let prompt = render(store.get(PhaseId::Start), &doc, &session).unwrap();
        assert_eq!(prompt.audience, DEFAULT_AUDIENCE);
        assert!(prompt.text.contains(DEFAULT_AUDIENCE));
    }

    #[test]
    fn test_audience_unaware_template_has_no_directive() {
        let store = TemplateStore::embedded().unwrap();
        let mut session = WorkflowSession::new("s");
        session
            .append(complete_doc(PhaseId::Start, 1, "## Essential Outcomes\nx"))
            .unwrap();
        session.append(complete_doc(PhaseId::Analyze, 1, "y")).unwrap();
        session.append(complete_doc(PhaseId::Create, 1, "the build")).unwrap();
        let doc = validated(&store, PhaseId::Evaluate, "executives", &session);
        let prompt = render(store.get(PhaseId::Evaluate), &doc, &session).unwrap();
        assert!(!prompt.text.contains("**Audience:**"));
        assert!(prompt.text.contains("### CREATE: Response\n\nthe build"));
    }

    #[test]
    fn test_render_before_validate_is_out_of_order() {
        let store = TemplateStore::embedded().unwrap();
        let template = store.get(PhaseId::Start);
        let draft = resolve(
            template,
            &sample_inputs(PhaseId::Start),
            ResolveContext {
                id: DocumentId::new(PhaseId::Start, 1),
                iteration: 1,
                audience: String::new(),
                references: vec![],
                supersedes: None,
            },
        )
        .unwrap();
        let err = render(template, &draft, &WorkflowSession::new("s")).unwrap_err();
        assert!(matches!(
            err,
            AceError::Workflow(WorkflowError::OutOfOrder { ref operation, .. }) if operation == "render"
        ));
    }
}
