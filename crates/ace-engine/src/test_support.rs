//! Fixtures shared by engine tests and downstream integration tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use ace_llm::ScriptedCollaborator;
use ace_phase_api::{DocumentId, NewDocument, PhaseDocument, PhaseOutput};
use ace_templates::TemplateStore;
use ace_utils::types::PhaseId;
use camino::Utf8Path;

use crate::journal::Journal;
use crate::workflow::WorkflowEngine;

/// A Draft document with no slots.
#[must_use]
pub fn draft_doc(phase: PhaseId, sequence: u32) -> PhaseDocument {
    PhaseDocument::draft(NewDocument {
        id: DocumentId::new(phase, sequence),
        phase,
        template_id: format!("ace-{phase}"),
        iteration: sequence,
        filled_slots: BTreeMap::new(),
        cross_references: Vec::new(),
        audience: String::new(),
        supersedes: None,
    })
}

/// A Complete document whose collaborator response is `response`.
///
/// # Panics
/// Never in practice; the transitions below are always legal.
#[must_use]
pub fn complete_doc(phase: PhaseId, sequence: u32, response: &str) -> PhaseDocument {
    draft_doc(phase, sequence)
        .into_validated()
        .and_then(PhaseDocument::into_rendered)
        .and_then(|d| d.into_complete(PhaseOutput::parse(response, "scripted")))
        .unwrap_or_else(|rejected| panic!("fixture transition failed: {rejected}"))
}

/// Inputs that satisfy every required slot of the embedded template for `phase`.
#[must_use]
pub fn sample_inputs(phase: PhaseId) -> BTreeMap<String, String> {
    let pairs: &[(&str, &str)] = match phase {
        PhaseId::Start => &[
            ("Project Name", "Password reset"),
            ("Problem Statement", "Users locked out of their accounts call support"),
            ("Essential Outcomes", "Self-service reset within five minutes"),
        ],
        PhaseId::Analyze => &[("Technical Constraints", "Existing Postgres user table")],
        PhaseId::Create => &[("Deliverable", "Reset flow design and code outline")],
        PhaseId::Evaluate => &[("Evaluation Criteria", "Meets every essential outcome")],
        PhaseId::Commit => &[("Delivery Channel", "Pull request")],
    };
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

/// A plausible collaborator response for `phase`, with every output heading.
#[must_use]
pub fn sample_response(phase: PhaseId) -> String {
    match phase {
        PhaseId::Start => "## Problem Summary\nLocked-out users.\n\n## Essential Outcomes\nSelf-service reset.\n\n## Open Questions\nNone.\n".to_string(),
        PhaseId::Analyze => "## Requirements\nEmail token.\n\n## Architecture Blueprint\nToken table plus mailer.\n\n## Risks\nMail delivery.\n".to_string(),
        PhaseId::Create => "## Implementation\nHandler and token store.\n\n## Design Decisions\nShort-lived tokens.\n\n## Known Limitations\nNo SMS.\n".to_string(),
        PhaseId::Evaluate => evaluate_response(true),
        PhaseId::Commit => "## Final Deliverable\nMerged.\n\n## Handoff Notes\nOn-call briefed.\n\n## Next Steps\nSMS later.\n".to_string(),
    }
}

/// EVALUATE response carrying a GO or NO-GO verdict.
#[must_use]
pub fn evaluate_response(go: bool) -> String {
    let (issues, verdict) = if go {
        ("None.", "GO")
    } else {
        ("Token expiry is never enforced.", "NO-GO")
    };
    format!(
        "## Assessment\nReviewed against the outcomes.\n\n## Blocking Issues\n{issues}\n\n## Verdict\nVerdict: {verdict}\n"
    )
}

/// Engine over the embedded templates and a scripted collaborator, journaling
/// under `dir` when given.
///
/// # Panics
/// If the embedded templates fail to parse.
#[must_use]
pub fn scripted_engine(
    collaborator: Arc<ScriptedCollaborator>,
    dir: Option<&Utf8Path>,
) -> WorkflowEngine {
    let templates = TemplateStore::embedded()
        .unwrap_or_else(|e| panic!("embedded templates must parse: {e}"));
    let mut builder = WorkflowEngine::builder("test-session", Arc::new(templates), collaborator);
    if let Some(dir) = dir {
        builder = builder.journal(Journal::new(dir.join("journal.jsonl")));
    }
    builder.build()
}
