//! Show command implementation

use anyhow::Result;

use super::common::CommandContext;
use super::json_emit::emit_document_json;

use crate::{AceError, PhaseId};
use ace_utils::error::WorkflowError;

/// Print the latest (non-superseded) completed document of `phase`.
pub fn execute_show_command(context: &CommandContext, phase: PhaseId, json: bool) -> Result<()> {
    let engine = context.open_offline()?;
    let session = engine.session();
    let Some(document) = session.latest(phase) else {
        return Err(AceError::Workflow(WorkflowError::NotCompleted { phase }).into());
    };

    if json {
        println!("{}", emit_document_json(document)?);
        return Ok(());
    }

    println!("{} (iteration {})", document.id(), document.iteration());
    println!("  Template: {}", document.template_id());
    if !document.audience().is_empty() {
        println!("  Audience: {}", document.audience());
    }
    if let Some(old) = document.supersedes() {
        println!("  Supersedes: {old}");
    }
    if let Some(verdict) = document.verdict() {
        println!("  Verdict: {verdict}");
    }
    println!();
    println!("## Inputs");
    for (slot, value) in document.filled_slots() {
        if !value.is_empty() {
            println!("- {slot}: {value}");
        }
    }
    if let Some(output) = document.output() {
        println!();
        println!("## Response ({})", output.collaborator);
        println!();
        println!("{}", output.response.trim());
    }
    Ok(())
}
