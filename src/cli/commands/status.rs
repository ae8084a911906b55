//! Status command implementation
//!
//! Handles `workflow status` and `workflow status --json`. Status never takes
//! the session lock.

use anyhow::Result;

use super::common::CommandContext;
use super::json_emit::{StatusJsonOutput, emit_status_json};

/// Execute the status command
pub fn execute_status_command(context: &CommandContext, json: bool) -> Result<()> {
    let engine = context.open_offline()?;
    let status = engine.status();

    if json {
        let output = StatusJsonOutput::new(status, &context.config);
        println!("{}", emit_status_json(&output)?);
        return Ok(());
    }

    println!("Session: {}", status.session_id);
    println!("  Directory: {}", context.session_dir);
    println!("  State: {}", status.state);
    if status.legal_next.is_empty() {
        println!("  Next: (workflow complete)");
    } else {
        let next: Vec<String> = status.legal_next.iter().map(ToString::to_string).collect();
        println!("  Next: {}", next.join(", "));
    }

    println!();
    if status.documents.is_empty() {
        println!("  No completed documents");
    } else {
        println!("  Documents:");
        for doc in &status.documents {
            let mut line = format!(
                "    {} {} iteration {} ({})",
                doc.id,
                doc.phase,
                doc.iteration,
                doc.created_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            if let Some(verdict) = doc.verdict {
                line.push_str(&format!(" verdict {verdict}"));
            }
            if let Some(by) = &doc.superseded_by {
                line.push_str(&format!(" [superseded by {by}]"));
            }
            println!("{line}");
        }
    }

    if !status.drafts.is_empty() {
        println!();
        println!("  Drafts:");
        for draft in &status.drafts {
            let state = draft
                .status
                .map_or_else(|| "incomplete".to_string(), |s| s.to_string());
            let amend = draft
                .supersedes
                .as_ref()
                .map(|old| format!(", amends {old}"))
                .unwrap_or_default();
            println!(
                "    {}: {state}, {} input(s){amend}",
                draft.phase, draft.inputs
            );
        }
    }

    println!();
    println!("  Effective configuration:");
    let config = &context.config;
    println!("    audience: {} [{}]", config.audience(), config.source_of("audience"));
    println!("    provider: {} [{}]", config.provider(), config.source_of("provider"));
    println!(
        "    collaborator_timeout: {}s [{}]",
        config.collaborator_timeout().as_secs(),
        config.source_of("collaborator_timeout")
    );
    Ok(())
}
