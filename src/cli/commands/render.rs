//! Render command implementation
//!
//! `--dry-run` prints the prompt; otherwise the prompt goes to the configured
//! collaborator and the phase completes. Ctrl-C abandons the call and leaves
//! the draft validated for a retry.

use anyhow::Result;
use tokio::sync::watch;

use super::common::{CommandContext, print_next_phases};

use crate::{AceError, PhaseId};

pub async fn execute_render_command(
    context: &CommandContext,
    phase: PhaseId,
    dry_run: bool,
) -> Result<()> {
    if dry_run {
        let engine = context.open_offline()?;
        let prompt = engine.render(phase)?;
        println!("{}", prompt.text);
        return Ok(());
    }

    let collaborator = ace_llm::from_config(&context.config).map_err(AceError::Collaborator)?;
    let _lock = context.lock()?;
    let engine = context.open_engine(context.templates()?, collaborator)?;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; abandoning collaborator call");
            let _ = cancel_tx.send(true);
        }
    });

    let outcome = engine.complete(phase, None, Some(cancel_rx)).await;
    interrupt.abort();
    // Success removes the draft; failure keeps it Validated for a retry.
    context.save_draft(&engine, phase)?;
    let document = outcome?;

    println!("✓ {phase} complete ({}, iteration {})", document.id(), document.iteration());
    if let Some(verdict) = document.verdict() {
        println!("  Verdict: {verdict}");
    }
    if let Some(output) = document.output() {
        println!();
        println!("{}", output.response.trim());
        println!();
    }
    print_next_phases(&engine);
    Ok(())
}
