//! Fill command implementation
//!
//! Handles `workflow fill <phase> "Slot=value" ...`. Values accumulate on the
//! draft across calls; a draft that still misses required slots is saved and
//! reported rather than treated as a failure.

use anyhow::Result;
use std::collections::BTreeMap;

use super::common::CommandContext;

use crate::{AceError, PhaseId};

pub fn execute_fill_command(
    context: &CommandContext,
    phase: PhaseId,
    assignments: Vec<(String, String)>,
    audience: Option<String>,
) -> Result<()> {
    let _lock = context.lock()?;
    let engine = context.open_offline()?;
    let inputs: BTreeMap<String, String> = assignments.into_iter().collect();
    let count = inputs.len();

    let outcome = engine.fill(phase, inputs, audience);
    match outcome {
        Ok(document) => {
            context.save_draft(&engine, phase)?;
            println!("✓ {phase} draft resolved ({count} value(s) set)");
            println!("  Document: {} (iteration {})", document.id(), document.iteration());
            println!("  Next: workflow validate {}", phase.as_str());
            Ok(())
        }
        Err(AceError::IncompleteInput {
            missing, unknown, ..
        }) if unknown.is_empty() => {
            context.save_draft(&engine, phase)?;
            println!("✓ {phase} draft updated ({count} value(s) set)");
            println!("  Still missing:");
            for slot in &missing {
                println!("    - {slot}");
            }
            Ok(())
        }
        Err(err) => {
            // Unknown slots are not stored; the draft on disk stays as it was.
            Err(err.into())
        }
    }
}
