//! Validate command implementation

use anyhow::Result;

use super::common::CommandContext;

use crate::PhaseId;

/// Resolve the draft and check every cross-phase reference it declares.
///
/// A failed check leaves the saved draft untouched.
pub fn execute_validate_command(context: &CommandContext, phase: PhaseId) -> Result<()> {
    let _lock = context.lock()?;
    let engine = context.open_offline()?;
    let document = engine.validate(phase)?;
    context.save_draft(&engine, phase)?;

    println!("✓ {phase} draft validated ({})", document.id());
    if document.cross_references().is_empty() {
        println!("  No cross-phase references");
    } else {
        println!("  References:");
        for reference in document.cross_references() {
            println!("    ✓ {}: {}", reference.to_phase, reference.to_slot);
        }
    }
    println!(
        "  Next: workflow render {} [--dry-run]",
        phase.as_str()
    );
    Ok(())
}
