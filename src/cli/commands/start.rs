//! Start command implementation
//!
//! Handles `workflow start --template <phase> [--amend]`.

use anyhow::Result;
use std::collections::BTreeMap;

use super::common::{CommandContext, print_next_phases};

use ace_templates::Template;

/// Open a draft for the named template's phase.
pub fn execute_start_command(
    context: &CommandContext,
    template_name: &str,
    audience: Option<String>,
    amend: bool,
) -> Result<()> {
    let _lock = context.lock()?;
    let engine = context.open_offline()?;
    let template = engine.templates().get_template(template_name)?.clone();
    let phase = template.phase();

    let draft = if amend {
        engine.begin_amendment(phase, audience)?
    } else {
        engine.begin(phase, audience)?
    };
    context.save_draft(&engine, phase)?;

    match &draft.supersedes {
        Some(old) => println!("✓ Opened {phase} amendment (supersedes {old})"),
        None => println!("✓ Opened {phase} draft in session '{}'", context.session_id),
    }
    print_slots(&template, &draft.inputs);
    println!();
    println!("  Fill it with: workflow fill {} \"Slot Name=value\" ...", phase.as_str());
    if draft.supersedes.is_none() {
        print_next_phases(&engine);
    }
    Ok(())
}

fn print_slots(template: &Template, prefilled: &BTreeMap<String, String>) {
    println!("  Slots:");
    for slot in template.slots() {
        let marker = if slot.required { "*" } else { " " };
        match prefilled.get(&slot.name) {
            Some(value) => println!("   {marker} {}: {}", slot.name, first_line(value)),
            None if slot.default_hint.is_empty() => println!("   {marker} {}", slot.name),
            None => println!("   {marker} {} ({})", slot.name, slot.default_hint),
        }
    }
    println!("  (* required)");
}

fn first_line(value: &str) -> &str {
    value.lines().next().unwrap_or_default()
}
