//! Templates command implementation
//!
//! Lists the five phase templates, or shows one template's slots, reference
//! rules and expected output sections.

use anyhow::Result;

use super::common::CommandContext;

use crate::PhaseId;
use ace_phase_api::ReferenceWhen;
use ace_templates::TemplateSource;

pub fn execute_templates_command(context: &CommandContext, phase: Option<PhaseId>) -> Result<()> {
    let store = context.templates()?;

    let Some(phase) = phase else {
        println!("Templates:");
        for template in store.list() {
            println!(
                "  {:<10} {:<9} {} [{}]",
                template.id(),
                template.phase().as_str(),
                template.title(),
                describe_source(store.source(template.phase()))
            );
        }
        return Ok(());
    };

    let template = store.get(phase);
    println!("{} ({})", template.title(), template.id());
    println!("  Source: {}", describe_source(store.source(phase)));
    println!(
        "  Audience-aware: {}",
        if template.audience_aware() { "yes" } else { "no" }
    );

    println!();
    println!("  Slots:");
    for slot in template.slots() {
        let required = if slot.required { "required" } else { "optional" };
        println!("    {} ({required})", slot.name);
    }

    if !template.reference_rules().is_empty() {
        println!();
        println!("  References:");
        for rule in template.reference_rules() {
            let when = match rule.when {
                ReferenceWhen::Always => "",
                ReferenceWhen::PriorIteration => " (from the second iteration)",
                ReferenceWhen::AfterNoGo => " (after a NO-GO verdict)",
            };
            println!("    {}: {}{when}", rule.phase, rule.slot);
        }
    }

    println!();
    println!("  Expected output sections:");
    for section in template.output_sections() {
        println!("    {section}");
    }
    Ok(())
}

fn describe_source(source: &TemplateSource) -> String {
    match source {
        TemplateSource::Embedded => "embedded".to_string(),
        TemplateSource::File(path) => path.display().to_string(),
    }
}
