//! Template file parser.
//!
//! A template is markdown with a `+++` TOML front matter block followed by
//! three fixed sections:
//!
//! ```text
//! +++
//! phase = "analyze"
//! title = "..."
//! audience_aware = true
//!
//! [[slots]]
//! name = "Technical Constraints"
//! required = true
//!
//! [[references]]
//! phase = "start"
//! slot = "Essential Outcomes"
//! +++
//! ## SECTION 1: USER INPUTS
//! ## SECTION 2: AI INSTRUCTIONS
//! ## SECTION 3: EXPECTED OUTPUT STRUCTURE
//! ```
//!
//! Slot markers are `[Name]` and are only recognised inside Section 1.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;

use ace_phase_api::{Reference, ReferenceRule, ReferenceWhen, slot_key};
use ace_utils::error::TemplateError;
use ace_utils::types::PhaseId;

use crate::template::{Slot, Template};

const FENCE: &str = "+++";

pub const SECTION_INPUTS: &str = "SECTION 1: USER INPUTS";
pub const SECTION_INSTRUCTIONS: &str = "SECTION 2: AI INSTRUCTIONS";
pub const SECTION_OUTPUT: &str = "SECTION 3: EXPECTED OUTPUT STRUCTURE";

static SECTION_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^##\s+SECTION\s+([123])\s*:").expect("section regex is valid")
});

static OUTPUT_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^###\s+(.+?)\s*$").expect("output heading regex is valid"));

// The trailing group catches `[text](url)` so links can be skipped.
pub(crate) static MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\[\]\n]+)\](\()?").expect("marker regex is valid"));

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FrontMatter {
    phase: String,
    title: String,
    #[serde(default)]
    audience_aware: bool,
    #[serde(default)]
    slots: Vec<SlotDecl>,
    #[serde(default)]
    references: Vec<ReferenceRule>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SlotDecl {
    name: String,
    #[serde(default)]
    required: bool,
    hint: Option<String>,
}

/// Parse a template.
///
/// `source_name` appears in every error. When `expected` is given the front
/// matter must declare that phase.
pub fn parse_template(
    source_name: &str,
    text: &str,
    expected: Option<PhaseId>,
) -> Result<Template, TemplateError> {
    let (front, body) = split_front_matter(source_name, text)?;

    let fm: FrontMatter = toml::from_str(front).map_err(|e| TemplateError::InvalidFrontMatter {
        source_name: source_name.to_string(),
        reason: e.message().to_string(),
    })?;

    let phase = match (fm.phase.parse::<PhaseId>(), expected) {
        (Ok(phase), Some(expected)) if phase != expected => {
            return Err(TemplateError::PhaseMismatch {
                source_name: source_name.to_string(),
                expected,
                found: fm.phase,
            });
        }
        (Ok(phase), _) => phase,
        (Err(_), Some(expected)) => {
            return Err(TemplateError::PhaseMismatch {
                source_name: source_name.to_string(),
                expected,
                found: fm.phase,
            });
        }
        (Err(e), None) => {
            return Err(TemplateError::InvalidFrontMatter {
                source_name: source_name.to_string(),
                reason: e.to_string(),
            });
        }
    };

    let [inputs, instructions, output] = split_sections(source_name, body)?;

    let slots = declare_slots(source_name, fm.slots)?;
    check_markers(source_name, &inputs, &slots)?;
    for rule in &fm.references {
        check_rule(source_name, phase, rule)?;
    }

    let output_sections = output
        .lines()
        .filter_map(|line| OUTPUT_HEADING.captures(line))
        .map(|caps| caps[1].to_string())
        .collect();

    Ok(Template {
        id: phase.as_str().to_string(),
        phase,
        title: fm.title,
        slots,
        reference_rules: fm.references,
        inputs,
        instructions,
        output,
        output_sections,
        audience_aware: fm.audience_aware,
    })
}

/// Every slot marker in `section`, in order of appearance, duplicates kept.
///
/// Checkboxes (`[ ]`, `[x]`) and markdown links are not markers.
#[must_use]
pub fn extract_markers(section: &str) -> Vec<String> {
    MARKER
        .captures_iter(section)
        .filter(|caps| caps.get(2).is_none())
        .map(|caps| caps[1].trim().to_string())
        .filter(|name| !name.is_empty() && !name.eq_ignore_ascii_case("x"))
        .collect()
}

fn split_front_matter<'a>(
    source_name: &str,
    text: &'a str,
) -> Result<(&'a str, &'a str), TemplateError> {
    let missing = || TemplateError::MissingFrontMatter {
        source_name: source_name.to_string(),
    };

    let text = text.trim_start_matches('\u{feff}').trim_start();
    let rest = text.strip_prefix(FENCE).ok_or_else(missing)?;
    let rest = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))
        .ok_or_else(missing)?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == FENCE {
            return Ok((&rest[..offset], &rest[offset + line.len()..]));
        }
        offset += line.len();
    }
    Err(missing())
}

fn split_sections(source_name: &str, body: &str) -> Result<[String; 3], TemplateError> {
    let mut sections: [Option<Vec<&str>>; 3] = [None, None, None];
    let mut current: Option<usize> = None;

    for line in body.lines() {
        if let Some(caps) = SECTION_HEADING.captures(line) {
            let index = match &caps[1] {
                "1" => 0,
                "2" => 1,
                _ => 2,
            };
            sections[index].get_or_insert_with(Vec::new);
            current = Some(index);
            continue;
        }
        if let Some(index) = current
            && let Some(lines) = sections[index].as_mut()
        {
            lines.push(line);
        }
    }

    let names = [SECTION_INPUTS, SECTION_INSTRUCTIONS, SECTION_OUTPUT];
    let mut out: [String; 3] = Default::default();
    for (i, section) in sections.into_iter().enumerate() {
        let lines = section.ok_or_else(|| TemplateError::MissingSection {
            source_name: source_name.to_string(),
            section: names[i].to_string(),
        })?;
        out[i] = lines.join("\n").trim().to_string();
    }
    Ok(out)
}

fn declare_slots(source_name: &str, decls: Vec<SlotDecl>) -> Result<Vec<Slot>, TemplateError> {
    let mut seen = HashSet::new();
    let mut slots = Vec::with_capacity(decls.len());
    for decl in decls {
        let name = decl.name.trim().to_string();
        if slot_key(&name).is_empty() {
            return Err(TemplateError::InvalidFrontMatter {
                source_name: source_name.to_string(),
                reason: format!("slot name '{}' has no letters or digits", decl.name),
            });
        }
        if !seen.insert(slot_key(&name)) {
            return Err(TemplateError::DuplicateSlot {
                source_name: source_name.to_string(),
                slot: name,
            });
        }
        let default_hint = decl
            .hint
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| format!("[{name}]"));
        slots.push(Slot {
            name,
            required: decl.required,
            default_hint,
        });
    }
    Ok(slots)
}

fn check_markers(source_name: &str, inputs: &str, slots: &[Slot]) -> Result<(), TemplateError> {
    let markers = extract_markers(inputs);
    let marker_keys: HashSet<String> = markers.iter().map(|m| slot_key(m)).collect();

    for marker in &markers {
        if !slots.iter().any(|s| slot_key(&s.name) == slot_key(marker)) {
            return Err(TemplateError::UndeclaredMarker {
                source_name: source_name.to_string(),
                marker: marker.clone(),
            });
        }
    }
    for slot in slots {
        if !marker_keys.contains(&slot_key(&slot.name)) {
            return Err(TemplateError::UnusedSlot {
                source_name: source_name.to_string(),
                slot: slot.name.clone(),
            });
        }
    }
    Ok(())
}

fn check_rule(source_name: &str, phase: PhaseId, rule: &ReferenceRule) -> Result<(), TemplateError> {
    let invalid = |reason: String| TemplateError::InvalidReferenceRule {
        source_name: source_name.to_string(),
        reason,
    };

    if slot_key(&rule.slot).is_empty() {
        return Err(invalid(format!("reference to {} has an empty slot name", rule.phase)));
    }

    let reference = Reference::new(phase, rule.phase, rule.slot.clone());
    match rule.when {
        ReferenceWhen::Always if reference.direction_allowed(false) => Ok(()),
        ReferenceWhen::PriorIteration if phase == PhaseId::Create && rule.phase == PhaseId::Create => {
            Ok(())
        }
        ReferenceWhen::AfterNoGo if phase == PhaseId::Create && rule.phase == PhaseId::Evaluate => {
            Ok(())
        }
        when => Err(invalid(format!(
            "{reference} is not allowed with when = {}",
            match when {
                ReferenceWhen::Always => "always",
                ReferenceWhen::PriorIteration => "prior_iteration",
                ReferenceWhen::AfterNoGo => "after_no_go",
            }
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"+++
phase = "analyze"
title = "Analyze"

[[slots]]
name = "Technical Constraints"
required = true

[[references]]
phase = "start"
slot = "Essential Outcomes"
+++
## SECTION 1: USER INPUTS
Constraints: [Technical Constraints]
## SECTION 2: AI INSTRUCTIONS
Think.
## SECTION 3: EXPECTED OUTPUT STRUCTURE
### Architecture Blueprint
### Risks
"#;

    fn with_front(front: &str, section1: &str) -> String {
        format!(
            "+++\n{front}\n+++\n## SECTION 1: USER INPUTS\n{section1}\n## SECTION 2: AI INSTRUCTIONS\nx\n## SECTION 3: EXPECTED OUTPUT STRUCTURE\n### Out\n"
        )
    }

    #[test]
    fn test_parse_minimal_template() {
        let t = parse_template("analyze.md", MINIMAL, Some(PhaseId::Analyze)).unwrap();
        assert_eq!(t.phase(), PhaseId::Analyze);
        assert_eq!(t.slots().len(), 1);
        assert_eq!(t.slots()[0].default_hint, "[Technical Constraints]");
        assert!(t.slots()[0].required);
        assert_eq!(t.reference_rules()[0].when, ReferenceWhen::Always);
        assert_eq!(t.output_sections(), ["Architecture Blueprint", "Risks"]);
        assert_eq!(t.instructions(), "Think.");
        assert!(!t.audience_aware());
    }

    #[test]
    fn test_missing_front_matter() {
        let err = parse_template("x.md", "## SECTION 1: USER INPUTS\n", None).unwrap_err();
        assert!(matches!(err, TemplateError::MissingFrontMatter { .. }));

        let unterminated = "+++\nphase = \"start\"\n## SECTION 1: USER INPUTS\n";
        let err = parse_template("x.md", unterminated, None).unwrap_err();
        assert!(matches!(err, TemplateError::MissingFrontMatter { .. }));
    }

    #[test]
    fn test_phase_mismatch() {
        let err = parse_template("commit.md", MINIMAL, Some(PhaseId::Commit)).unwrap_err();
        assert_eq!(
            err,
            TemplateError::PhaseMismatch {
                source_name: "commit.md".to_string(),
                expected: PhaseId::Commit,
                found: "analyze".to_string(),
            }
        );
    }

    #[test]
    fn test_missing_section_is_named() {
        let text = MINIMAL.replace("## SECTION 2: AI INSTRUCTIONS\n", "");
        match parse_template("a.md", &text, None).unwrap_err() {
            TemplateError::MissingSection { section, .. } => {
                assert_eq!(section, SECTION_INSTRUCTIONS);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_slot_by_key() {
        let text = with_front(
            "phase = \"start\"\ntitle = \"S\"\n[[slots]]\nname = \"Goal\"\n[[slots]]\nname = \"goal\"",
            "[Goal]",
        );
        assert!(matches!(
            parse_template("s.md", &text, None).unwrap_err(),
            TemplateError::DuplicateSlot { slot, .. } if slot == "goal"
        ));
    }

    #[test]
    fn test_undeclared_marker_and_unused_slot() {
        let text = with_front(
            "phase = \"start\"\ntitle = \"S\"\n[[slots]]\nname = \"Goal\"",
            "[Goal] and [Budget]",
        );
        assert!(matches!(
            parse_template("s.md", &text, None).unwrap_err(),
            TemplateError::UndeclaredMarker { marker, .. } if marker == "Budget"
        ));

        let text = with_front(
            "phase = \"start\"\ntitle = \"S\"\n[[slots]]\nname = \"Goal\"\n[[slots]]\nname = \"Budget\"",
            "[Goal]",
        );
        assert!(matches!(
            parse_template("s.md", &text, None).unwrap_err(),
            TemplateError::UnusedSlot { slot, .. } if slot == "Budget"
        ));
    }

    #[test]
    fn test_markers_outside_section_one_are_ignored() {
        let text = "+++\nphase = \"start\"\ntitle = \"S\"\n[[slots]]\nname = \"Goal\"\n+++\n## SECTION 1: USER INPUTS\n[Goal]\n## SECTION 2: AI INSTRUCTIONS\nMention [Anything] here.\n## SECTION 3: EXPECTED OUTPUT STRUCTURE\n### Out\n";
        assert!(parse_template("s.md", text, None).is_ok());
    }

    #[test]
    fn test_checkboxes_and_links_are_not_markers() {
        let markers = extract_markers("- [ ] todo\n- [x] done\n[docs](https://x.invalid) [Goal] [ Goal ]");
        assert_eq!(markers, vec!["Goal", "Goal"]);
    }

    #[test]
    fn test_forward_reference_rule_rejected() {
        let text = with_front(
            "phase = \"start\"\ntitle = \"S\"\n[[references]]\nphase = \"analyze\"\nslot = \"Risks\"",
            "nothing",
        );
        assert!(matches!(
            parse_template("s.md", &text, None).unwrap_err(),
            TemplateError::InvalidReferenceRule { .. }
        ));
    }

    #[test]
    fn test_after_no_go_only_for_create() {
        let text = with_front(
            "phase = \"commit\"\ntitle = \"C\"\n[[references]]\nphase = \"evaluate\"\nslot = \"Blocking Issues\"\nwhen = \"after_no_go\"",
            "nothing",
        );
        assert!(parse_template("c.md", &text, None).is_err());
    }

    #[test]
    fn test_unknown_front_matter_key_rejected() {
        let text = with_front("phase = \"start\"\ntitle = \"S\"\ncolour = \"blue\"", "x");
        assert!(matches!(
            parse_template("s.md", &text, None).unwrap_err(),
            TemplateError::InvalidFrontMatter { .. }
        ));
    }
}
