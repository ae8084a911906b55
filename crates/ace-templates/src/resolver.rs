use regex::Captures;
use std::collections::BTreeMap;

use ace_phase_api::{
    DocumentId, NewDocument, PhaseDocument, Reference, ReferenceWhen, slot_key,
};
use ace_utils::error::AceError;

use crate::parser::MARKER;
use crate::template::{Slot, Template};

const NOT_PROVIDED: &str = "_(not provided)_";

/// Session facts the resolver needs but cannot derive from the inputs.
#[derive(Debug, Clone)]
pub struct ResolveContext {
    pub id: DocumentId,
    pub iteration: u32,
    pub audience: String,
    pub references: Vec<Reference>,
    pub supersedes: Option<DocumentId>,
}

/// Whether `value` leaves `slot` unfilled: blank, the literal marker, or the
/// slot's hint. Only surrounding whitespace is ignored.
#[must_use]
pub fn is_unfilled(slot: &Slot, value: Option<&str>) -> bool {
    match value.map(str::trim) {
        None => true,
        Some(v) => v.is_empty() || v == slot.marker() || v == slot.default_hint,
    }
}

/// Bind raw user inputs to a template's slots and produce a Draft document.
///
/// Keys match slots by slot key, so `essential outcomes` fills
/// `Essential Outcomes`. Every unknown key, every key naming a slot another
/// key already filled, and every unfilled required slot is reported in one
/// `IncompleteInput`. Unfilled optional slots are stored as
/// empty strings.
pub fn resolve(
    template: &Template,
    inputs: &BTreeMap<String, String>,
    context: ResolveContext,
) -> Result<PhaseDocument, AceError> {
    let mut bound: BTreeMap<&str, &str> = BTreeMap::new();
    let mut unknown = Vec::new();

    for (key, value) in inputs {
        match template.slot(key) {
            // A second key for an already bound slot conflicts with the first.
            Some(slot) if bound.contains_key(slot.name.as_str()) => unknown.push(key.clone()),
            Some(slot) => {
                bound.insert(slot.name.as_str(), value.as_str());
            }
            None => unknown.push(key.clone()),
        }
    }

    let mut filled_slots = BTreeMap::new();
    let mut missing = Vec::new();
    for slot in template.slots() {
        let value = bound.get(slot.name.as_str()).copied();
        if is_unfilled(slot, value) {
            if slot.required {
                missing.push(slot.name.clone());
            }
            filled_slots.insert(slot.name.clone(), String::new());
        } else {
            filled_slots.insert(slot.name.clone(), value.unwrap_or_default().trim().to_string());
        }
    }

    if !missing.is_empty() || !unknown.is_empty() {
        tracing::debug!(
            phase = %template.phase(),
            missing = ?missing,
            unknown = ?unknown,
            "Resolution rejected"
        );
        return Err(AceError::IncompleteInput {
            phase: template.phase(),
            missing,
            unknown,
        });
    }

    let mut references = context.references;
    references.sort();
    references.dedup();

    Ok(PhaseDocument::draft(NewDocument {
        id: context.id,
        phase: template.phase(),
        template_id: template.id().to_string(),
        iteration: context.iteration,
        filled_slots,
        cross_references: references,
        audience: context.audience.trim().to_string(),
        supersedes: context.supersedes,
    }))
}

/// Turn a template's reference rules into concrete references for a new
/// document.
///
/// `prior_iteration` rules apply from the second iteration on and
/// `after_no_go` rules only while the latest verdict is NO-GO.
#[must_use]
pub fn materialize_references(
    template: &Template,
    iteration: u32,
    no_go_pending: bool,
) -> Vec<Reference> {
    template
        .reference_rules()
        .iter()
        .filter(|rule| match rule.when {
            ReferenceWhen::Always => true,
            ReferenceWhen::PriorIteration => iteration > 1,
            ReferenceWhen::AfterNoGo => no_go_pending,
        })
        .map(|rule| Reference::new(template.phase(), rule.phase, rule.slot.clone()))
        .collect()
}

/// Section 1 with every slot marker replaced by the document's value.
///
/// Links and checkboxes are left untouched. Blank optional slots render as a
/// visible "not provided" note.
#[must_use]
pub fn render_inputs(template: &Template, doc: &PhaseDocument) -> String {
    MARKER
        .replace_all(template.inputs(), |caps: &Captures<'_>| {
            let original = caps[0].to_string();
            if caps.get(2).is_some() {
                return original;
            }
            let key = slot_key(&caps[1]);
            doc.filled_slots()
                .iter()
                .find(|(name, _)| slot_key(name) == key)
                .map_or(original, |(_, value)| {
                    if value.is_empty() {
                        NOT_PROVIDED.to_string()
                    } else {
                        value.clone()
                    }
                })
        })
        .into_owned()
}
