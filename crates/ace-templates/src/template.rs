use serde::Serialize;

use ace_phase_api::{ReferenceRule, slot_key};
use ace_utils::types::PhaseId;

/// A named placeholder in Section 1 of a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Slot {
    pub name: String,
    pub required: bool,
    /// Placeholder text; a value equal to it counts as unfilled.
    pub default_hint: String,
}

impl Slot {
    /// The literal `[Name]` marker as it appears in the template.
    #[must_use]
    pub fn marker(&self) -> String {
        format!("[{}]", self.name)
    }
}

/// A loaded phase template. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Template {
    pub(crate) id: String,
    pub(crate) phase: PhaseId,
    pub(crate) title: String,
    pub(crate) slots: Vec<Slot>,
    pub(crate) reference_rules: Vec<ReferenceRule>,
    pub(crate) inputs: String,
    pub(crate) instructions: String,
    pub(crate) output: String,
    pub(crate) output_sections: Vec<String>,
    pub(crate) audience_aware: bool,
}

impl Template {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn phase(&self) -> PhaseId {
        self.phase
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Declared slots in front-matter order.
    #[must_use]
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    #[must_use]
    pub fn slot(&self, name: &str) -> Option<&Slot> {
        let key = slot_key(name);
        self.slots.iter().find(|s| slot_key(&s.name) == key)
    }

    #[must_use]
    pub fn reference_rules(&self) -> &[ReferenceRule] {
        &self.reference_rules
    }

    /// Body of `SECTION 1: USER INPUTS`, markers unfilled.
    #[must_use]
    pub fn inputs(&self) -> &str {
        &self.inputs
    }

    /// Body of `SECTION 2: AI INSTRUCTIONS`, passed through verbatim.
    #[must_use]
    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    /// Body of `SECTION 3: EXPECTED OUTPUT STRUCTURE`.
    #[must_use]
    pub fn output_structure(&self) -> &str {
        &self.output
    }

    /// `###` headings declared in Section 3.
    #[must_use]
    pub fn output_sections(&self) -> &[String] {
        &self.output_sections
    }

    #[must_use]
    pub fn audience_aware(&self) -> bool {
        self.audience_aware
    }
}
