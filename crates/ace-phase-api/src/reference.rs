use serde::{Deserialize, Serialize};
use std::fmt;

use ace_utils::types::PhaseId;

/// Normalize a slot or section name for matching.
///
/// Case and every non-alphanumeric character are ignored, so
/// `EssentialOutcomes`, `essential outcomes` and `Essential-Outcomes` all
/// name the same slot.
#[must_use]
pub fn slot_key(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// When a declared reference applies to a new document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceWhen {
    /// Every document of the phase carries the reference.
    #[default]
    Always,
    /// Only CREATE iterations after the first.
    PriorIteration,
    /// Only CREATE documents opened after a NO-GO verdict.
    AfterNoGo,
}

/// A cross-phase dependency declared by a template's front matter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferenceRule {
    pub phase: PhaseId,
    pub slot: String,
    #[serde(default)]
    pub when: ReferenceWhen,
}

/// A declared dependency of one phase document on completed content of
/// another phase: a filled slot or a section of its output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Reference {
    pub from_phase: PhaseId,
    pub to_phase: PhaseId,
    pub to_slot: String,
}

impl Reference {
    #[must_use]
    pub fn new(from_phase: PhaseId, to_phase: PhaseId, to_slot: impl Into<String>) -> Self {
        Self {
            from_phase,
            to_phase,
            to_slot: to_slot.into(),
        }
    }

    /// Whether the reference points in a permitted direction.
    ///
    /// Targets must be strictly earlier, except that CREATE may reference
    /// its own prior iterations, and may reference EVALUATE while the latest
    /// verdict is NO-GO (`no_go_pending`).
    #[must_use]
    pub fn direction_allowed(&self, no_go_pending: bool) -> bool {
        if self.to_phase < self.from_phase {
            return true;
        }
        match (self.from_phase, self.to_phase) {
            (PhaseId::Create, PhaseId::Create) => true,
            (PhaseId::Create, PhaseId::Evaluate) => no_go_pending,
            _ => false,
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}.{}", self.from_phase, self.to_phase, self.to_slot)
    }
}
