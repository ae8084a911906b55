use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Phase identifiers for the ACE document chain.
///
/// Phases are totally ordered; a document may only depend on documents of
/// earlier phases, with the CREATE and NO-GO exceptions handled by the
/// engine.
///
/// ```text
/// Start → Analyze → Create (×N) → Evaluate → Commit
/// ```
///
/// # Example
///
/// ```rust
/// use ace_utils::types::PhaseId;
///
/// let phase: PhaseId = "analyze".parse().unwrap();
/// assert_eq!(phase, PhaseId::Analyze);
/// assert_eq!(phase.display_name(), "ANALYZE");
/// assert!(PhaseId::Start < PhaseId::Analyze);
/// ```
///
/// # Serialization
///
/// `PhaseId` serializes to its lowercase name (e.g., `"start"`, `"evaluate"`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PhaseId {
    /// START: frames the problem and the essential outcomes.
    Start,
    /// ANALYZE: turns outcomes into constraints and an architecture blueprint.
    Analyze,
    /// CREATE: produces the artifact; may be iterated.
    Create,
    /// EVALUATE: judges the latest CREATE output and issues a GO/NO-GO verdict.
    Evaluate,
    /// COMMIT: finalizes the accepted work.
    Commit,
}

impl PhaseId {
    /// All phases in workflow order.
    pub const ALL: [PhaseId; 5] = [
        PhaseId::Start,
        PhaseId::Analyze,
        PhaseId::Create,
        PhaseId::Evaluate,
        PhaseId::Commit,
    ];

    /// Canonical lowercase name used in file names, journals and the CLI.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Analyze => "analyze",
            Self::Create => "create",
            Self::Evaluate => "evaluate",
            Self::Commit => "commit",
        }
    }

    /// Upper-case name as the methodology writes it.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::Analyze => "ANALYZE",
            Self::Create => "CREATE",
            Self::Evaluate => "EVALUATE",
            Self::Commit => "COMMIT",
        }
    }

    /// Zero-based position in workflow order.
    #[must_use]
    pub const fn ordinal(&self) -> usize {
        match self {
            Self::Start => 0,
            Self::Analyze => 1,
            Self::Create => 2,
            Self::Evaluate => 3,
            Self::Commit => 4,
        }
    }
}

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Returned when a string does not name one of the five phases.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown phase '{0}'")]
pub struct UnknownPhase(pub String);

impl FromStr for PhaseId {
    type Err = UnknownPhase;

    /// Case-insensitive; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        PhaseId::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownPhase(s.to_string()))
    }
}

/// Lifecycle of a phase document. Moves forward only, except that a
/// Rendered document falls back to Validated when the collaborator fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Draft,
    Validated,
    Rendered,
    Complete,
}

impl DocumentStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Validated => "validated",
            Self::Rendered => "rendered",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an EVALUATE phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "GO")]
    Go,
    #[serde(rename = "NO-GO")]
    NoGo,
}

impl Verdict {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Go => "GO",
            Self::NoGo => "NO-GO",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order_matches_ordinal() {
        for pair in PhaseId::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
            assert_eq!(pair[0].ordinal() + 1, pair[1].ordinal());
        }
    }

    #[test]
    fn test_phase_parse_is_case_insensitive() {
        assert_eq!("CREATE".parse::<PhaseId>().unwrap(), PhaseId::Create);
        assert_eq!(" Evaluate ".parse::<PhaseId>().unwrap(), PhaseId::Evaluate);
        assert_eq!(
            "design".parse::<PhaseId>().unwrap_err(),
            UnknownPhase("design".to_string())
        );
    }

    #[test]
    fn test_phase_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&PhaseId::Commit).unwrap(),
            "\"commit\""
        );
        let back: PhaseId = serde_json::from_str("\"analyze\"").unwrap();
        assert_eq!(back, PhaseId::Analyze);
    }

    #[test]
    fn test_verdict_wire_names() {
        assert_eq!(serde_json::to_string(&Verdict::NoGo).unwrap(), "\"NO-GO\"");
        assert_eq!(Verdict::Go.to_string(), "GO");
    }
}
