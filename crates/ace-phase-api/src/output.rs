use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use ace_utils::types::Verdict;

use crate::reference::slot_key;

static HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s{0,3}#{1,3}\s+(.+?)\s*#*\s*$").expect("heading regex is valid")
});

static VERDICT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)^[\s>*_#-]*(?:final\s+)?(?:verdict|recommendation|decision)[\s*_]*:[\s*_`]*(no[\s-]?go|go)\b",
    )
    .expect("verdict regex is valid")
});

/// The collaborator's response to a rendered phase, stored on completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseOutput {
    pub response: String,
    /// Body of each markdown heading in the response, keyed by heading text.
    pub sections: BTreeMap<String, String>,
    pub verdict: Option<Verdict>,
    /// Provider that produced the response.
    pub collaborator: String,
    pub completed_at: DateTime<Utc>,
}

impl PhaseOutput {
    /// Parse a raw response into sections and an optional verdict.
    #[must_use]
    pub fn parse(response: impl Into<String>, collaborator: impl Into<String>) -> Self {
        let response = response.into();
        Self {
            sections: parse_sections(&response),
            verdict: parse_verdict(&response),
            collaborator: collaborator.into(),
            completed_at: Utc::now(),
            response,
        }
    }

    /// Section body by name, matched with [`slot_key`].
    #[must_use]
    pub fn section(&self, name: &str) -> Option<&str> {
        let key = slot_key(name);
        self.sections
            .iter()
            .find(|(heading, _)| slot_key(heading) == key)
            .map(|(_, body)| body.as_str())
    }
}

/// Split markdown into `heading -> body` for `#`, `##` and `###` headings.
///
/// Nested headings end the enclosing section. Repeated headings keep the
/// first occurrence. Text before the first heading is ignored.
#[must_use]
pub fn parse_sections(markdown: &str) -> BTreeMap<String, String> {
    let mut sections = BTreeMap::new();
    let mut current: Option<(String, Vec<&str>)> = None;
    let mut in_fence = false;

    let mut flush = |current: &mut Option<(String, Vec<&str>)>| {
        if let Some((heading, lines)) = current.take() {
            let body = lines.join("\n").trim().to_string();
            sections.entry(heading).or_insert(body);
        }
    };

    for line in markdown.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }
        if !in_fence
            && let Some(caps) = HEADING.captures(line)
        {
            flush(&mut current);
            let heading = caps[1].trim_matches(|c: char| c == '*' || c == '_').trim();
            current = Some((heading.to_string(), Vec::new()));
            continue;
        }
        if let Some((_, lines)) = current.as_mut() {
            lines.push(line);
        }
    }
    flush(&mut current);

    sections
}

/// Find a `Verdict: GO` / `Verdict: NO-GO` line. The last one wins, so a
/// summary verdict overrides earlier discussion.
#[must_use]
pub fn parse_verdict(response: &str) -> Option<Verdict> {
    VERDICT.captures_iter(response).last().map(|caps| {
        let word = caps[1].to_ascii_lowercase();
        if word.starts_with("no") {
            Verdict::NoGo
        } else {
            Verdict::Go
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sections_by_heading() {
        let md = "intro\n## Architecture Blueprint\nlayers\n\nmore\n### Risks\nnone\n# Summary\ndone";
        let sections = parse_sections(md);
        assert_eq!(sections["Architecture Blueprint"], "layers\n\nmore");
        assert_eq!(sections["Risks"], "none");
        assert_eq!(sections["Summary"], "done");
        assert_eq!(sections.len(), 3);
    }

    #[test]
    fn test_headings_inside_code_fences_are_ignored() {
        let md = "## Code\n```\n# not a heading\n```\n";
        let sections = parse_sections(md);
        assert_eq!(sections.len(), 1);
        assert!(sections["Code"].contains("# not a heading"));
    }

    #[test]
    fn test_parse_verdict_variants() {
        assert_eq!(parse_verdict("Verdict: GO"), Some(Verdict::Go));
        assert_eq!(parse_verdict("**Verdict:** NO-GO"), Some(Verdict::NoGo));
        assert_eq!(parse_verdict("- Recommendation: no go"), Some(Verdict::NoGo));
        assert_eq!(parse_verdict("## Verdict: go\n"), Some(Verdict::Go));
        assert_eq!(parse_verdict("We should go ahead"), None);
        assert_eq!(parse_verdict("Verdict: good enough"), None);
    }

    #[test]
    fn test_last_verdict_wins() {
        let text = "Initial verdict: NO-GO\n...fixed...\nFinal verdict: GO";
        assert_eq!(parse_verdict(text), Some(Verdict::Go));
    }

    #[test]
    fn test_section_lookup_uses_slot_key() {
        let out = PhaseOutput::parse("## Blocking Issues\n- missing tests", "scripted");
        assert_eq!(out.section("BlockingIssues"), Some("- missing tests"));
        assert_eq!(out.section("blocking issues"), Some("- missing tests"));
        assert_eq!(out.collaborator, "scripted");
    }
}
