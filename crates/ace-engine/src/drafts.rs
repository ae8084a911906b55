//! Open drafts persisted between CLI invocations.
//!
//! A draft is working state, not history: it holds the raw inputs gathered so
//! far and, once validated, the Validated document. Drafts are rewritten
//! atomically and deleted when their phase completes.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use ace_phase_api::{DocumentId, PhaseDocument};
use ace_utils::atomic_write::{read_file_normalized, write_file_atomic};
use ace_utils::types::PhaseId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub phase: PhaseId,
    /// Audience requested when the draft was opened; the configured default
    /// applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<DocumentId>,
    /// Latest resolved document, Draft or Validated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<PhaseDocument>,
    pub opened_at: DateTime<Utc>,
}

impl Draft {
    #[must_use]
    pub fn open(phase: PhaseId, audience: Option<String>) -> Self {
        Self {
            phase,
            audience,
            inputs: BTreeMap::new(),
            supersedes: None,
            document: None,
            opened_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DraftStore {
    dir: Utf8PathBuf,
}

impl DraftStore {
    #[must_use]
    pub fn new(session_dir: &Utf8Path) -> Self {
        Self {
            dir: session_dir.join("drafts"),
        }
    }

    fn path(&self, phase: PhaseId) -> Utf8PathBuf {
        self.dir.join(format!("{}.json", phase.as_str()))
    }

    pub fn save(&self, draft: &Draft) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(draft)?;
        write_file_atomic(&self.path(draft.phase), &json)
    }

    pub fn load(&self, phase: PhaseId) -> anyhow::Result<Option<Draft>> {
        let path = self.path(phase);
        if !path.exists() {
            return Ok(None);
        }
        let text = read_file_normalized(&path)?;
        let draft = serde_json::from_str(&text)
            .map_err(|e| anyhow::anyhow!("Draft {path} is not valid JSON: {e}"))?;
        Ok(Some(draft))
    }

    pub fn remove(&self, phase: PhaseId) -> anyhow::Result<()> {
        match std::fs::remove_file(self.path(phase)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(anyhow::anyhow!("Failed to remove draft for {phase}: {e}")),
        }
    }

    /// Every saved draft, in phase order.
    pub fn list(&self) -> anyhow::Result<Vec<Draft>> {
        let mut drafts = Vec::new();
        for phase in PhaseId::ALL {
            if let Some(draft) = self.load(phase)? {
                drafts.push(draft);
            }
        }
        Ok(drafts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &tempfile::TempDir) -> DraftStore {
        DraftStore::new(Utf8Path::from_path(dir.path()).unwrap())
    }

    #[test]
    fn test_save_load_remove() {
        let dir = tempfile::tempdir().unwrap();
        let drafts = store(&dir);
        let mut draft = Draft::open(PhaseId::Analyze, Some("executives".to_string()));
        draft
            .inputs
            .insert("Technical Constraints".to_string(), "Rust".to_string());

        drafts.save(&draft).unwrap();
        assert_eq!(drafts.load(PhaseId::Analyze).unwrap(), Some(draft));
        assert_eq!(drafts.list().unwrap().len(), 1);

        drafts.remove(PhaseId::Analyze).unwrap();
        assert_eq!(drafts.load(PhaseId::Analyze).unwrap(), None);
        drafts.remove(PhaseId::Analyze).unwrap();
    }

    #[test]
    fn test_garbage_draft_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let drafts = store(&dir);
        std::fs::create_dir_all(dir.path().join("drafts")).unwrap();
        std::fs::write(dir.path().join("drafts").join("start.json"), "nope").unwrap();
        assert!(drafts.load(PhaseId::Start).is_err());
    }
}
