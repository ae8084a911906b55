//! Append-only JSONL journal of completed documents.
//!
//! One canonical JSON record per line. Replaying the journal rebuilds the
//! [`WorkflowSession`] exactly, supersession markers included.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ace_phase_api::{DocumentId, PhaseDocument};
use ace_utils::atomic_write::append_line_synced;
use ace_utils::canonical::emit_jcs;
use ace_utils::error::JournalError;
use ace_utils::types::DocumentStatus;

use crate::session::WorkflowSession;

pub const JOURNAL_FILE_NAME: &str = "journal.jsonl";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum JournalRecord {
    Complete {
        document: PhaseDocument,
    },
    Superseded {
        document_id: DocumentId,
        superseded_by: DocumentId,
        at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone)]
pub struct Journal {
    path: Utf8PathBuf,
}

impl Journal {
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Journal living in a session directory.
    #[must_use]
    pub fn in_session_dir(session_dir: &Utf8Path) -> Self {
        Self::new(session_dir.join(JOURNAL_FILE_NAME))
    }

    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn append(&self, record: &JournalRecord) -> Result<(), JournalError> {
        let line = emit_jcs(record).map_err(|e| self.append_failed(&e))?;
        append_line_synced(&self.path, &line).map_err(|e| self.append_failed(&e))
    }

    fn append_failed(&self, e: &anyhow::Error) -> JournalError {
        JournalError::AppendFailed {
            path: self.path.to_string(),
            reason: format!("{e:#}"),
        }
    }

    /// Read every record in order. A missing file is an empty journal.
    ///
    /// A final line without a trailing newline is an interrupted append and is
    /// dropped with a warning; any other unparsable line is corruption.
    pub fn records(&self) -> Result<Vec<JournalRecord>, JournalError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(JournalError::Corrupt {
                    path: self.path.to_string(),
                    line: 0,
                    reason: format!("unreadable: {e}"),
                });
            }
        };

        let complete_tail = text.ends_with('\n');
        let lines: Vec<&str> = text.lines().collect();
        let mut records = Vec::with_capacity(lines.len());
        for (index, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JournalRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) if index + 1 == lines.len() && !complete_tail => {
                    tracing::warn!(
                        path = %self.path,
                        line = index + 1,
                        error = %e,
                        "Ignoring truncated final journal record"
                    );
                }
                Err(e) => {
                    return Err(JournalError::Corrupt {
                        path: self.path.to_string(),
                        line: index + 1,
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(records)
    }

    /// Rebuild the session recorded in this journal.
    pub fn replay(&self, session_id: &str) -> Result<WorkflowSession, JournalError> {
        let mut session = WorkflowSession::new(session_id);
        for (index, record) in self.records()?.into_iter().enumerate() {
            match record {
                JournalRecord::Complete { document } => {
                    if document.status() != DocumentStatus::Complete {
                        return Err(JournalError::Corrupt {
                            path: self.path.to_string(),
                            line: index + 1,
                            reason: format!(
                                "document {} is recorded as {}",
                                document.id(),
                                document.status()
                            ),
                        });
                    }
                    session.append(document).map_err(|e| JournalError::Corrupt {
                        path: self.path.to_string(),
                        line: index + 1,
                        reason: e.to_string(),
                    })?;
                }
                JournalRecord::Superseded {
                    document_id,
                    superseded_by,
                    at,
                } => {
                    session
                        .record_supersession(document_id, superseded_by, at)
                        .map_err(|unknown| JournalError::UnknownDocument {
                            path: self.path.to_string(),
                            document: unknown.to_string(),
                        })?;
                }
            }
        }
        tracing::debug!(
            path = %self.path,
            documents = session.documents().len(),
            "Journal replayed"
        );
        Ok(session)
    }
}
