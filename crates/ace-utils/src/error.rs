use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::types::{DocumentStatus, PhaseId};
pub use ace_lock::LockError;

/// Library-level error type with rich context and user-friendly reporting.
///
/// `AceError` is returned by every engine operation. It provides:
/// - Detailed error information for programmatic handling
/// - User-friendly messages with context and suggestions
/// - Mapping to CLI exit codes for consistent error reporting
///
/// # Exit Code Mapping
///
/// | Exit Code | Error Type |
/// |-----------|------------|
/// | 1 | Incomplete input, reference issues, missing verdict |
/// | 2 | Reasoning collaborator failures |
/// | 3 | Unknown template, illegal transition, ordering, configuration |
/// | 4 | Session busy |
/// | 70 | Journal, IO and other internal failures |
///
/// Validation errors are always batched: `IncompleteInput` lists every
/// missing slot and `ReferenceValidationFailed` every broken reference.
///
/// # Example
///
/// ```rust
/// use ace_utils::error::AceError;
/// use ace_utils::exit_codes::ExitCode;
/// use ace_utils::types::PhaseId;
///
/// let err = AceError::IncompleteInput {
///     phase: PhaseId::Start,
///     missing: vec!["Essential Outcomes".to_string()],
///     unknown: vec![],
/// };
/// assert_eq!(err.to_exit_code(), ExitCode::VALIDATION);
/// assert!(err.display_for_user().contains("Essential Outcomes"));
/// ```
#[derive(Error, Debug)]
pub enum AceError {
    #[error("Template not found: '{name}'")]
    TemplateNotFound { name: String },

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Incomplete input for {phase}: {} missing, {} unknown", .missing.len(), .unknown.len())]
    IncompleteInput {
        phase: PhaseId,
        missing: Vec<String>,
        unknown: Vec<String>,
    },

    #[error("Reference validation failed for {phase}: {} issue(s)", .issues.len())]
    ReferenceValidationFailed {
        phase: PhaseId,
        issues: Vec<ReferenceIssue>,
    },

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Session '{session}' is busy: {detail}")]
    SessionBusy { session: String, detail: String },

    #[error("Reasoning collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Session journal error: {0}")]
    Journal(#[from] JournalError),

    #[error("Session ID validation error: {0}")]
    SessionId(#[from] SessionIdError),

    #[error("Session lock error: {0}")]
    Lock(LockError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl From<LockError> for AceError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::ConcurrentExecution {
                session_id,
                pid,
                created_ago,
            } => AceError::SessionBusy {
                session: session_id,
                detail: format!("held by PID {pid} for {created_ago}"),
            },
            other => AceError::Lock(other),
        }
    }
}

/// Trait for providing user-friendly error reporting with context and suggestions
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get contextual information about the error
    fn context(&self) -> Option<String>;

    /// Get suggested actions to resolve the error
    fn suggestions(&self) -> Vec<String>;

    /// Get the error category for grouping similar errors
    fn category(&self) -> ErrorCategory;
}

/// Categories of errors for better organization and handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Template,
    Input,
    Validation,
    Workflow,
    Collaborator,
    Concurrency,
    FileSystem,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuration"),
            Self::Template => write!(f, "Template"),
            Self::Input => write!(f, "Input"),
            Self::Validation => write!(f, "Validation"),
            Self::Workflow => write!(f, "Workflow"),
            Self::Collaborator => write!(f, "Reasoning Collaborator"),
            Self::Concurrency => write!(f, "Concurrency"),
            Self::FileSystem => write!(f, "File System"),
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file: {0}")]
    InvalidFile(String),

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found at {path}")]
    NotFound { path: String },

    #[error("Configuration discovery failed: {reason}")]
    DiscoveryFailed { reason: String },

    #[error("Configuration validation failed: {} errors", .errors.len())]
    ValidationFailed { errors: Vec<String> },
}

impl UserFriendlyError for ConfigError {
    fn user_message(&self) -> String {
        match self {
            Self::InvalidFile(reason) => format!("Configuration file has invalid format: {reason}"),
            Self::InvalidValue { key, value } => {
                format!("Configuration '{key}' has invalid value: {value}")
            }
            Self::NotFound { path } => format!("Configuration file not found: {path}"),
            Self::DiscoveryFailed { reason } => {
                format!("Failed to discover configuration: {reason}")
            }
            Self::ValidationFailed { errors } => format!(
                "Configuration validation failed with {} errors: {}",
                errors.len(),
                errors.join(", ")
            ),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::InvalidFile(_) | Self::ValidationFailed { .. } => Some(
                "Configuration files are TOML with optional [defaults], [templates] and [collaborator] sections."
                    .to_string(),
            ),
            Self::InvalidValue { key, .. } => Some(format!(
                "The '{key}' configuration option has specific format requirements."
            )),
            Self::NotFound { .. } | Self::DiscoveryFailed { .. } => Some(
                "workflow searches for .ace/config.toml starting from the current directory upward."
                    .to_string(),
            ),
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidFile(_) => vec![
                "Check the TOML syntax of .ace/config.toml".to_string(),
                "Remove unknown keys; the configuration schema is strict".to_string(),
            ],
            Self::InvalidValue { key, .. } => match key.as_str() {
                "collaborator_timeout" => vec![
                    "Use a whole number of seconds, at least 5".to_string(),
                ],
                "provider" => vec![
                    "Use 'claude-cli', 'anthropic' or 'scripted'".to_string(),
                ],
                _ => vec![
                    "Remove the option to use the default value".to_string(),
                ],
            },
            Self::NotFound { .. } => vec![
                "Check the path passed to --config".to_string(),
                "Omit --config to use discovery and built-in defaults".to_string(),
            ],
            Self::DiscoveryFailed { .. } => vec![
                "Check read permissions on the current and parent directories".to_string(),
                "Use --config <path> to specify the configuration file explicitly".to_string(),
            ],
            Self::ValidationFailed { errors } => errors
                .iter()
                .map(|e| format!("Fix: {e}"))
                .collect(),
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

// ============================================================================
// Templates
// ============================================================================

/// Errors raised while loading or parsing a phase template
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Template '{source_name}' has no front matter block")]
    MissingFrontMatter { source_name: String },

    #[error("Template '{source_name}' has invalid front matter: {reason}")]
    InvalidFrontMatter { source_name: String, reason: String },

    #[error("Template '{source_name}' declares phase '{found}' but was loaded as {expected}")]
    PhaseMismatch {
        source_name: String,
        expected: PhaseId,
        found: String,
    },

    #[error("Template '{source_name}' is missing section '{section}'")]
    MissingSection {
        source_name: String,
        section: String,
    },

    #[error("Template '{source_name}' declares slot '{slot}' more than once")]
    DuplicateSlot { source_name: String, slot: String },

    #[error("Template '{source_name}' uses marker [{marker}] with no declared slot")]
    UndeclaredMarker { source_name: String, marker: String },

    #[error("Template '{source_name}' declares slot '{slot}' but never uses its marker")]
    UnusedSlot { source_name: String, slot: String },

    #[error("Template '{source_name}' has an invalid reference rule: {reason}")]
    InvalidReferenceRule { source_name: String, reason: String },

    #[error("Failed to read template '{source_name}': {reason}")]
    Unreadable { source_name: String, reason: String },
}

impl UserFriendlyError for TemplateError {
    fn user_message(&self) -> String {
        self.to_string()
    }

    fn context(&self) -> Option<String> {
        Some(
            "Templates are markdown files with a +++ TOML front matter block followed by SECTION 1: USER INPUTS, SECTION 2: AI INSTRUCTIONS and SECTION 3: EXPECTED OUTPUT STRUCTURE. Every [Slot] marker in section 1 must be declared in the front matter and vice versa."
                .to_string(),
        )
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::MissingFrontMatter { .. } | Self::InvalidFrontMatter { .. } => vec![
                "Start the template with a +++ line, TOML front matter, and a closing +++ line"
                    .to_string(),
            ],
            Self::PhaseMismatch { .. } => vec![
                "Make the front matter 'phase' match the template's file name".to_string(),
            ],
            Self::MissingSection { section, .. } => {
                vec![format!("Add a '## {section}' heading to the template")]
            }
            Self::DuplicateSlot { slot, .. } => {
                vec![format!("Remove the duplicate [[slots]] entry for '{slot}'")]
            }
            Self::UndeclaredMarker { marker, .. } => vec![
                format!("Declare a [[slots]] entry named '{marker}'"),
                "Or remove the bracketed text from SECTION 1".to_string(),
            ],
            Self::UnusedSlot { slot, .. } => vec![format!(
                "Add the marker [{slot}] to SECTION 1 or drop the slot declaration"
            )],
            Self::InvalidReferenceRule { .. } => vec![
                "References may only point at earlier phases, except CREATE iterations and EVALUATE blocking issues"
                    .to_string(),
            ],
            Self::Unreadable { .. } => vec![
                "Check the [templates] dir setting and file permissions".to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Unreadable { .. } => ErrorCategory::FileSystem,
            _ => ErrorCategory::Template,
        }
    }
}

// ============================================================================
// Reference validation
// ============================================================================

/// One broken cross-phase reference found by the dependency validator
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReferenceIssue {
    /// The target phase has no Complete document yet
    Dangling {
        from: PhaseId,
        to: PhaseId,
        slot: String,
    },
    /// The target document exists but the slot is missing or blank
    Empty {
        from: PhaseId,
        to: PhaseId,
        slot: String,
    },
    /// The reference points forward, or sideways outside the allowed loops
    IllegalDirection {
        from: PhaseId,
        to: PhaseId,
        slot: String,
    },
}

impl ReferenceIssue {
    /// `PHASE.Slot` form used in messages.
    #[must_use]
    pub fn target(&self) -> String {
        let (to, slot) = match self {
            Self::Dangling { to, slot, .. }
            | Self::Empty { to, slot, .. }
            | Self::IllegalDirection { to, slot, .. } => (to, slot),
        };
        format!("{to}.{slot}")
    }
}

impl fmt::Display for ReferenceIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dangling { from, to, .. } => write!(
                f,
                "DanglingReference: {from} -> {}: {to} has no completed document",
                self.target()
            ),
            Self::Empty { from, to, .. } => write!(
                f,
                "EmptyReference: {from} -> {}: the value is missing or blank in the latest {to} document",
                self.target()
            ),
            Self::IllegalDirection { from, .. } => write!(
                f,
                "IllegalReference: {from} -> {}: references must point at earlier phases",
                self.target()
            ),
        }
    }
}

// ============================================================================
// Workflow state machine
// ============================================================================

/// State machine and document lifecycle errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: PhaseId },

    #[error("Cannot {operation} {phase} document while it is {status}")]
    OutOfOrder {
        phase: PhaseId,
        operation: String,
        status: DocumentStatus,
    },

    #[error("No open draft for {phase}")]
    NoDraft { phase: PhaseId },

    #[error("No completed {phase} document")]
    NotCompleted { phase: PhaseId },

    #[error("{phase} response did not contain a GO or NO-GO verdict")]
    MissingVerdict { phase: PhaseId },

    #[error("{phase} returned NO-GO without any Blocking Issues")]
    MissingBlockingIssues { phase: PhaseId },

    #[error("{phase} document {document} is {status} and cannot {operation}")]
    DocumentState {
        phase: PhaseId,
        document: String,
        status: DocumentStatus,
        operation: String,
    },
}

impl UserFriendlyError for WorkflowError {
    fn user_message(&self) -> String {
        match self {
            Self::InvalidTransition { from, to } => {
                format!("{to} cannot be started from the current state ({from})")
            }
            Self::OutOfOrder {
                phase,
                operation,
                status,
            } => format!("Cannot {operation} the {phase} document: it is still {status}"),
            Self::NoDraft { phase } => format!("There is no open {phase} draft"),
            Self::NotCompleted { phase } => format!("{phase} has not been completed in this session"),
            Self::MissingBlockingIssues { phase } => {
                format!("The {phase} response said NO-GO but listed no blocking issues")
            }
            Self::MissingVerdict { phase } => {
                format!("The {phase} response did not state a verdict")
            }
            Self::DocumentState {
                phase,
                document,
                status,
                operation,
            } => format!("{phase} document {document} is {status}; it cannot {operation}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::InvalidTransition { .. } => Some(
                "Phases run START, ANALYZE, CREATE (repeatable), EVALUATE, COMMIT. A NO-GO verdict sends the workflow back to CREATE; only GO unlocks COMMIT."
                    .to_string(),
            ),
            Self::OutOfOrder { .. } => Some(
                "Each document moves Draft -> Validated -> Rendered -> Complete. Validation is never performed implicitly."
                    .to_string(),
            ),
            Self::NoDraft { .. } | Self::NotCompleted { .. } => None,
            Self::MissingBlockingIssues { .. } => Some(
                "The CREATE revisit after a NO-GO must address the 'Blocking Issues' section, so it cannot be blank."
                    .to_string(),
            ),
            Self::MissingVerdict { .. } => Some(
                "EVALUATE output must contain a line such as 'Verdict: GO' or 'Verdict: NO-GO'."
                    .to_string(),
            ),
            Self::DocumentState { .. } => {
                Some("Completed documents are immutable; amendments create a superseding document.".to_string())
            }
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidTransition { .. } => vec![
                "Run 'workflow status' to see which phases may start next".to_string(),
            ],
            Self::OutOfOrder { phase, status, .. } => match status {
                DocumentStatus::Draft => vec![format!(
                    "Run 'workflow validate {}' first",
                    phase.as_str()
                )],
                _ => vec!["Run 'workflow status' to inspect the draft".to_string()],
            },
            Self::NoDraft { phase } => vec![format!(
                "Run 'workflow start --template {}' to open a draft",
                phase.as_str()
            )],
            Self::NotCompleted { .. } => vec![
                "Run 'workflow status' to list the completed documents".to_string(),
            ],
            Self::MissingBlockingIssues { phase } => vec![format!(
                "Re-run 'workflow render {}'; the document is still validated",
                phase.as_str()
            )],
            Self::MissingVerdict { phase } => vec![format!(
                "Re-run 'workflow render {}'; the document is still validated",
                phase.as_str()
            )],
            Self::DocumentState { phase, .. } => vec![format!(
                "Use 'workflow start --template {} --amend' to supersede it",
                phase.as_str()
            )],
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::MissingVerdict { .. } | Self::MissingBlockingIssues { .. } => {
                ErrorCategory::Validation
            }
            _ => ErrorCategory::Workflow,
        }
    }
}

// ============================================================================
// Reasoning collaborator
// ============================================================================

/// Errors surfaced verbatim from the reasoning collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    /// Transport-level failure (process spawn, HTTP connectivity)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The provider answered but refused or rejected the request
    #[error("Request refused: {0}")]
    Refused(String),

    /// Provider authentication failure (401, 403, missing API key)
    #[error("Provider authentication error: {0}")]
    ProviderAuth(String),

    /// Provider quota/rate limit exceeded (429)
    #[error("Provider quota exceeded: {0}")]
    ProviderQuota(String),

    /// Provider service outage (5xx errors)
    #[error("Provider outage: {0}")]
    ProviderOutage(String),

    #[error("Timeout after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Cancelled before a response arrived")]
    Cancelled,

    #[error("Collaborator returned an empty response")]
    EmptyResponse,

    #[error("Misconfiguration: {0}")]
    Misconfiguration(String),
}

impl UserFriendlyError for CollaboratorError {
    fn user_message(&self) -> String {
        match self {
            Self::Transport(msg) => format!("Collaborator transport error: {msg}"),
            Self::Refused(msg) => format!("Collaborator refused the request: {msg}"),
            Self::ProviderAuth(msg) => format!("Collaborator authentication failed: {msg}"),
            Self::ProviderQuota(msg) => format!("Collaborator quota exceeded: {msg}"),
            Self::ProviderOutage(msg) => format!("Collaborator service outage: {msg}"),
            Self::Timeout { duration } => {
                format!("Collaborator did not answer within {}s", duration.as_secs())
            }
            Self::Cancelled => "The collaborator call was cancelled".to_string(),
            Self::EmptyResponse => "The collaborator returned an empty response".to_string(),
            Self::Misconfiguration(msg) => format!("Collaborator configuration error: {msg}"),
        }
    }

    fn context(&self) -> Option<String> {
        Some(
            "The phase document stays validated; nothing was added to the session. Re-running render retries without repeating validation."
                .to_string(),
        )
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Transport(_) => vec![
                "Check that the provider binary is installed and in PATH".to_string(),
                "Verify network connectivity for HTTP providers".to_string(),
            ],
            Self::Refused(_) => vec![
                "Inspect the rendered prompt with 'workflow render <phase> --dry-run'".to_string(),
            ],
            Self::ProviderAuth(_) => vec![
                "Check that the API key environment variable is set".to_string(),
            ],
            Self::ProviderQuota(_) | Self::ProviderOutage(_) => {
                vec!["Wait a few minutes and try again".to_string()]
            }
            Self::Timeout { .. } => vec![
                "Increase --timeout or [defaults] collaborator_timeout".to_string(),
            ],
            Self::Cancelled | Self::EmptyResponse => vec!["Retry the render".to_string()],
            Self::Misconfiguration(_) => vec![
                "Check the [collaborator] section of .ace/config.toml".to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Misconfiguration(_) | Self::ProviderAuth(_) => ErrorCategory::Configuration,
            _ => ErrorCategory::Collaborator,
        }
    }
}

// ============================================================================
// Journal
// ============================================================================

/// Errors reading or appending the session journal
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("Journal {path} line {line} is corrupt: {reason}")]
    Corrupt {
        path: String,
        line: usize,
        reason: String,
    },

    #[error("Journal {path} references unknown document {document}")]
    UnknownDocument { path: String, document: String },

    #[error("Failed to append to journal {path}: {reason}")]
    AppendFailed { path: String, reason: String },
}

impl UserFriendlyError for JournalError {
    fn user_message(&self) -> String {
        self.to_string()
    }

    fn context(&self) -> Option<String> {
        Some("The journal is the append-only record of completed documents for a session.".to_string())
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Corrupt { line, .. } => vec![format!(
                "Restore the journal from version control or remove line {line} and everything after it"
            )],
            Self::UnknownDocument { .. } => {
                vec!["The journal was edited by hand; restore it from a backup".to_string()]
            }
            Self::AppendFailed { .. } => {
                vec!["Check free disk space and permissions on the session directory".to_string()]
            }
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::FileSystem
    }
}

// ============================================================================
// Session IDs and locks
// ============================================================================

/// Error type for session ID validation failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionIdError {
    #[error("Session ID is empty after sanitization")]
    Empty,

    #[error("Session ID contains only invalid characters")]
    OnlyInvalidCharacters,
}

impl UserFriendlyError for SessionIdError {
    fn user_message(&self) -> String {
        match self {
            Self::Empty => "The session ID is empty".to_string(),
            Self::OnlyInvalidCharacters => {
                "The session ID contains no alphanumeric characters, dots or dashes".to_string()
            }
        }
    }

    fn context(&self) -> Option<String> {
        Some("Session IDs name a directory under the state home. Only ASCII alphanumerics, '.', '-' and '_' are kept.".to_string())
    }

    fn suggestions(&self) -> Vec<String> {
        vec!["Example: --session checkout-redesign".to_string()]
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Input
    }
}

impl UserFriendlyError for LockError {
    fn user_message(&self) -> String {
        match self {
            Self::ConcurrentExecution {
                session_id, pid, ..
            } => format!("Session '{session_id}' is being modified by process {pid}"),
            Self::StaleLock {
                session_id,
                pid,
                age_secs,
            } => format!(
                "Session '{session_id}' has a stale lock from process {pid} ({age_secs}s old)"
            ),
            Self::CorruptedLock { reason } => format!("Session lock file is corrupted: {reason}"),
            Self::AcquisitionFailed { reason } => format!("Could not lock the session: {reason}"),
            Self::ReleaseFailed { reason } => format!("Could not unlock the session: {reason}"),
            Self::Io(e) => format!("Session lock IO error: {e}"),
        }
    }

    fn context(&self) -> Option<String> {
        Some("Only one workflow process may transition a session at a time.".to_string())
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::ConcurrentExecution { .. } => {
                vec!["Wait for the other command to finish, then retry".to_string()]
            }
            Self::StaleLock { .. } | Self::CorruptedLock { .. } => {
                vec!["Re-run the command with --force to take over the lock".to_string()]
            }
            _ => vec!["Check permissions on the session directory".to_string()],
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::ConcurrentExecution { .. } | Self::StaleLock { .. } => {
                ErrorCategory::Concurrency
            }
            _ => ErrorCategory::FileSystem,
        }
    }
}

// ============================================================================
// Top-level reporting
// ============================================================================

impl UserFriendlyError for AceError {
    fn user_message(&self) -> String {
        match self {
            Self::TemplateNotFound { name } => format!("No template named '{name}'"),
            Self::Template(e) => e.user_message(),
            Self::IncompleteInput {
                phase,
                missing,
                unknown,
            } => {
                let mut parts = Vec::new();
                if !missing.is_empty() {
                    parts.push(format!("missing required slot(s): {}", missing.join(", ")));
                }
                if !unknown.is_empty() {
                    parts.push(format!("unknown slot(s): {}", unknown.join(", ")));
                }
                format!("{phase} input is incomplete: {}", parts.join("; "))
            }
            Self::ReferenceValidationFailed { phase, issues } => {
                let lines: Vec<String> = issues.iter().map(|i| format!("  - {i}")).collect();
                format!(
                    "{phase} has {} broken reference(s):\n{}",
                    issues.len(),
                    lines.join("\n")
                )
            }
            Self::Workflow(e) => e.user_message(),
            Self::SessionBusy { session, detail } => {
                format!("Session '{session}' is busy ({detail})")
            }
            Self::Collaborator(e) => e.user_message(),
            Self::Config(e) => e.user_message(),
            Self::Journal(e) => e.user_message(),
            Self::SessionId(e) => e.user_message(),
            Self::Lock(e) => e.user_message(),
            Self::Io(e) => format!("File system error: {e}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::TemplateNotFound { .. } => Some(
                "Templates exist for start, analyze, create, evaluate and commit.".to_string(),
            ),
            Self::Template(e) => e.context(),
            Self::IncompleteInput { .. } => Some(
                "A slot left blank or still holding its placeholder text counts as unfilled."
                    .to_string(),
            ),
            Self::ReferenceValidationFailed { .. } => Some(
                "Later phases must build on completed earlier phases; references resolve against the most recent completed document of each phase."
                    .to_string(),
            ),
            Self::Workflow(e) => e.context(),
            Self::SessionBusy { .. } => {
                Some("Transitions on one session are serialized.".to_string())
            }
            Self::Collaborator(e) => e.context(),
            Self::Config(e) => e.context(),
            Self::Journal(e) => e.context(),
            Self::SessionId(e) => e.context(),
            Self::Lock(e) => e.context(),
            Self::Io(_) => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::TemplateNotFound { .. } => {
                vec!["Run 'workflow templates' to list the available phases".to_string()]
            }
            Self::Template(e) => e.suggestions(),
            Self::IncompleteInput {
                phase,
                missing,
                unknown,
            } => {
                let mut out: Vec<String> = missing
                    .iter()
                    .map(|slot| format!("workflow fill {} \"{slot}=...\"", phase.as_str()))
                    .collect();
                if !unknown.is_empty() {
                    out.push(format!(
                        "Run 'workflow templates {}' to see the declared slots",
                        phase.as_str()
                    ));
                }
                out
            }
            Self::ReferenceValidationFailed { issues, .. } => issues
                .iter()
                .map(|issue| match issue {
                    ReferenceIssue::Dangling { to, .. } => {
                        format!("Complete the {to} phase first")
                    }
                    ReferenceIssue::Empty { to, slot, .. } => {
                        format!("Provide '{slot}' in {to} (amend it if already completed)")
                    }
                    ReferenceIssue::IllegalDirection { .. } => {
                        "Fix the template's [[references]] declarations".to_string()
                    }
                })
                .collect(),
            Self::Workflow(e) => e.suggestions(),
            Self::SessionBusy { .. } => {
                vec!["Retry after the current transition finishes".to_string()]
            }
            Self::Collaborator(e) => e.suggestions(),
            Self::Config(e) => e.suggestions(),
            Self::Journal(e) => e.suggestions(),
            Self::SessionId(e) => e.suggestions(),
            Self::Lock(e) => e.suggestions(),
            Self::Io(_) => vec!["Check permissions on the state directory (ACE_HOME)".to_string()],
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::TemplateNotFound { .. } => ErrorCategory::Template,
            Self::Template(e) => e.category(),
            Self::IncompleteInput { .. } => ErrorCategory::Input,
            Self::ReferenceValidationFailed { .. } => ErrorCategory::Validation,
            Self::Workflow(e) => e.category(),
            Self::SessionBusy { .. } => ErrorCategory::Concurrency,
            Self::Collaborator(e) => e.category(),
            Self::Config(e) => e.category(),
            Self::Journal(e) => e.category(),
            Self::SessionId(e) => e.category(),
            Self::Lock(e) => e.category(),
            Self::Io(_) => ErrorCategory::FileSystem,
        }
    }
}

impl AceError {
    /// Get a user-friendly error message with context and actionable suggestions
    #[must_use]
    pub fn display_for_user(&self) -> String {
        let mut output = format!("Error: {}\n", self.user_message());

        if let Some(ctx) = self.context() {
            output.push_str(&format!("\nContext: {ctx}\n"));
        }

        let suggestions = self.suggestions();
        if !suggestions.is_empty() {
            output.push_str("\nSuggestions:\n");
            for suggestion in suggestions {
                output.push_str(&format!("  • {suggestion}\n"));
            }
        }

        output
    }

    /// Whether the caller can fix the problem and retry the same operation.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::IncompleteInput { .. }
                | Self::ReferenceValidationFailed { .. }
                | Self::Workflow(_)
                | Self::SessionBusy { .. }
                | Self::Collaborator(_)
        )
    }

    /// Map this error to the CLI exit code.
    ///
    /// This is the single source of truth for process exit codes.
    #[must_use]
    pub fn to_exit_code(&self) -> crate::exit_codes::ExitCode {
        use crate::exit_codes::ExitCode;

        match self {
            Self::IncompleteInput { .. } | Self::ReferenceValidationFailed { .. } => {
                ExitCode::VALIDATION
            }
            Self::Workflow(
                WorkflowError::MissingVerdict { .. } | WorkflowError::MissingBlockingIssues { .. },
            ) => ExitCode::VALIDATION,
            Self::Workflow(_) => ExitCode::USAGE,

            Self::Collaborator(CollaboratorError::Misconfiguration(_)) => ExitCode::USAGE,
            Self::Collaborator(_) => ExitCode::COLLABORATOR,

            Self::TemplateNotFound { .. }
            | Self::Template(_)
            | Self::Config(_)
            | Self::SessionId(_) => ExitCode::USAGE,

            Self::SessionBusy { .. } => ExitCode::SESSION_BUSY,
            Self::Lock(LockError::StaleLock { .. } | LockError::CorruptedLock { .. }) => {
                ExitCode::SESSION_BUSY
            }

            Self::Journal(_) | Self::Lock(_) | Self::Io(_) => ExitCode::INTERNAL,
        }
    }
}
