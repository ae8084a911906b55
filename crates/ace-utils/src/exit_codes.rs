//! Exit code constants for the `workflow` CLI.
//!
//! # Exit Code Table
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Operation completed successfully |
//! | 1 | `VALIDATION` | Incomplete input, broken references, missing verdict |
//! | 2 | `COLLABORATOR` | Reasoning collaborator failed, timed out or refused |
//! | 3 | `USAGE` | Unknown template, illegal transition, ordering or argument error |
//! | 4 | `SESSION_BUSY` | Another transition holds the session |
//! | 70 | `INTERNAL` | Journal, IO or other internal failure |

/// Type-safe process exit code.
///
/// The numeric values are part of the CLI contract.
///
/// ```rust
/// use ace_utils::exit_codes::ExitCode;
///
/// assert_eq!(ExitCode::SUCCESS.as_i32(), 0);
/// assert_eq!(ExitCode::from_i32(3), ExitCode::USAGE);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    /// Success - operation completed successfully
    pub const SUCCESS: ExitCode = ExitCode(0);

    /// Validation error - the user must fix inputs or complete earlier phases
    pub const VALIDATION: ExitCode = ExitCode(1);

    /// Collaborator error - the reasoning collaborator call failed
    pub const COLLABORATOR: ExitCode = ExitCode(2);

    /// Usage error - bad arguments, unknown template or illegal ordering
    pub const USAGE: ExitCode = ExitCode(3);

    /// Session busy - another transition is in progress for the session
    pub const SESSION_BUSY: ExitCode = ExitCode(4);

    /// Internal error - persistence or unexpected failure
    pub const INTERNAL: ExitCode = ExitCode(70);

    /// Get the numeric exit code value for `std::process::exit()`.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Create an ExitCode from a raw i32 value.
    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }

    /// Stable snake_case name used in JSON error output.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self.0 {
            0 => "success",
            1 => "validation",
            2 => "collaborator",
            3 => "usage",
            4 => "session_busy",
            _ => "internal",
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.0
    }
}
