//! CLI argument definitions and parsing structures
//!
//! This module defines the command-line interface structure using clap,
//! including the main `Cli` struct and the subcommand enum.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ace_utils::session_id::DEFAULT_SESSION_ID;
use ace_utils::types::PhaseId;

/// workflow - run the ACE method one phase at a time
#[derive(Parser, Debug)]
#[command(name = "workflow")]
#[command(about = "Drive the ACE method (START, ANALYZE, CREATE, EVALUATE, COMMIT) with checked cross-phase references")]
#[command(long_about = r#"
workflow fills the ACE phase templates, checks that every cross-phase
reference points at completed work, renders the prompt for the configured
reasoning collaborator and records each completed phase in a session journal.

EXAMPLES:
  # Open a START draft and fill its slots
  workflow start --template start --audience "product owner"
  workflow fill start "Project Name=Checkout" "Problem Statement=Carts are abandoned"

  # Check references, preview the prompt, then complete the phase
  workflow validate start
  workflow render start --dry-run
  workflow render start

  # Amend an earlier phase
  workflow start --template start --amend

  # Inspect the session
  workflow status --json
  workflow show evaluate

PHASES:
  START → ANALYZE → CREATE (repeatable) → EVALUATE → COMMIT
  A NO-GO verdict from EVALUATE sends the session back to CREATE.

CONFIGURATION:
  Configuration is loaded with precedence: CLI flags > config file > defaults
  Config file is discovered by searching upward from CWD for .ace/config.toml
  Session state lives under ACE_HOME (default: .ace)
"#)]
#[command(version)]
pub struct Cli {
    /// Session to operate on
    #[arg(long, global = true, default_value = DEFAULT_SESSION_ID)]
    pub session: String,

    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Reasoning collaborator: claude-cli, anthropic or scripted
    #[arg(long, global = true)]
    pub provider: Option<String>,

    /// Collaborator timeout in seconds (default: 600, min: 5)
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Take over a stale session lock
    #[arg(long, global = true)]
    pub force: bool,

    /// Directory with `<phase>.md` template overrides
    #[arg(long, global = true)]
    pub templates_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open a draft for the next phase
    ///
    /// EXAMPLES:
    ///   workflow start --template analyze
    ///   workflow start --template start --amend
    Start {
        /// Template (phase) name: start, analyze, create, evaluate, commit
        #[arg(long)]
        template: String,

        /// Audience the phase output is written for
        #[arg(long)]
        audience: Option<String>,

        /// Supersede the latest completed document of this phase (START and ANALYZE only)
        #[arg(long)]
        amend: bool,
    },

    /// Set slot values on an open draft
    ///
    /// EXAMPLES:
    ///   workflow fill analyze "Technical Constraints=Must run on Postgres 15"
    Fill {
        #[arg(value_parser = parse_phase)]
        phase: PhaseId,

        /// `Slot Name=value` pairs; slot names match loosely
        #[arg(value_parser = parse_assignment, required = true)]
        assignments: Vec<(String, String)>,

        /// Change the draft's audience
        #[arg(long)]
        audience: Option<String>,
    },

    /// Resolve the draft and check its cross-phase references
    Validate {
        #[arg(value_parser = parse_phase)]
        phase: PhaseId,
    },

    /// Render the prompt and send it to the collaborator, completing the phase
    Render {
        #[arg(value_parser = parse_phase)]
        phase: PhaseId,

        /// Print the prompt without calling the collaborator
        #[arg(long)]
        dry_run: bool,
    },

    /// Show workflow state, legal next phases, documents and drafts
    Status {
        /// Output canonical JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the latest completed document of a phase
    Show {
        #[arg(value_parser = parse_phase)]
        phase: PhaseId,

        /// Output canonical JSON
        #[arg(long)]
        json: bool,
    },

    /// List templates, or show one template's slots and references
    Templates {
        #[arg(value_parser = parse_phase)]
        phase: Option<PhaseId>,
    },
}

impl Commands {
    /// Name used in error reports.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Fill { .. } => "fill",
            Self::Validate { .. } => "validate",
            Self::Render { .. } => "render",
            Self::Status { .. } => "status",
            Self::Show { .. } => "show",
            Self::Templates { .. } => "templates",
        }
    }
}

fn parse_phase(raw: &str) -> Result<PhaseId, String> {
    raw.parse::<PhaseId>()
        .map_err(|e| format!("{e} (expected one of: start, analyze, create, evaluate, commit)"))
}

/// Split `Slot=value` at the first `=`.
pub(crate) fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((slot, value)) if !slot.trim().is_empty() => {
            Ok((slot.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected `Slot Name=value`, got '{raw}'")),
    }
}

/// Build the clap command (for completions and tests).
#[must_use]
pub fn build_cli() -> clap::Command {
    <Cli as clap::CommandFactory>::command()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn test_fill_parses_assignments() {
        let cli = Cli::try_parse_from([
            "workflow",
            "fill",
            "start",
            "Project Name=Checkout",
            "Problem Statement=a=b",
        ])
        .unwrap();
        match cli.command {
            Commands::Fill {
                phase, assignments, ..
            } => {
                assert_eq!(phase, PhaseId::Start);
                assert_eq!(assignments[1], ("Problem Statement".to_string(), "a=b".to_string()));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(cli.session, DEFAULT_SESSION_ID);
    }

    #[test]
    fn test_bad_assignment_and_phase_are_rejected() {
        assert!(Cli::try_parse_from(["workflow", "fill", "start", "no-equals"]).is_err());
        assert!(Cli::try_parse_from(["workflow", "validate", "design"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "workflow",
            "render",
            "create",
            "--dry-run",
            "--session",
            "checkout",
            "--timeout",
            "30",
        ])
        .unwrap();
        assert_eq!(cli.session, "checkout");
        assert_eq!(cli.timeout, Some(30));
        assert!(matches!(cli.command, Commands::Render { dry_run: true, .. }));
    }

    proptest! {
        #[test]
        fn prop_assignment_splits_at_first_equals(
            slot in "[A-Za-z][A-Za-z ]{0,20}[A-Za-z]",
            value in "[^\n]{0,40}",
        ) {
            let (parsed_slot, parsed_value) = parse_assignment(&format!("{slot}={value}")).unwrap();
            prop_assert_eq!(parsed_slot, slot);
            prop_assert_eq!(parsed_value, value);
        }
    }
}
