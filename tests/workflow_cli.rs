//! End-to-end command flows against an isolated state home.
//!
//! Each test drives the command handlers the way `workflow` invocations
//! would: every call reopens the session from the journal and the saved
//! drafts, and errors are mapped to exit codes through `AceError`.

use std::collections::BTreeMap;

use ace_config::ScriptedConfig;
use ace_engine::test_support::{evaluate_response, sample_inputs, sample_response};
use ace_utils::paths::with_isolated_home;
use ace_workflow::cli::CommandContext;
use ace_workflow::cli::commands::{
    execute_fill_command, execute_render_command, execute_show_command, execute_start_command,
    execute_status_command, execute_templates_command, execute_validate_command,
};
use ace_workflow::{AceError, Config, DraftStore, ExitCode, Journal, PhaseId, WorkflowState};

const SESSION: &str = "checkout";

/// Context whose scripted collaborator answers with `response`.
fn context_answering(response: &str) -> CommandContext {
    let mut config = Config::minimal_for_testing();
    config.collaborator.scripted = Some(ScriptedConfig {
        response: Some(response.to_string()),
        response_file: None,
    });
    CommandContext::new(SESSION.to_string(), config, false)
}

fn assignments(phase: PhaseId) -> Vec<(String, String)> {
    sample_inputs(phase).into_iter().collect()
}

fn exit_code(error: &anyhow::Error) -> ExitCode {
    error
        .downcast_ref::<AceError>()
        .map_or(ExitCode::INTERNAL, AceError::to_exit_code)
}

async fn complete_phase(phase: PhaseId, response: &str) {
    let context = context_answering(response);
    execute_start_command(&context, phase.as_str(), None, false).unwrap();
    execute_fill_command(&context, phase, assignments(phase), None).unwrap();
    execute_validate_command(&context, phase).unwrap();
    execute_render_command(&context, phase, false).await.unwrap();
}

fn replayed_state() -> WorkflowState {
    let context = context_answering("unused");
    let journal = Journal::in_session_dir(&context.session_dir);
    journal.replay(SESSION).unwrap().state()
}

#[tokio::test]
async fn test_full_workflow_through_commit() {
    let _home = with_isolated_home();

    for phase in [PhaseId::Start, PhaseId::Analyze, PhaseId::Create] {
        complete_phase(phase, &sample_response(phase)).await;
    }
    complete_phase(PhaseId::Evaluate, &evaluate_response(true)).await;
    assert_eq!(replayed_state(), WorkflowState::Commit);

    complete_phase(PhaseId::Commit, &sample_response(PhaseId::Commit)).await;
    assert_eq!(replayed_state(), WorkflowState::Done);

    let context = context_answering("unused");
    assert!(context.drafts().list().unwrap().is_empty());
    execute_status_command(&context, true).unwrap();
    execute_show_command(&context, PhaseId::Evaluate, false).unwrap();

    // Nothing may start once COMMIT is done.
    let err = execute_start_command(&context, "create", None, false).unwrap_err();
    assert_eq!(exit_code(&err), ExitCode::USAGE);
}

#[tokio::test]
async fn test_no_go_returns_to_create() {
    let _home = with_isolated_home();

    for phase in [PhaseId::Start, PhaseId::Analyze, PhaseId::Create] {
        complete_phase(phase, &sample_response(phase)).await;
    }
    complete_phase(PhaseId::Evaluate, &evaluate_response(false)).await;
    assert_eq!(replayed_state(), WorkflowState::Create);

    let context = context_answering("unused");
    let err = execute_start_command(&context, "commit", None, false).unwrap_err();
    assert_eq!(exit_code(&err), ExitCode::USAGE);

    complete_phase(PhaseId::Create, &sample_response(PhaseId::Create)).await;
    let session = Journal::in_session_dir(&context.session_dir)
        .replay(SESSION)
        .unwrap();
    let revisit = session.latest(PhaseId::Create).unwrap();
    assert_eq!(revisit.iteration(), 2);
    assert!(
        revisit
            .cross_references()
            .iter()
            .any(|r| r.to_phase == PhaseId::Evaluate && r.to_slot == "Blocking Issues")
    );
}

#[tokio::test]
async fn test_fill_accumulates_over_several_calls() {
    let _home = with_isolated_home();
    let context = context_answering(&sample_response(PhaseId::Start));
    execute_start_command(&context, "start", Some("executives".to_string()), false).unwrap();

    // Only one required slot so far: saved, reported, not an error.
    execute_fill_command(
        &context,
        PhaseId::Start,
        vec![("project name".to_string(), "Checkout".to_string())],
        None,
    )
    .unwrap();
    let draft = context.drafts().load(PhaseId::Start).unwrap().unwrap();
    assert_eq!(draft.inputs.len(), 1);
    assert!(draft.document.is_none());

    execute_fill_command(
        &context,
        PhaseId::Start,
        vec![("Problem Statement".to_string(), "Carts are abandoned".to_string())],
        None,
    )
    .unwrap();
    let draft = context.drafts().load(PhaseId::Start).unwrap().unwrap();
    assert_eq!(draft.inputs.len(), 2);
    assert_eq!(draft.audience.as_deref(), Some("executives"));
    assert!(draft.document.is_some());
}

#[tokio::test]
async fn test_unknown_slot_is_a_validation_error_and_not_saved() {
    let _home = with_isolated_home();
    let context = context_answering("unused");
    execute_start_command(&context, "start", None, false).unwrap();

    let err = execute_fill_command(
        &context,
        PhaseId::Start,
        vec![("Budget".to_string(), "none".to_string())],
        None,
    )
    .unwrap_err();
    assert_eq!(exit_code(&err), ExitCode::VALIDATION);
    match err.downcast_ref::<AceError>() {
        Some(AceError::IncompleteInput { unknown, .. }) => assert_eq!(unknown, &["Budget"]),
        other => panic!("expected IncompleteInput, got {other:?}"),
    }
    let draft = context.drafts().load(PhaseId::Start).unwrap().unwrap();
    assert!(draft.inputs.is_empty());
}

#[tokio::test]
async fn test_missing_blueprint_fails_create_validation() {
    let _home = with_isolated_home();
    complete_phase(PhaseId::Start, &sample_response(PhaseId::Start)).await;
    // ANALYZE answered without an Architecture Blueprint section.
    complete_phase(PhaseId::Analyze, "## Requirements\nEmail token.\n").await;

    let context = context_answering("unused");
    execute_start_command(&context, "create", None, false).unwrap();
    execute_fill_command(&context, PhaseId::Create, assignments(PhaseId::Create), None).unwrap();
    let err = execute_validate_command(&context, PhaseId::Create).unwrap_err();
    assert_eq!(exit_code(&err), ExitCode::VALIDATION);

    // Rendering is refused until validation succeeds.
    let err = execute_render_command(&context, PhaseId::Create, true)
        .await
        .unwrap_err();
    assert_eq!(exit_code(&err), ExitCode::USAGE);
}

#[tokio::test]
async fn test_missing_verdict_keeps_the_draft_validated() {
    let _home = with_isolated_home();
    for phase in [PhaseId::Start, PhaseId::Analyze, PhaseId::Create] {
        complete_phase(phase, &sample_response(phase)).await;
    }

    let context = context_answering("## Assessment\nLooks fine.\n");
    execute_start_command(&context, "evaluate", None, false).unwrap();
    execute_fill_command(&context, PhaseId::Evaluate, assignments(PhaseId::Evaluate), None)
        .unwrap();
    execute_validate_command(&context, PhaseId::Evaluate).unwrap();
    let err = execute_render_command(&context, PhaseId::Evaluate, false)
        .await
        .unwrap_err();
    assert_eq!(exit_code(&err), ExitCode::VALIDATION);

    let draft = DraftStore::new(&context.session_dir)
        .load(PhaseId::Evaluate)
        .unwrap()
        .unwrap();
    assert_eq!(
        draft.document.map(|d| d.status()),
        Some(ace_workflow::DocumentStatus::Validated)
    );
    assert_eq!(replayed_state(), WorkflowState::Evaluate);

    // Retry with a verdict completes without revalidation.
    let context = context_answering(&evaluate_response(true));
    execute_render_command(&context, PhaseId::Evaluate, false)
        .await
        .unwrap();
    assert_eq!(replayed_state(), WorkflowState::Commit);
}

#[tokio::test]
async fn test_amendment_supersedes_start() {
    let _home = with_isolated_home();
    complete_phase(PhaseId::Start, &sample_response(PhaseId::Start)).await;
    complete_phase(PhaseId::Analyze, &sample_response(PhaseId::Analyze)).await;

    let context = context_answering(&sample_response(PhaseId::Start));
    execute_start_command(&context, "start", None, true).unwrap();
    let draft = context.drafts().load(PhaseId::Start).unwrap().unwrap();
    assert!(draft.supersedes.is_some());
    assert_eq!(draft.inputs, sample_inputs(PhaseId::Start));

    execute_fill_command(
        &context,
        PhaseId::Start,
        vec![("Problem Statement".to_string(), "Reset emails are slow".to_string())],
        None,
    )
    .unwrap();
    execute_validate_command(&context, PhaseId::Start).unwrap();
    execute_render_command(&context, PhaseId::Start, false)
        .await
        .unwrap();

    let session = Journal::in_session_dir(&context.session_dir)
        .replay(SESSION)
        .unwrap();
    let starts: Vec<_> = session
        .documents()
        .iter()
        .filter(|d| d.phase() == PhaseId::Start)
        .collect();
    assert_eq!(starts.len(), 2);
    assert!(session.is_superseded(starts[0].id()));
    let latest = session.latest(PhaseId::Start).unwrap();
    assert_eq!(latest.supersedes(), Some(starts[0].id()));
    assert_eq!(latest.lookup("Problem Statement"), Some("Reset emails are slow"));
    // The superseded document is untouched.
    assert_eq!(
        starts[0].filled_slots().get("Problem Statement").map(String::as_str),
        sample_inputs(PhaseId::Start).get("Problem Statement").map(String::as_str)
    );
    assert_eq!(session.state(), WorkflowState::Create);
}

#[tokio::test]
async fn test_mutating_commands_respect_the_session_lock() {
    let _home = with_isolated_home();
    let context = context_answering("unused");
    execute_start_command(&context, "start", None, false).unwrap();

    let held = context.lock().unwrap();
    let err = execute_fill_command(&context, PhaseId::Start, assignments(PhaseId::Start), None)
        .unwrap_err();
    assert_eq!(exit_code(&err), ExitCode::SESSION_BUSY);

    // Read-only commands do not need the lock.
    execute_status_command(&context, false).unwrap();
    drop(held);
    execute_fill_command(&context, PhaseId::Start, assignments(PhaseId::Start), None).unwrap();
}

#[test]
fn test_usage_errors_map_to_exit_code_three() {
    let _home = with_isolated_home();
    let context = context_answering("unused");

    let err = execute_start_command(&context, "design", None, false).unwrap_err();
    assert_eq!(exit_code(&err), ExitCode::USAGE);

    let err = execute_start_command(&context, "analyze", None, false).unwrap_err();
    assert_eq!(exit_code(&err), ExitCode::USAGE);

    let err = execute_validate_command(&context, PhaseId::Start).unwrap_err();
    assert_eq!(exit_code(&err), ExitCode::USAGE);

    let err = execute_show_command(&context, PhaseId::Start, false).unwrap_err();
    assert_eq!(exit_code(&err), ExitCode::USAGE);

    let err = execute_start_command(&context, "create", None, true).unwrap_err();
    assert_eq!(exit_code(&err), ExitCode::USAGE);
}

#[test]
fn test_templates_command_lists_and_describes() {
    let _home = with_isolated_home();
    let context = context_answering("unused");
    execute_templates_command(&context, None).unwrap();
    for phase in PhaseId::ALL {
        execute_templates_command(&context, Some(phase)).unwrap();
    }
}

#[test]
fn test_template_override_directory_is_used() {
    let _home = with_isolated_home();
    let overrides = tempfile::TempDir::new().unwrap();
    std::fs::write(overrides.path().join("start.md"), "not a template").unwrap();

    let mut context = context_answering("unused");
    context.config.templates.dir = Some(overrides.path().to_path_buf());
    let err = execute_templates_command(&context, None).unwrap_err();
    assert_eq!(exit_code(&err), ExitCode::USAGE);
}

#[tokio::test]
async fn test_dry_run_does_not_complete() {
    let _home = with_isolated_home();
    let context = context_answering(&sample_response(PhaseId::Start));
    execute_start_command(&context, "start", None, false).unwrap();
    execute_fill_command(&context, PhaseId::Start, assignments(PhaseId::Start), None).unwrap();
    execute_validate_command(&context, PhaseId::Start).unwrap();
    execute_render_command(&context, PhaseId::Start, true)
        .await
        .unwrap();

    assert_eq!(replayed_state(), WorkflowState::Start);
    let inputs: BTreeMap<String, String> = context
        .drafts()
        .load(PhaseId::Start)
        .unwrap()
        .unwrap()
        .inputs;
    assert_eq!(inputs, sample_inputs(PhaseId::Start));
}
