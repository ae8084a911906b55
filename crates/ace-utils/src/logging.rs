//! Structured logging for the workflow engine
//!
//! Everything goes through `tracing`. The CLI installs a subscriber once via
//! [`init_tracing`]; library code only emits spans and events.

use tracing::{Level, info, span, warn};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Filter used when `RUST_LOG` is unset.
#[must_use]
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "ace_workflow=debug,ace_utils=debug,ace_engine=debug,ace_templates=debug,ace_llm=debug,ace_config=debug,info"
    } else {
        "ace_workflow=info,ace_utils=info,ace_engine=info,ace_templates=info,ace_llm=info,ace_config=info,warn"
    }
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` always wins. Otherwise `verbose` selects debug-level output
/// with span timings; the default is compact info-level output. Logs go to
/// stderr so stdout stays clean for `--json` output.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter(verbose)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_line_number(false)
        .with_file(false)
        .compact();

    if verbose {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer.with_target(true).with_span_events(FmtSpan::CLOSE))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer.with_target(false))
            .try_init()?;
    }

    Ok(())
}

/// Span wrapping one phase transition.
#[must_use]
pub fn transition_span(session: &str, phase: &str, operation: &str) -> tracing::Span {
    span!(
        Level::INFO,
        "transition",
        session = %session,
        phase = %phase,
        operation = %operation,
    )
}

pub fn log_phase_complete(session: &str, phase: &str, document: &str, duration_ms: u128) {
    info!(
        session = %session,
        phase = %phase,
        document = %document,
        duration_ms = %duration_ms,
        "Phase completed"
    );
}

pub fn log_collaborator_failure(session: &str, phase: &str, error: &str, duration_ms: u128) {
    warn!(
        session = %session,
        phase = %phase,
        error = %error,
        duration_ms = %duration_ms,
        "Collaborator call failed; document left validated"
    );
}
