//! Reasoning collaborator abstraction
//!
//! The workflow engine hands a fully rendered phase prompt to a
//! [`ReasoningCollaborator`] and stores whatever text comes back. The
//! collaborator's reasoning is opaque; backends only move text.
//!
//! Backends:
//! - `claude-cli`: runs `claude -p` with the prompt on stdin
//! - `anthropic`: Anthropic Messages API over HTTP
//! - `scripted`: fixed or queued responses, for tests and offline runs
//!
//! Timeouts and cancellation are applied by the caller around
//! [`ReasoningCollaborator::render`]; a dropped call kills any child process.

mod anthropic;
mod claude_cli;
mod scripted;

use std::sync::Arc;

use async_trait::async_trait;

use ace_config::Config;
pub use ace_utils::error::CollaboratorError;

pub use anthropic::AnthropicCollaborator;
pub use claude_cli::ClaudeCliCollaborator;
pub use scripted::ScriptedCollaborator;

/// The external reasoning service behind one `render` call.
#[async_trait]
pub trait ReasoningCollaborator: Send + Sync {
    /// Provider name recorded on completed documents (e.g. `claude-cli`).
    fn provider(&self) -> &str;

    /// Send a rendered prompt and return the raw response text.
    ///
    /// # Errors
    ///
    /// Returns `CollaboratorError` for transport failures, provider refusals
    /// and empty responses. Failures are never retried here.
    async fn render(&self, prompt: &str) -> Result<String, CollaboratorError>;
}

/// Build the collaborator selected by `[collaborator] provider`.
///
/// # Errors
///
/// Returns `CollaboratorError::Misconfiguration` for an unknown provider or a
/// backend whose settings are incomplete (missing binary, API key, response).
pub fn from_config(config: &Config) -> Result<Arc<dyn ReasoningCollaborator>, CollaboratorError> {
    let provider = config.provider();
    tracing::debug!(provider = %provider, "Constructing reasoning collaborator");
    match provider {
        "claude-cli" => Ok(Arc::new(ClaudeCliCollaborator::from_config(config)?)),
        "anthropic" => Ok(Arc::new(AnthropicCollaborator::from_config(config)?)),
        "scripted" => Ok(Arc::new(ScriptedCollaborator::from_config(config)?)),
        unknown => Err(CollaboratorError::Misconfiguration(format!(
            "Unknown collaborator provider '{unknown}'. Supported providers: {}.",
            ace_config::KNOWN_PROVIDERS.join(", ")
        ))),
    }
}
