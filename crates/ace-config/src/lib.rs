//! Hierarchical configuration for the ACE workflow engine.
//!
//! Values resolve as CLI arguments > `.ace/config.toml` > built-in defaults,
//! and each effective value remembers its [`ConfigSource`].

mod builder;
mod discovery;
mod model;
mod validation;

pub use builder::ConfigBuilder;
pub use discovery::PROVIDER_ENV;
pub use model::{
    AnthropicConfig, CliArgs, ClaudeConfig, CollaboratorConfig, Config, ConfigSource,
    DEFAULT_AUDIENCE, DEFAULT_COLLABORATOR_TIMEOUT_SECS, DEFAULT_LOCK_TTL_SECS, DEFAULT_PROVIDER,
    Defaults, KNOWN_PROVIDERS, MIN_COLLABORATOR_TIMEOUT_SECS, ScriptedConfig, TemplatesConfig,
};
