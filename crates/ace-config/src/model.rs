use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Audience used when neither the caller nor the config names one.
pub const DEFAULT_AUDIENCE: &str = "general technical audience";

/// Default collaborator timeout in seconds.
pub const DEFAULT_COLLABORATOR_TIMEOUT_SECS: u64 = 600;

/// Smallest collaborator timeout accepted, in seconds.
pub const MIN_COLLABORATOR_TIMEOUT_SECS: u64 = 5;

/// Largest collaborator timeout accepted, in seconds (2 hours).
pub const MAX_COLLABORATOR_TIMEOUT_SECS: u64 = 7200;

/// Default session lock TTL in seconds.
pub const DEFAULT_LOCK_TTL_SECS: u64 = 900;

/// Provider used when nothing selects one.
pub const DEFAULT_PROVIDER: &str = "claude-cli";

/// Providers understood by the collaborator factory.
pub const KNOWN_PROVIDERS: [&str; 3] = ["claude-cli", "anthropic", "scripted"];

/// Effective configuration for the workflow engine and CLI.
///
/// Precedence: CLI arguments > config file > built-in defaults. Every
/// effective value records where it came from in `source_attribution`.
///
/// # Configuration File Format
///
/// ```toml
/// [defaults]
/// audience = "non-technical manager"
/// collaborator_timeout = 600
/// lock_ttl_seconds = 900
/// verbose = false
///
/// [templates]
/// dir = "templates"
///
/// [collaborator]
/// provider = "anthropic"
///
/// [collaborator.anthropic]
/// model = "claude-sonnet-4-5"
/// api_key_env = "ANTHROPIC_API_KEY"
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub defaults: Defaults,
    pub templates: TemplatesConfig,
    pub collaborator: CollaboratorConfig,
    /// Path of the config file that was loaded, if any.
    pub config_file: Option<PathBuf>,
    /// Source attribution for each setting (for status display).
    pub source_attribution: HashMap<String, ConfigSource>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    pub audience: Option<String>,
    /// Seconds to wait for the reasoning collaborator.
    pub collaborator_timeout: Option<u64>,
    pub lock_ttl_seconds: Option<u64>,
    pub verbose: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TemplatesConfig {
    /// Directory holding `<phase>.md` overrides for the embedded templates.
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CollaboratorConfig {
    /// One of `claude-cli`, `anthropic`, `scripted`.
    pub provider: Option<String>,
    pub claude: Option<ClaudeConfig>,
    pub anthropic: Option<AnthropicConfig>,
    pub scripted: Option<ScriptedConfig>,
}

/// Claude CLI backend settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ClaudeConfig {
    /// Path to the `claude` binary; discovered on PATH when unset.
    pub binary: Option<String>,
    pub model: Option<String>,
}

/// Anthropic Messages API backend settings
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AnthropicConfig {
    pub model: Option<String>,
    /// Environment variable holding the API key (default: `ANTHROPIC_API_KEY`).
    pub api_key_env: Option<String>,
    pub base_url: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// Scripted backend settings, used for dry runs and tests
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptedConfig {
    /// Fixed response returned for every prompt.
    pub response: Option<String>,
    /// Read the response from this file instead.
    pub response_file: Option<PathBuf>,
}

/// Where a configuration value came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Cli,
    ConfigFile(PathBuf),
    Programmatic,
    Defaults,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::ConfigFile(path) => write!(f, "config file ({})", path.display()),
            Self::Programmatic => write!(f, "programmatic"),
            Self::Defaults => write!(f, "defaults"),
        }
    }
}

/// Configuration-relevant command-line arguments
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
    pub audience: Option<String>,
    pub collaborator_timeout: Option<u64>,
    pub lock_ttl_seconds: Option<u64>,
    pub verbose: Option<bool>,
    pub provider: Option<String>,
    pub templates_dir: Option<PathBuf>,
}

impl Config {
    /// Audience tag to use when a document does not name one.
    #[must_use]
    pub fn audience(&self) -> &str {
        self.defaults
            .audience
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .unwrap_or(DEFAULT_AUDIENCE)
    }

    #[must_use]
    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_secs(
            self.defaults
                .collaborator_timeout
                .unwrap_or(DEFAULT_COLLABORATOR_TIMEOUT_SECS)
                .max(MIN_COLLABORATOR_TIMEOUT_SECS),
        )
    }

    #[must_use]
    pub fn lock_ttl_seconds(&self) -> u64 {
        self.defaults.lock_ttl_seconds.unwrap_or(DEFAULT_LOCK_TTL_SECS)
    }

    #[must_use]
    pub fn verbose(&self) -> bool {
        self.defaults.verbose.unwrap_or(false)
    }

    #[must_use]
    pub fn provider(&self) -> &str {
        self.collaborator
            .provider
            .as_deref()
            .unwrap_or(DEFAULT_PROVIDER)
    }

    /// Source of a named setting, `Defaults` when untracked.
    #[must_use]
    pub fn source_of(&self, key: &str) -> ConfigSource {
        self.source_attribution
            .get(key)
            .cloned()
            .unwrap_or(ConfigSource::Defaults)
    }

    /// Deterministic configuration for tests: scripted collaborator, no file.
    #[must_use]
    pub fn minimal_for_testing() -> Self {
        Self {
            defaults: Defaults::default(),
            templates: TemplatesConfig::default(),
            collaborator: CollaboratorConfig {
                provider: Some("scripted".to_string()),
                scripted: Some(ScriptedConfig {
                    response: Some("## Summary\nScripted response.".to_string()),
                    response_file: None,
                }),
                ..CollaboratorConfig::default()
            },
            config_file: None,
            source_attribution: HashMap::new(),
        }
    }
}
