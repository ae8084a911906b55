use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use ace_utils::error::ConfigError;

use crate::model::{
    AnthropicConfig, CollaboratorConfig, Config, ConfigSource, Defaults, ScriptedConfig,
    TemplatesConfig,
};

impl Config {
    /// Create a builder for programmatic configuration.
    ///
    /// Use this when embedding the engine: nothing is read from the
    /// environment or the filesystem.
    ///
    /// ```rust
    /// use ace_config::Config;
    /// use std::time::Duration;
    ///
    /// let config = Config::builder()
    ///     .audience("non-technical manager")
    ///     .collaborator_timeout(Duration::from_secs(30))
    ///     .scripted_response("## Summary\nok")
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.provider(), "scripted");
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Fluent builder for [`Config`].
///
/// All values set via the builder are attributed to
/// `ConfigSource::Programmatic`.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    audience: Option<String>,
    collaborator_timeout: Option<Duration>,
    lock_ttl_seconds: Option<u64>,
    verbose: Option<bool>,
    templates_dir: Option<PathBuf>,
    provider: Option<String>,
    anthropic: Option<AnthropicConfig>,
    scripted_response: Option<String>,
}

impl ConfigBuilder {
    #[must_use]
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Collaborator timeout; truncated to whole seconds.
    #[must_use]
    pub fn collaborator_timeout(mut self, timeout: Duration) -> Self {
        self.collaborator_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn lock_ttl_seconds(mut self, ttl: u64) -> Self {
        self.lock_ttl_seconds = Some(ttl);
        self
    }

    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = Some(verbose);
        self
    }

    #[must_use]
    pub fn templates_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.templates_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    #[must_use]
    pub fn anthropic(mut self, anthropic: AnthropicConfig) -> Self {
        self.anthropic = Some(anthropic);
        self
    }

    /// Use the scripted collaborator with a fixed response.
    #[must_use]
    pub fn scripted_response(mut self, response: impl Into<String>) -> Self {
        self.provider = Some("scripted".to_string());
        self.scripted_response = Some(response.into());
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<Config, ConfigError> {
        let mut source_attribution = HashMap::new();
        let mut mark = |key: &str, set: bool| {
            let source = if set {
                ConfigSource::Programmatic
            } else {
                ConfigSource::Defaults
            };
            source_attribution.insert(key.to_string(), source);
        };

        mark("audience", self.audience.is_some());
        mark("collaborator_timeout", self.collaborator_timeout.is_some());
        mark("lock_ttl_seconds", self.lock_ttl_seconds.is_some());
        mark("verbose", self.verbose.is_some());
        mark("templates_dir", self.templates_dir.is_some());
        mark("provider", self.provider.is_some());

        let config = Config {
            defaults: Defaults {
                audience: self.audience,
                collaborator_timeout: self.collaborator_timeout.map(|d| d.as_secs()),
                lock_ttl_seconds: self.lock_ttl_seconds,
                verbose: self.verbose,
            },
            templates: TemplatesConfig {
                dir: self.templates_dir,
            },
            collaborator: CollaboratorConfig {
                provider: self.provider,
                claude: None,
                anthropic: self.anthropic,
                scripted: self.scripted_response.map(|response| ScriptedConfig {
                    response: Some(response),
                    response_file: None,
                }),
            },
            config_file: None,
            source_attribution,
        };

        config.validate()?;
        Ok(config)
    }
}
