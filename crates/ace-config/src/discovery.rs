use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use ace_utils::error::ConfigError;

use crate::model::{
    CliArgs, CollaboratorConfig, Config, ConfigSource, DEFAULT_PROVIDER, Defaults,
    TemplatesConfig,
};

/// Environment variable that selects the collaborator provider.
pub const PROVIDER_ENV: &str = "ACE_PROVIDER";

/// TOML configuration file structure
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlConfig {
    defaults: Option<Defaults>,
    templates: Option<TemplatesConfig>,
    collaborator: Option<CollaboratorConfig>,
}

const TRACKED_DEFAULTS: [&str; 6] = [
    "audience",
    "collaborator_timeout",
    "lock_ttl_seconds",
    "verbose",
    "provider",
    "templates_dir",
];

impl Config {
    /// Discover and load configuration with precedence: CLI > file > defaults
    ///
    /// Uses the current working directory for config file discovery when no
    /// explicit path is provided in `cli_args`.
    pub fn discover(cli_args: &CliArgs) -> Result<Self, ConfigError> {
        let start_dir = env::current_dir().map_err(|e| ConfigError::DiscoveryFailed {
            reason: format!("cannot determine current directory: {e}"),
        })?;
        Self::discover_from(&start_dir, cli_args)
    }

    /// Discover and load configuration starting from a specific directory.
    ///
    /// This is the path-driven variant used by tests to avoid process-global state.
    pub fn discover_from(start_dir: &Path, cli_args: &CliArgs) -> Result<Self, ConfigError> {
        let mut source_attribution: HashMap<String, ConfigSource> = TRACKED_DEFAULTS
            .iter()
            .map(|k| ((*k).to_string(), ConfigSource::Defaults))
            .collect();

        let mut defaults = Defaults::default();
        let mut templates = TemplatesConfig::default();
        let mut collaborator = CollaboratorConfig::default();

        let config_file = match &cli_args.config_path {
            Some(explicit) => {
                if !explicit.exists() {
                    return Err(ConfigError::NotFound {
                        path: explicit.display().to_string(),
                    });
                }
                Some(explicit.clone())
            }
            None => Self::discover_config_file_from(start_dir),
        };

        if let Some(path) = &config_file {
            let file_config = Self::load_config_file(path)?;
            let source = ConfigSource::ConfigFile(path.clone());
            let base_dir = path
                .parent()
                .and_then(Path::parent)
                .unwrap_or_else(|| Path::new("."));

            if let Some(file_defaults) = file_config.defaults {
                if file_defaults.audience.is_some() {
                    defaults.audience = file_defaults.audience;
                    source_attribution.insert("audience".to_string(), source.clone());
                }
                if file_defaults.collaborator_timeout.is_some() {
                    defaults.collaborator_timeout = file_defaults.collaborator_timeout;
                    source_attribution.insert("collaborator_timeout".to_string(), source.clone());
                }
                if file_defaults.lock_ttl_seconds.is_some() {
                    defaults.lock_ttl_seconds = file_defaults.lock_ttl_seconds;
                    source_attribution.insert("lock_ttl_seconds".to_string(), source.clone());
                }
                if file_defaults.verbose.is_some() {
                    defaults.verbose = file_defaults.verbose;
                    source_attribution.insert("verbose".to_string(), source.clone());
                }
            }

            if let Some(dir) = file_config.templates.and_then(|t| t.dir) {
                // Relative template dirs are relative to the project root, not the CWD
                templates.dir = Some(if dir.is_relative() {
                    base_dir.join(dir)
                } else {
                    dir
                });
                source_attribution.insert("templates_dir".to_string(), source.clone());
            }

            if let Some(file_collaborator) = file_config.collaborator {
                if file_collaborator.provider.is_some() {
                    source_attribution.insert("provider".to_string(), source.clone());
                }
                collaborator = file_collaborator;
            }
        }

        // Environment sits between the config file and CLI flags
        if let Ok(provider) = env::var(PROVIDER_ENV)
            && !provider.trim().is_empty()
        {
            collaborator.provider = Some(provider);
            source_attribution.insert("provider".to_string(), ConfigSource::Cli);
        }

        if let Some(audience) = &cli_args.audience {
            defaults.audience = Some(audience.clone());
            source_attribution.insert("audience".to_string(), ConfigSource::Cli);
        }
        if let Some(timeout) = cli_args.collaborator_timeout {
            defaults.collaborator_timeout = Some(timeout);
            source_attribution.insert("collaborator_timeout".to_string(), ConfigSource::Cli);
        }
        if let Some(ttl) = cli_args.lock_ttl_seconds {
            defaults.lock_ttl_seconds = Some(ttl);
            source_attribution.insert("lock_ttl_seconds".to_string(), ConfigSource::Cli);
        }
        if let Some(verbose) = cli_args.verbose {
            defaults.verbose = Some(verbose);
            source_attribution.insert("verbose".to_string(), ConfigSource::Cli);
        }
        if let Some(provider) = &cli_args.provider {
            collaborator.provider = Some(provider.clone());
            source_attribution.insert("provider".to_string(), ConfigSource::Cli);
        }
        if let Some(dir) = &cli_args.templates_dir {
            templates.dir = Some(dir.clone());
            source_attribution.insert("templates_dir".to_string(), ConfigSource::Cli);
        }

        if collaborator.provider.is_none() {
            collaborator.provider = Some(DEFAULT_PROVIDER.to_string());
        }

        let config = Self {
            defaults,
            templates,
            collaborator,
            config_file,
            source_attribution,
        };

        config.validate()?;
        tracing::debug!(
            config_file = ?config.config_file,
            provider = %config.provider(),
            "Configuration resolved"
        );
        Ok(config)
    }

    /// Walk up from `start_dir` looking for `.ace/config.toml`, stopping at a
    /// repository root marker (.git, .hg, .svn) or the filesystem root.
    #[must_use]
    pub fn discover_config_file_from(start_dir: &Path) -> Option<PathBuf> {
        let mut current = Some(start_dir);

        while let Some(dir) = current {
            let candidate = dir.join(".ace").join("config.toml");
            if candidate.is_file() {
                return Some(candidate);
            }

            if [".git", ".hg", ".svn"].iter().any(|m| dir.join(m).exists()) {
                break;
            }

            current = dir.parent();
        }

        None
    }

    fn load_config_file(path: &Path) -> Result<TomlConfig, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                ConfigError::InvalidFile(format!("{}: {e}", path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(TomlConfig::default()),
            Err(e) => Err(ConfigError::DiscoveryFailed {
                reason: format!("failed to read {}: {e}", path.display()),
            }),
        }
    }
}
