use ace_utils::error::ConfigError;

use crate::model::{
    Config, KNOWN_PROVIDERS, MAX_COLLABORATOR_TIMEOUT_SECS, MIN_COLLABORATOR_TIMEOUT_SECS,
};

impl Config {
    /// Validate configuration values.
    ///
    /// A single problem is reported as `InvalidValue` naming its key; several
    /// are batched into `ValidationFailed`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems: Vec<(&'static str, String)> = Vec::new();

        if let Some(timeout) = self.defaults.collaborator_timeout {
            if timeout < MIN_COLLABORATOR_TIMEOUT_SECS {
                problems.push((
                    "collaborator_timeout",
                    format!("must be at least {MIN_COLLABORATOR_TIMEOUT_SECS} seconds"),
                ));
            } else if timeout > MAX_COLLABORATOR_TIMEOUT_SECS {
                problems.push((
                    "collaborator_timeout",
                    format!("exceeds maximum of {MAX_COLLABORATOR_TIMEOUT_SECS} seconds"),
                ));
            }
        }

        if self.defaults.lock_ttl_seconds == Some(0) {
            problems.push(("lock_ttl_seconds", "must be greater than 0".to_string()));
        }

        let provider = self.provider();
        if !KNOWN_PROVIDERS.contains(&provider) {
            problems.push((
                "provider",
                format!(
                    "unknown provider '{provider}' (expected one of: {})",
                    KNOWN_PROVIDERS.join(", ")
                ),
            ));
        }

        if let Some(anthropic) = &self.collaborator.anthropic {
            if anthropic.max_tokens == Some(0) {
                problems.push(("max_tokens", "must be greater than 0".to_string()));
            }
            if let Some(t) = anthropic.temperature
                && !(0.0..=1.0).contains(&t)
            {
                problems.push(("temperature", format!("must be within 0.0..=1.0, got {t}")));
            }
        }

        if let Some(dir) = &self.templates.dir
            && !dir.is_dir()
        {
            problems.push((
                "templates_dir",
                format!("'{}' is not a directory", dir.display()),
            ));
        }

        match problems.len() {
            0 => Ok(()),
            1 => {
                let (key, value) = problems.remove(0);
                Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value,
                })
            }
            _ => Err(ConfigError::ValidationFailed {
                errors: problems
                    .into_iter()
                    .map(|(key, value)| format!("{key}: {value}"))
                    .collect(),
            }),
        }
    }
}
