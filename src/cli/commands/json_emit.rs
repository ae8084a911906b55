//! JSON emit functions for CLI output
//!
//! Everything the CLI prints as JSON goes through JCS (RFC 8785) so that
//! output is byte-stable across runs.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;

use ace_engine::SessionStatus;
use ace_phase_api::PhaseDocument;

use crate::{Config, emit_jcs};

/// Effective value of one configuration key and where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigValue {
    pub value: serde_json::Value,
    pub source: String,
}

/// `workflow status --json` payload.
#[derive(Debug, Clone, Serialize)]
pub struct StatusJsonOutput {
    #[serde(flatten)]
    pub status: SessionStatus,
    pub effective_config: BTreeMap<String, ConfigValue>,
}

impl StatusJsonOutput {
    #[must_use]
    pub fn new(status: SessionStatus, config: &Config) -> Self {
        Self {
            status,
            effective_config: effective_config(config),
        }
    }
}

fn effective_config(config: &Config) -> BTreeMap<String, ConfigValue> {
    let entry = |key: &str, value: serde_json::Value| {
        (
            key.to_string(),
            ConfigValue {
                value,
                source: config.source_of(key).to_string(),
            },
        )
    };
    let templates_dir = config
        .templates
        .dir
        .as_ref()
        .map_or(serde_json::Value::Null, |dir| dir.display().to_string().into());

    BTreeMap::from([
        entry("audience", config.audience().into()),
        entry(
            "collaborator_timeout",
            config.collaborator_timeout().as_secs().into(),
        ),
        entry("lock_ttl_seconds", config.lock_ttl_seconds().into()),
        entry("provider", config.provider().into()),
        entry("templates_dir", templates_dir),
        entry("verbose", config.verbose().into()),
    ])
}

/// Emit status output as canonical JSON.
pub fn emit_status_json(output: &StatusJsonOutput) -> Result<String> {
    emit_jcs(output).context("Failed to emit status JSON")
}

/// Emit a completed document as canonical JSON.
pub fn emit_document_json(document: &PhaseDocument) -> Result<String> {
    emit_jcs(document).context("Failed to emit document JSON")
}
