use std::path::{Path, PathBuf};

use ace_utils::error::{AceError, TemplateError};
use ace_utils::types::PhaseId;

use crate::parser::parse_template;
use crate::template::Template;

const EMBEDDED: [(PhaseId, &str); 5] = [
    (PhaseId::Start, include_str!("../templates/start.md")),
    (PhaseId::Analyze, include_str!("../templates/analyze.md")),
    (PhaseId::Create, include_str!("../templates/create.md")),
    (PhaseId::Evaluate, include_str!("../templates/evaluate.md")),
    (PhaseId::Commit, include_str!("../templates/commit.md")),
];

/// Where a loaded template came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    Embedded,
    File(PathBuf),
}

/// The five phase templates, loaded once and shared read-only between
/// sessions.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    // Indexed by `PhaseId::ordinal`.
    templates: Vec<(Template, TemplateSource)>,
}

impl TemplateStore {
    /// Load the templates compiled into the binary.
    pub fn embedded() -> Result<Self, TemplateError> {
        Self::load(None)
    }

    /// Load templates, preferring `<dir>/<phase>.md` when `dir` is given and
    /// falling back to the embedded template for any phase without a file.
    pub fn load(dir: Option<&Path>) -> Result<Self, TemplateError> {
        let mut templates = Vec::with_capacity(EMBEDDED.len());
        for (phase, embedded) in EMBEDDED {
            let file = dir
                .map(|d| d.join(format!("{}.md", phase.as_str())))
                .filter(|p| p.is_file());

            let loaded = match file {
                Some(path) => {
                    let source_name = path.display().to_string();
                    let text =
                        std::fs::read_to_string(&path).map_err(|e| TemplateError::Unreadable {
                            source_name: source_name.clone(),
                            reason: e.to_string(),
                        })?;
                    tracing::debug!(phase = %phase, path = %source_name, "Loading template override");
                    (
                        parse_template(&source_name, &text, Some(phase))?,
                        TemplateSource::File(path),
                    )
                }
                None => (
                    parse_template(&format!("{}.md", phase.as_str()), embedded, Some(phase))?,
                    TemplateSource::Embedded,
                ),
            };
            templates.push(loaded);
        }
        Ok(Self { templates })
    }

    #[must_use]
    pub fn get(&self, phase: PhaseId) -> &Template {
        &self.templates[phase.ordinal()].0
    }

    /// Look up a template by phase name, case-insensitively.
    pub fn get_template(&self, name: &str) -> Result<&Template, AceError> {
        name.parse::<PhaseId>()
            .map(|phase| self.get(phase))
            .map_err(|_| AceError::TemplateNotFound {
                name: name.to_string(),
            })
    }

    #[must_use]
    pub fn source(&self, phase: PhaseId) -> &TemplateSource {
        &self.templates[phase.ordinal()].1
    }

    /// Templates in phase order.
    pub fn list(&self) -> impl Iterator<Item = &Template> {
        self.templates.iter().map(|(t, _)| t)
    }
}
