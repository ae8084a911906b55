//! Claude CLI backend.
//!
//! Runs `claude -p --output-format text` with the rendered prompt on stdin.
//! The child is spawned with `kill_on_drop`, so a caller-side timeout or
//! cancellation that drops the future also terminates the process.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use ace_config::Config;
use ace_utils::error::CollaboratorError;

use crate::ReasoningCollaborator;

const STDERR_TAIL_BYTES: usize = 2048;

pub struct ClaudeCliCollaborator {
    binary: PathBuf,
    model: Option<String>,
}

impl ClaudeCliCollaborator {
    #[must_use]
    pub fn new(binary: PathBuf, model: Option<String>) -> Self {
        Self { binary, model }
    }

    pub(crate) fn from_config(config: &Config) -> Result<Self, CollaboratorError> {
        let claude = config.collaborator.claude.as_ref();
        let binary = match claude.and_then(|c| c.binary.as_deref()) {
            Some(path) => PathBuf::from(path),
            None => Self::discover_binary()?,
        };
        let model = claude.and_then(|c| c.model.clone()).filter(|m| !m.is_empty());
        Ok(Self::new(binary, model))
    }

    fn discover_binary() -> Result<PathBuf, CollaboratorError> {
        which::which("claude").map_err(|e| {
            CollaboratorError::Misconfiguration(format!(
                "Claude CLI binary not found in PATH. Install it or set [collaborator.claude] binary. Error: {e}"
            ))
        })
    }

    fn args(&self) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            "--output-format".to_string(),
            "text".to_string(),
        ];
        if let Some(model) = &self.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        args
    }
}

fn stderr_tail(stderr: &str, max_bytes: usize) -> String {
    if stderr.len() <= max_bytes {
        return stderr.trim().to_string();
    }
    let mut start = stderr.len() - max_bytes;
    while !stderr.is_char_boundary(start) {
        start += 1;
    }
    stderr[start..].trim().to_string()
}

#[async_trait]
impl ReasoningCollaborator for ClaudeCliCollaborator {
    fn provider(&self) -> &str {
        "claude-cli"
    }

    async fn render(&self, prompt: &str) -> Result<String, CollaboratorError> {
        tracing::debug!(
            provider = "claude-cli",
            binary = %self.binary.display(),
            model = ?self.model,
            prompt_bytes = prompt.len(),
            "Invoking Claude CLI"
        );

        let mut child = Command::new(&self.binary)
            .args(self.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                CollaboratorError::Transport(format!(
                    "failed to start {}: {e}",
                    self.binary.display()
                ))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .map_err(|e| CollaboratorError::Transport(format!("failed to write prompt: {e}")))?;
            // Closing stdin tells the CLI the prompt is complete.
            drop(stdin);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| CollaboratorError::Transport(format!("failed to read output: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CollaboratorError::Refused(format!(
                "claude exited with {}: {}",
                output.status,
                stderr_tail(&stderr, STDERR_TAIL_BYTES)
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        if text.trim().is_empty() {
            return Err(CollaboratorError::EmptyResponse);
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_include_model_when_configured() {
        let plain = ClaudeCliCollaborator::new(PathBuf::from("claude"), None);
        assert_eq!(plain.args(), vec!["-p", "--output-format", "text"]);

        let with_model = ClaudeCliCollaborator::new(PathBuf::from("claude"), Some("sonnet".into()));
        assert!(with_model.args().ends_with(&["--model".to_string(), "sonnet".to_string()]));
    }

    #[test]
    fn test_stderr_tail_respects_char_boundaries() {
        let long = "é".repeat(100);
        let tail = stderr_tail(&long, 11);
        assert!(tail.len() <= 11);
        assert!(tail.chars().all(|c| c == 'é'));
    }

    #[tokio::test]
    async fn test_missing_binary_is_transport_error() {
        let collaborator =
            ClaudeCliCollaborator::new(PathBuf::from("/nonexistent/ace-claude-binary"), None);
        assert!(matches!(
            collaborator.render("hello").await,
            Err(CollaboratorError::Transport(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdout_of_a_stand_in_binary_is_returned() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-claude");
        std::fs::write(&script, "#!/bin/sh\ncat >/dev/null\necho '## Summary'\necho 'stub'\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let collaborator = ClaudeCliCollaborator::new(script, None);
        let text = collaborator.render("prompt").await.unwrap();
        assert_eq!(text, "## Summary\nstub\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_refused() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-claude");
        std::fs::write(&script, "#!/bin/sh\ncat >/dev/null\necho 'rate limited' >&2\nexit 3\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let collaborator = ClaudeCliCollaborator::new(script, None);
        match collaborator.render("prompt").await {
            Err(CollaboratorError::Refused(msg)) => assert!(msg.contains("rate limited")),
            other => panic!("expected Refused, got {other:?}"),
        }
    }
}
