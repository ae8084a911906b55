use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use ace_config::Config;
use ace_utils::error::CollaboratorError;

use crate::ReasoningCollaborator;

/// Collaborator that replays canned responses.
///
/// Queued responses (or errors) are consumed first; once the queue is empty
/// every call returns the fallback response. An optional delay makes it
/// usable for timeout and cancellation tests.
#[derive(Debug, Default)]
pub struct ScriptedCollaborator {
    queue: Mutex<VecDeque<Result<String, CollaboratorError>>>,
    fallback: Option<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedCollaborator {
    /// Always answer with `response`.
    #[must_use]
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            fallback: Some(response.into()),
            ..Self::default()
        }
    }

    /// Answer with each response in turn, then fail with `EmptyResponse`.
    #[must_use]
    pub fn queued<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            queue: Mutex::new(responses.into_iter().map(|r| Ok(r.into())).collect()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_response(&self, response: impl Into<String>) {
        self.queue_guard().push_back(Ok(response.into()));
    }

    pub fn push_error(&self, error: CollaboratorError) {
        self.queue_guard().push_back(Err(error));
    }

    /// Number of `render` calls that reached the collaborator.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every prompt received, oldest first.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn from_config(config: &Config) -> Result<Self, CollaboratorError> {
        let scripted = config.collaborator.scripted.as_ref();
        if let Some(path) = scripted.and_then(|s| s.response_file.as_ref()) {
            let text = std::fs::read_to_string(path).map_err(|e| {
                CollaboratorError::Misconfiguration(format!(
                    "cannot read scripted response file {}: {e}",
                    path.display()
                ))
            })?;
            return Ok(Self::new(text));
        }
        match scripted.and_then(|s| s.response.clone()) {
            Some(response) => Ok(Self::new(response)),
            None => Err(CollaboratorError::Misconfiguration(
                "provider 'scripted' needs [collaborator.scripted] response or response_file"
                    .to_string(),
            )),
        }
    }

    fn queue_guard(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String, CollaboratorError>>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ReasoningCollaborator for ScriptedCollaborator {
    fn provider(&self) -> &str {
        "scripted"
    }

    async fn render(&self, prompt: &str) -> Result<String, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prompt.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.queue_guard().pop_front();
        let response = match next {
            Some(result) => result?,
            None => self.fallback.clone().ok_or(CollaboratorError::EmptyResponse)?,
        };
        if response.trim().is_empty() {
            return Err(CollaboratorError::EmptyResponse);
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_then_fallback_exhaustion() {
        let scripted = ScriptedCollaborator::queued(["one", "two"]);
        assert_eq!(scripted.render("a").await.unwrap(), "one");
        assert_eq!(scripted.render("b").await.unwrap(), "two");
        assert_eq!(
            scripted.render("c").await.unwrap_err(),
            CollaboratorError::EmptyResponse
        );
        assert_eq!(scripted.calls(), 3);
        assert_eq!(scripted.prompts(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_injected_error_then_fallback() {
        let scripted = ScriptedCollaborator::new("fine");
        scripted.push_error(CollaboratorError::Transport("socket closed".to_string()));
        assert!(matches!(
            scripted.render("x").await,
            Err(CollaboratorError::Transport(_))
        ));
        assert_eq!(scripted.render("x").await.unwrap(), "fine");
    }

    #[tokio::test]
    async fn test_blank_response_is_empty() {
        let scripted = ScriptedCollaborator::new("   \n");
        assert_eq!(
            scripted.render("x").await.unwrap_err(),
            CollaboratorError::EmptyResponse
        );
    }

    #[tokio::test]
    async fn test_delay_is_observable_by_timeouts() {
        let scripted = ScriptedCollaborator::new("late").with_delay(Duration::from_secs(5));
        let result = tokio::time::timeout(Duration::from_millis(50), scripted.render("x")).await;
        assert!(result.is_err());
        assert_eq!(scripted.calls(), 1);
    }

    #[test]
    fn test_from_config_reads_response_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("response.md");
        std::fs::write(&path, "## Summary\nfrom file").unwrap();

        let mut config = Config::minimal_for_testing();
        config.collaborator.scripted = Some(ace_config::ScriptedConfig {
            response: None,
            response_file: Some(path),
        });
        let scripted = ScriptedCollaborator::from_config(&config).unwrap();
        assert_eq!(scripted.fallback.as_deref(), Some("## Summary\nfrom file"));
    }
}
