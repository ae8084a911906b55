//! Anthropic Messages API backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use ace_config::Config;
use ace_utils::error::CollaboratorError;

use crate::ReasoningCollaborator;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const DEFAULT_TEMPERATURE: f32 = 0.2;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct AnthropicCollaborator {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl std::fmt::Debug for AnthropicCollaborator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicCollaborator")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl AnthropicCollaborator {
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        model: String,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<Self, CollaboratorError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| {
                CollaboratorError::Misconfiguration(format!("Failed to build HTTP client: {e}"))
            })?;
        Ok(Self {
            client,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            model,
            max_tokens,
            temperature,
        })
    }

    pub(crate) fn from_config(config: &Config) -> Result<Self, CollaboratorError> {
        let settings = config.collaborator.anthropic.as_ref();

        let api_key_env = settings
            .and_then(|a| a.api_key_env.as_deref())
            .unwrap_or(DEFAULT_API_KEY_ENV);
        let api_key = std::env::var(api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                CollaboratorError::Misconfiguration(format!(
                    "Anthropic API key not found in environment variable '{api_key_env}'. \
                     Set it or configure a different api_key_env in [collaborator.anthropic]."
                ))
            })?;

        let model = settings.and_then(|a| a.model.clone()).ok_or_else(|| {
            CollaboratorError::Misconfiguration(
                "Anthropic model not specified. Set [collaborator.anthropic] model = \"...\"."
                    .to_string(),
            )
        })?;

        Self::new(
            api_key,
            settings.and_then(|a| a.base_url.clone()),
            model,
            settings.and_then(|a| a.max_tokens).unwrap_or(DEFAULT_MAX_TOKENS),
            settings.and_then(|a| a.temperature).unwrap_or(DEFAULT_TEMPERATURE),
        )
    }
}

/// Map an error status to the collaborator taxonomy.
fn map_status(status: StatusCode, body: &str) -> CollaboratorError {
    let detail = format!("anthropic returned {status}: {}", body.trim());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CollaboratorError::ProviderAuth(detail),
        StatusCode::TOO_MANY_REQUESTS => CollaboratorError::ProviderQuota(detail),
        s if s.is_server_error() => CollaboratorError::ProviderOutage(detail),
        _ => CollaboratorError::Refused(detail),
    }
}

fn extract_text(response: &MessagesResponse) -> String {
    response
        .content
        .iter()
        .filter(|block| block.content_type == "text")
        .filter_map(|block| block.text.as_deref())
        .collect()
}

#[async_trait]
impl ReasoningCollaborator for AnthropicCollaborator {
    fn provider(&self) -> &str {
        "anthropic"
    }

    async fn render(&self, prompt: &str) -> Result<String, CollaboratorError> {
        tracing::debug!(
            provider = "anthropic",
            model = %self.model,
            max_tokens = self.max_tokens,
            temperature = self.temperature,
            "Invoking Anthropic backend"
        );

        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            messages: vec![RequestMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| CollaboratorError::Transport(format!("request to anthropic failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(map_status(status, &text));
        }

        let parsed: MessagesResponse = response.json().await.map_err(|e| {
            CollaboratorError::Transport(format!("Failed to parse Anthropic response: {e}"))
        })?;

        let text = extract_text(&parsed);
        if text.trim().is_empty() {
            return Err(CollaboratorError::EmptyResponse);
        }

        if let Some(usage) = parsed.usage {
            tracing::debug!(
                provider = "anthropic",
                tokens_input = usage.input_tokens,
                tokens_output = usage.output_tokens,
                "Anthropic invocation completed"
            );
        }
        Ok(text)
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<RequestMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}
