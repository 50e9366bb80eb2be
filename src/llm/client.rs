use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::settings::{AuthConfig, LlmConfig};
use crate::error::{Result, RevosError};
use crate::tokens::source::truncate;
use crate::tokens::TokenManager;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_owned(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_owned(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    top_p: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
}

impl<'a> ChatRequest<'a> {
    fn new(llm: &'a LlmConfig, messages: &'a [ChatMessage]) -> Self {
        Self {
            model: &llm.model,
            messages,
            temperature: llm.temperature,
            max_tokens: llm.max_tokens,
            top_p: llm.top_p,
            frequency_penalty: llm.frequency_penalty,
            presence_penalty: llm.presence_penalty,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat-completion client authorised with the manager's
/// bearer token.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: Client,
    endpoint: String,
    tokens: TokenManager,
}

impl ChatClient {
    pub fn new(auth: &AuthConfig, tokens: TokenManager) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(auth.request_timeout))
            .build()
            .map_err(|e| RevosError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(&auth.base_url, http, tokens))
    }

    pub fn with_client(base_url: &str, http: Client, tokens: TokenManager) -> Self {
        Self {
            http,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            tokens,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Send `messages` and return the first choice's content.
    ///
    /// A 401 answer invalidates the cached token, forces one refresh and
    /// retries the request once. A failed refresh is an authentication error.
    pub async fn complete(&self, llm: &LlmConfig, messages: &[ChatMessage]) -> Result<String> {
        let request = ChatRequest::new(llm, messages);

        let token = self.tokens.get_token().await?;
        let mut response = self.send(&request, &token).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("chat endpoint rejected the bearer token, refreshing once");
            self.tokens.invalidate().await;
            if !self.tokens.force_refresh().await {
                return Err(RevosError::authentication(
                    "chat endpoint rejected the bearer token and the refresh failed",
                ));
            }
            let token = self.tokens.get_token().await?;
            response = self.send(&request, &token).await?;
            if response.status() == StatusCode::UNAUTHORIZED {
                return Err(RevosError::authentication(
                    "chat endpoint rejected the refreshed token",
                ));
            }
        }

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(RevosError::api(
                Some(status.as_u16()),
                format!("chat endpoint answered {status}: {}", truncate(&body, 200)),
            ));
        }
        extract_content(&body)
    }

    async fn send(&self, request: &ChatRequest<'_>, token: &str) -> Result<Response> {
        debug!(url = %self.endpoint, model = request.model, "sending chat completion");
        Ok(self
            .http
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(request)
            .send()
            .await?)
    }
}

fn extract_content(body: &str) -> Result<String> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| RevosError::api(None, format!("malformed chat completion response: {e}")))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| RevosError::api(None, "chat completion response has no message content"))
}
