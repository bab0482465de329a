use crate::config::Config;
use crate::errors::{AppError, MAX_ERROR_DETAIL_CHARS};
use crate::models::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage};
use std::time::Duration;

/// Text used when the completion API answers without any message content.
const EMPTY_COMPLETION: &str = "{}";

/// Client for the chat-completion API.
///
/// Issues exactly one request per call; there is no retry.
#[derive(Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiClient {
    /// Creates a client from the configuration.
    ///
    /// A missing API key is not an error here; it is reported per request so the
    /// service still starts and answers health checks.
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.openai_timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create OpenAI client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.openai_base_url.clone(),
            api_key: config.openai_api_key.clone(),
            model: config.openai_model.clone(),
            temperature: config.openai_temperature,
            max_tokens: config.openai_max_tokens,
        })
    }

    /// Sends the messages and returns the raw text of the first choice.
    ///
    /// The returned text is untrusted; feed it to the normalizer.
    ///
    /// # Errors
    ///
    /// * `AppError::Configuration` if no API key is configured (no request is sent).
    /// * `AppError::Upstream` on transport failure, non-success status or an
    ///   unreadable response envelope.
    pub async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, AppError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            AppError::Configuration("OPENAI_API_KEY no está configurado".to_string())
        })?;

        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatCompletionRequest {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            messages,
        };

        tracing::info!("Calling OpenAI model {} at {}", self.model, url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::upstream(None, format!("OpenAI request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!(
                "OpenAI returned error {}: {}",
                status,
                crate::errors::truncate_chars(&error_text, MAX_ERROR_DETAIL_CHARS)
            );
            return Err(AppError::upstream(Some(status.as_u16()), error_text));
        }

        let data: ChatCompletionResponse = response.json().await.map_err(|e| {
            AppError::upstream(
                Some(status.as_u16()),
                format!("Failed to parse OpenAI response: {}", e),
            )
        })?;

        let content = data.first_content().unwrap_or(EMPTY_COMPLETION).to_string();
        tracing::debug!("OpenAI answered with {} characters", content.chars().count());

        Ok(content)
    }
}
