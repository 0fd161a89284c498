//! HTTP client for an OpenAI-compatible chat-completion service.
//!
//! [`ChatExtractor`] implements [`engine::Extractor`]: every call sends the
//! system prompt plus the user's message and normalizes the JSON answer with
//! [`parse_content`]. There are no internal retries; the consumer decides
//! what to do with a failed call.

use std::time::Duration;

use engine::{ExtractionError, ExtractionResult, Extractor};
use reqwest::Client;

pub use response::parse_content;

mod prompt;
mod response;

use response::{ChatMessage, ChatRequest, ChatResponse, ErrorBody, ResponseFormat};

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_TEMPERATURE: f32 = 0.5;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct ChatExtractor {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    timeout: Duration,
    prompt: String,
}

impl ChatExtractor {
    pub fn builder() -> ChatExtractorBuilder {
        ChatExtractorBuilder::default()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.endpoint.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn request_failed(&self, err: reqwest::Error) -> ExtractionError {
        if err.is_timeout() {
            ExtractionError::Timeout(self.timeout)
        } else {
            ExtractionError::Transport(err.to_string())
        }
    }
}

impl Extractor for ChatExtractor {
    async fn extract(&self, text: &str) -> Result<ExtractionResult, ExtractionError> {
        let request = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            response_format: ResponseFormat::json_object(),
            messages: [
                ChatMessage {
                    role: "system",
                    content: &self.prompt,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
        };

        let resp = self
            .client
            .post(self.url("chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| self.request_failed(err))?;

        let status = resp.status();
        if !status.is_success() {
            let message = match resp.json::<ErrorBody>().await {
                Ok(body) => body.message(),
                Err(_) => status
                    .canonical_reason()
                    .unwrap_or("service error")
                    .to_string(),
            };
            return Err(ExtractionError::Service {
                status: status.as_u16(),
                message,
            });
        }

        let body = resp.json::<ChatResponse>().await.map_err(|err| {
            if err.is_timeout() {
                ExtractionError::Timeout(self.timeout)
            } else {
                ExtractionError::InvalidResponse(err.to_string())
            }
        })?;
        let content = body.into_content()?;
        tracing::debug!("Raw extractor output: {content}");

        parse_content(&content)
    }
}

pub struct ChatExtractorBuilder {
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    timeout: Duration,
}

impl Default for ChatExtractorBuilder {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ChatExtractorBuilder {
    /// Base URL of the service, `/chat/completions` is appended to it.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Per-request timeout of the HTTP client.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<ChatExtractor, reqwest::Error> {
        let client = Client::builder().timeout(self.timeout).build()?;

        Ok(ChatExtractor {
            client,
            endpoint: self.endpoint,
            api_key: self.api_key,
            model: self.model,
            temperature: self.temperature,
            timeout: self.timeout,
            prompt: prompt::system_prompt(),
        })
    }
}
