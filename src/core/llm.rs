//! Language-model client used by the decision and summary steps.

use crate::api::{ChatCompletion, ChatMessage, ChatRequest};
use crate::utils::url::construct_api_url;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tracing::debug;

pub const SYSTEM_PROMPT: &str = "You are an intelligent assistant. You will execute tasks as prompted.";

/// One completion request: a prompt plus optional image data URIs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelRequest {
    pub prompt: String,
    pub images: Vec<String>,
}

impl ModelRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            images: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub enum ModelError {
    Http(String),
    /// Non-success status; the message is already formatted for display.
    Api { status: u16, message: String },
    InvalidResponse(String),
    EmptyCompletion,
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::Http(message) => write!(f, "Model request failed: {message}"),
            ModelError::Api { status, message } => write!(f, "HTTP {status}: {message}"),
            ModelError::InvalidResponse(message) => {
                write!(f, "Model returned an unreadable response: {message}")
            }
            ModelError::EmptyCompletion => write!(f, "Model returned an empty completion"),
        }
    }
}

impl std::error::Error for ModelError {}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: ModelRequest) -> Result<String, ModelError>;
}

/// Non-streaming client for an OpenAI-compatible `chat/completions` endpoint.
pub struct OpenAiChatModel {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiChatModel {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ModelError::Http(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
            api_key,
        })
    }

    fn build_messages(request: ModelRequest) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(request.prompt, &request.images),
        ]
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    async fn complete(&self, request: ModelRequest) -> Result<String, ModelError> {
        let body = ChatRequest {
            model: self.model.clone(),
            messages: Self::build_messages(request),
            stream: false,
        };
        let chat_url = construct_api_url(&self.base_url, "chat/completions");
        debug!(url = %chat_url, model = %self.model, "Sending completion request");

        let mut http_request = self
            .client
            .post(chat_url)
            .header("Content-Type", "application/json");
        if let Some(api_key) = self.api_key.as_deref() {
            http_request = http_request.header("Authorization", format!("Bearer {api_key}"));
        }

        let response = http_request
            .json(&body)
            .send()
            .await
            .map_err(|err| ModelError::Http(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(ModelError::Api {
                status: status.as_u16(),
                message: format_api_error(&error_text),
            });
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|err| ModelError::InvalidResponse(err.to_string()))?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(ModelError::EmptyCompletion)
    }
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.to_string()),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn format_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();
    if trimmed.is_empty() {
        return "API Error: <empty>".to_string();
    }

    if let Ok(json_value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(summary) = extract_error_summary(&json_value).filter(|s| !s.is_empty()) {
            return format!("API Error: {summary}");
        }
        return format!("API Error: {json_value}");
    }

    format!("API Error: {trimmed}")
}
