//! Wire types for OpenAI-compatible `chat/completions` requests.

use serde::{Deserialize, Serialize};

pub const ROLE_SYSTEM: &str = "system";
pub const ROLE_USER: &str = "user";

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: ChatContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: ROLE_SYSTEM.to_string(),
            content: ChatContent::Text(text.into()),
        }
    }

    /// A user message; carries content parts only when images are attached.
    pub fn user(text: impl Into<String>, image_urls: &[String]) -> Self {
        let text = text.into();
        let content = if image_urls.is_empty() {
            ChatContent::Text(text)
        } else {
            let mut parts = vec![ContentPart::Text { text }];
            parts.extend(image_urls.iter().map(|url| ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: url.clone(),
                    detail: Some("auto".to_string()),
                },
            }));
            ChatContent::Parts(parts)
        };
        Self {
            role: ROLE_USER.to_string(),
            content,
        }
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum ChatContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ImageUrl {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
}

#[derive(Deserialize)]
pub struct ChatCompletionMessage {
    pub content: Option<String>,
}

#[derive(Deserialize)]
pub struct ChatCompletionChoice {
    pub message: ChatCompletionMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Deserialize)]
pub struct ChatCompletion {
    pub choices: Vec<ChatCompletionChoice>,
}
