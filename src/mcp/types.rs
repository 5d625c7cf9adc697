//! Protocol-neutral data model shared by the client and the reference server.
//!
//! Wire types from `rust-mcp-schema` are converted into these at the session
//! boundary, so the rest of the crate only ever matches on the closed set of
//! variants defined here.

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A tool published by a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub input_schema: Value,
}

impl CapabilityDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// Capabilities in server registration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CapabilityList {
    pub capabilities: Vec<CapabilityDescriptor>,
}

impl CapabilityList {
    pub fn new(capabilities: Vec<CapabilityDescriptor>) -> Self {
        Self { capabilities }
    }

    pub fn find(&self, name: &str) -> Option<&CapabilityDescriptor> {
        self.capabilities.iter().find(|capability| capability.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        self.capabilities
            .iter()
            .map(|capability| capability.name.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRequest {
    pub capability_name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl InvocationRequest {
    pub fn new(capability_name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            capability_name: capability_name.into(),
            arguments,
        }
    }
}

/// Image bytes as they were produced: raw, or already base64 text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImagePayload {
    Raw(Vec<u8>),
    Base64(String),
}

impl ImagePayload {
    /// Base64 text for the payload, encoding raw bytes when needed.
    pub fn to_base64(&self) -> String {
        match self {
            ImagePayload::Raw(bytes) => base64::engine::general_purpose::STANDARD.encode(bytes),
            ImagePayload::Base64(text) => text.clone(),
        }
    }

    /// Decoded bytes for the payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>, String> {
        match self {
            ImagePayload::Raw(bytes) => Ok(bytes.clone()),
            ImagePayload::Base64(text) => base64::engine::general_purpose::STANDARD
                .decode(text.trim())
                .map_err(|err| format!("Invalid base64 image payload: {err}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentItem {
    Text(String),
    Image {
        payload: ImagePayload,
        /// Image format tag such as `png` or `jpeg`.
        format: String,
    },
}

impl ContentItem {
    pub fn text(value: impl Into<String>) -> Self {
        ContentItem::Text(value.into())
    }

    pub fn raw_image(bytes: Vec<u8>, format: impl Into<String>) -> Self {
        ContentItem::Image {
            payload: ImagePayload::Raw(bytes),
            format: format.into(),
        }
    }
}

/// Outcome of exactly one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResultEnvelope {
    pub content: Vec<ContentItem>,
    pub is_error: bool,
}

impl ResultEnvelope {
    pub fn success(content: Vec<ContentItem>) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem::Text(message.into())],
            is_error: true,
        }
    }

    /// All text items joined by newlines.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|item| match item {
                ContentItem::Text(text) => Some(text.as_str()),
                ContentItem::Image { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Maps an image MIME type (`image/png`) to its format tag (`png`).
pub fn format_from_mime_type(mime_type: &str) -> String {
    let mime_type = mime_type.trim().to_ascii_lowercase();
    let format = mime_type
        .strip_prefix("image/")
        .unwrap_or(mime_type.as_str())
        .split(';')
        .next()
        .unwrap_or_default()
        .trim();
    match format {
        "" => "png".to_string(),
        "jpg" => "jpeg".to_string(),
        other => other.to_string(),
    }
}

pub fn mime_type_for_format(format: &str) -> String {
    format!("image/{}", format.trim().to_ascii_lowercase())
}
