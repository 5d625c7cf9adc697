//! Canonical rendering of tool results and optional image persistence.

use crate::mcp::types::{ContentItem, ImagePayload, ResultEnvelope};
use crate::utils::url::image_data_uri;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanonicalItem {
    Text(String),
    Image { format: String, base64: String },
}

impl CanonicalItem {
    pub fn data_uri(&self) -> Option<String> {
        match self {
            CanonicalItem::Image { format, base64 } => Some(image_data_uri(format, base64)),
            CanonicalItem::Text(_) => None,
        }
    }
}

/// A successful tool result with every image in base64 form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalResult {
    pub items: Vec<CanonicalItem>,
}

impl CanonicalResult {
    pub fn text(&self) -> String {
        self.items
            .iter()
            .filter_map(|item| match item {
                CanonicalItem::Text(text) => Some(text.as_str()),
                CanonicalItem::Image { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn image_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(item, CanonicalItem::Image { .. }))
            .count()
    }

    pub fn image_data_uris(&self) -> Vec<String> {
        self.items.iter().filter_map(CanonicalItem::data_uri).collect()
    }

    /// Every item as text, with images inlined as data URIs.
    pub fn render(&self) -> String {
        self.items
            .iter()
            .map(|item| match item {
                CanonicalItem::Text(text) => text.clone(),
                CanonicalItem::Image { format, base64 } => image_data_uri(format, base64),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// The tool reported failure; carries its own text unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationError {
    pub message: String,
}

impl fmt::Display for InvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for InvocationError {}

pub fn normalize(envelope: &ResultEnvelope) -> Result<CanonicalResult, InvocationError> {
    if envelope.is_error {
        return Err(InvocationError {
            message: envelope.text(),
        });
    }

    let items = envelope
        .content
        .iter()
        .map(|item| match item {
            ContentItem::Text(text) => CanonicalItem::Text(text.clone()),
            ContentItem::Image { payload, format } => CanonicalItem::Image {
                format: format.clone(),
                base64: payload.to_base64(),
            },
        })
        .collect();
    Ok(CanonicalResult { items })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceError {
    pub path: PathBuf,
    pub message: String,
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to save {}: {}", self.path.display(), self.message)
    }
}

impl std::error::Error for PersistenceError {}

/// Destination for persisted image bytes.
pub trait OutputSink: Send + Sync {
    fn write(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()>;
}

/// Writes to the local filesystem, creating parent directories.
pub struct FsOutputSink;

impl OutputSink for FsOutputSink {
    fn write(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, bytes)
    }
}

#[derive(Debug, Default)]
pub struct PersistReport {
    pub saved: Vec<PathBuf>,
    pub failures: Vec<PersistenceError>,
}

/// Saves every image under `output_dir`. Failures are logged and collected,
/// never returned as an error.
pub fn persist_images(
    result: &CanonicalResult,
    sink: &dyn OutputSink,
    output_dir: &Path,
) -> PersistReport {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
    persist_images_with_stamp(result, sink, output_dir, &stamp)
}

fn persist_images_with_stamp(
    result: &CanonicalResult,
    sink: &dyn OutputSink,
    output_dir: &Path,
    stamp: &str,
) -> PersistReport {
    let mut report = PersistReport::default();
    let images = result.items.iter().filter_map(|item| match item {
        CanonicalItem::Image { format, base64 } => Some((format, base64)),
        CanonicalItem::Text(_) => None,
    });

    for (index, (format, base64)) in images.enumerate() {
        let path = output_dir.join(format!(
            "image-{stamp}-{}.{}",
            index + 1,
            file_extension(format)
        ));
        let outcome = ImagePayload::Base64(base64.clone())
            .to_bytes()
            .and_then(|bytes| sink.write(&path, &bytes).map_err(|err| err.to_string()));
        match outcome {
            Ok(()) => {
                info!(path = %path.display(), "Saved image content");
                report.saved.push(path);
            }
            Err(message) => {
                let error = PersistenceError { path, message };
                warn!(error = %error, "Image persistence failed");
                report.failures.push(error);
            }
        }
    }
    report
}

fn file_extension(format: &str) -> &str {
    match format {
        "jpeg" => "jpg",
        "svg+xml" => "svg",
        other if !other.is_empty() && other.chars().all(|c| c.is_ascii_alphanumeric()) => other,
        _ => "bin",
    }
}
