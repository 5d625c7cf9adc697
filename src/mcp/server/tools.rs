//! Tools, resources and prompts published by `toolbridge-server`.

use super::registry::{
    CapabilityRegistry, CapabilityRegistryBuilder, PromptTemplate, RegistryError,
    ResourceTemplate, StaticResource, ToolHandler,
};
use crate::mcp::types::{CapabilityDescriptor, ContentItem};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

const DEFAULT_SCREENSHOT_FILENAME: &str = "captured_image.png";

const GET_STARTED_PROMPT: &str = "You are using the toolbridge demo server. Here are some things you can try:

1. Say hello to the world:
   - Use the hello_world tool without parameters
   - Example: \"Say hello to the world\"

2. Greet someone specific:
   - Use the hello_world tool with a name
   - Example: \"Say hello to Alice\"

3. Access the greeting resource:
   - Use the greeting://{name} resource
   - Example: \"Get a greeting for Bob\"

4. Do some arithmetic:
   - Use calculate_sum or calculate_bmi
   - Example: \"What is the BMI of someone 70kg and 175cm tall?\"";

/// Options for the demo server's tool set.
#[derive(Debug, Clone, Default)]
pub struct DemoServerOptions {
    /// Image file served by `take_screenshot`. Without one the tool reports
    /// that no camera is available.
    pub capture_source: Option<PathBuf>,
    /// Directory where `take_screenshot` also keeps a copy of each capture.
    pub save_dir: Option<PathBuf>,
    pub page_size: Option<usize>,
}

pub fn demo_registry(options: DemoServerOptions) -> Result<CapabilityRegistry, RegistryError> {
    let mut builder = register_demo_capabilities(CapabilityRegistry::builder(
        "toolbridge-demo",
        env!("CARGO_PKG_VERSION"),
    ));
    builder = builder.tool(
        screenshot_descriptor(),
        ScreenshotTool {
            source: options.capture_source,
            save_dir: options.save_dir,
        },
    );
    if let Some(size) = options.page_size {
        builder = builder.page_size(size);
    }
    builder.build()
}

fn register_demo_capabilities(builder: CapabilityRegistryBuilder) -> CapabilityRegistryBuilder {
    builder
        .tool(bmi_descriptor(), BmiTool)
        .tool(hello_descriptor(), HelloTool)
        .tool(sum_descriptor(), SumTool)
        .resource(StaticResource {
            uri: "greeting://default".to_string(),
            name: "default-greeting".to_string(),
            description: Some("Get the default greeting".to_string()),
            mime_type: "text/plain".to_string(),
            text: "Hello, World!".to_string(),
        })
        .resource_template(ResourceTemplate {
            uri_template: "greeting://{name}".to_string(),
            name: "greeting".to_string(),
            description: Some("Get a personalized greeting".to_string()),
            mime_type: "text/plain".to_string(),
            render: Arc::new(|params| {
                format!(
                    "Hello, {}!",
                    params.get("name").map(String::as_str).unwrap_or("World")
                )
            }),
        })
        .prompt(PromptTemplate {
            name: "get-started".to_string(),
            description: Some("A helpful prompt to get started with the demo server".to_string()),
            arguments: Vec::new(),
            render: Arc::new(|_| GET_STARTED_PROMPT.to_string()),
        })
}

fn bmi_descriptor() -> CapabilityDescriptor {
    CapabilityDescriptor::new(
        "calculate_bmi",
        "Calculate BMI given weight in kg and height in centimeters. Returns the BMI value rounded to two decimals and its category (Underweight, Normal, Overweight, Obese).",
        json!({
            "type": "object",
            "properties": {
                "weight_kg": {
                    "type": "number",
                    "exclusiveMinimum": 0,
                    "description": "Weight in kilograms"
                },
                "height_cm": {
                    "type": "number",
                    "exclusiveMinimum": 0,
                    "description": "Height in centimeters"
                }
            },
            "required": ["weight_kg", "height_cm"]
        }),
    )
}

fn hello_descriptor() -> CapabilityDescriptor {
    CapabilityDescriptor::new(
        "hello_world",
        "Returns a friendly greeting message",
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "default": "World"}
            }
        }),
    )
}

fn sum_descriptor() -> CapabilityDescriptor {
    CapabilityDescriptor::new(
        "calculate_sum",
        "Returns the sum of two numbers",
        json!({
            "type": "object",
            "properties": {
                "a": {"type": "integer"},
                "b": {"type": "integer"}
            },
            "required": ["a", "b"]
        }),
    )
}

fn screenshot_descriptor() -> CapabilityDescriptor {
    CapabilityDescriptor::new(
        "take_screenshot",
        "Capture a single frame from the camera and return it as a PNG image.",
        json!({
            "type": "object",
            "properties": {
                "output_filename": {
                    "type": "string",
                    "default": DEFAULT_SCREENSHOT_FILENAME,
                    "description": "Name of the file to save the captured image"
                }
            }
        }),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BmiCategory {
    Underweight,
    Normal,
    Overweight,
    Obese,
}

/// Thresholds are half-open: 18.5 is Normal, 25.0 is Overweight, 30.0 is
/// Obese.
pub fn bmi_category(bmi: f64) -> BmiCategory {
    if bmi < 18.5 {
        BmiCategory::Underweight
    } else if bmi < 25.0 {
        BmiCategory::Normal
    } else if bmi < 30.0 {
        BmiCategory::Overweight
    } else {
        BmiCategory::Obese
    }
}

#[derive(Debug, Serialize)]
struct BmiResponse {
    bmi: f64,
    category: BmiCategory,
}

/// Category is decided on the unrounded value.
fn calculate_bmi(weight_kg: f64, height_cm: f64) -> BmiResponse {
    let height_m = height_cm / 100.0;
    let bmi = weight_kg / (height_m * height_m);
    BmiResponse {
        bmi: (bmi * 100.0).round() / 100.0,
        category: bmi_category(bmi),
    }
}

fn number_argument(arguments: &Map<String, Value>, name: &str) -> Result<f64, String> {
    arguments
        .get(name)
        .and_then(Value::as_f64)
        .ok_or_else(|| format!("Missing numeric argument `{name}`"))
}

fn integer_argument(arguments: &Map<String, Value>, name: &str) -> Result<i64, String> {
    arguments
        .get(name)
        .and_then(Value::as_i64)
        .ok_or_else(|| format!("Missing integer argument `{name}`"))
}

struct BmiTool;

#[async_trait]
impl ToolHandler for BmiTool {
    async fn call(&self, arguments: &Map<String, Value>) -> Result<Vec<ContentItem>, String> {
        let weight_kg = number_argument(arguments, "weight_kg")?;
        let height_cm = number_argument(arguments, "height_cm")?;
        let response = calculate_bmi(weight_kg, height_cm);
        let text = serde_json::to_string(&response).map_err(|err| err.to_string())?;
        Ok(vec![ContentItem::Text(text)])
    }
}

struct HelloTool;

#[async_trait]
impl ToolHandler for HelloTool {
    async fn call(&self, arguments: &Map<String, Value>) -> Result<Vec<ContentItem>, String> {
        let name = arguments
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("World");
        Ok(vec![ContentItem::Text(format!("Hello, {name}!"))])
    }
}

struct SumTool;

#[async_trait]
impl ToolHandler for SumTool {
    async fn call(&self, arguments: &Map<String, Value>) -> Result<Vec<ContentItem>, String> {
        let a = integer_argument(arguments, "a")?;
        let b = integer_argument(arguments, "b")?;
        let sum = a
            .checked_add(b)
            .ok_or_else(|| "Sum overflows a 64-bit integer".to_string())?;
        Ok(vec![ContentItem::Text(sum.to_string())])
    }
}

struct ScreenshotTool {
    source: Option<PathBuf>,
    save_dir: Option<PathBuf>,
}

#[async_trait]
impl ToolHandler for ScreenshotTool {
    async fn call(&self, arguments: &Map<String, Value>) -> Result<Vec<ContentItem>, String> {
        let filename = arguments
            .get("output_filename")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_SCREENSHOT_FILENAME);
        if filename.is_empty() || filename.contains(['/', '\\']) || filename == ".." {
            return Err(format!("Invalid output filename: {filename}"));
        }

        let Some(source) = self.source.as_deref() else {
            return Err(
                "Failed to capture webcam screenshot: camera not found. Ensure the webcam is connected and accessible."
                    .to_string(),
            );
        };
        let bytes = tokio::fs::read(source)
            .await
            .map_err(|err| format!("Failed to capture webcam screenshot: {err}"))?;
        if bytes.is_empty() {
            return Err("Failed to capture image from the webcam.".to_string());
        }

        if let Some(dir) = self.save_dir.as_deref() {
            save_capture(dir, filename, &bytes).await?;
        }

        let format = sniff_image_format(&bytes);
        Ok(vec![ContentItem::raw_image(bytes, format)])
    }
}

async fn save_capture(dir: &Path, filename: &str, bytes: &[u8]) -> Result<(), String> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|err| format!("Failed to create {}: {err}", dir.display()))?;
    let path = dir.join(filename);
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|err| format!("Failed to save {}: {err}", path.display()))?;
    debug!(path = %path.display(), "Saved captured frame");
    Ok(())
}

fn sniff_image_format(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "jpeg"
    } else if bytes.starts_with(b"GIF8") {
        "gif"
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "webp"
    } else {
        "png"
    }
}
