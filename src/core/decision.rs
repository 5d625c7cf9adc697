//! Turns a user query plus the server's capabilities into a single model
//! prompt, and the model's completion back into either a tool call or an
//! answer.
//!
//! Completions are untrusted. Parsing is total: every input maps to one
//! [`Decision`] variant and nothing here returns an error.

use crate::mcp::types::{CapabilityList, InvocationRequest};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use tracing::{debug, warn};

const TOOL_PREFIX: &str = "Tool: ";

/// Capability block listing each tool's name, description and schema.
///
/// Schemas render as compact JSON with sorted keys so the same list always
/// produces the same text.
pub fn serialize_capabilities(capabilities: &CapabilityList) -> String {
    capabilities
        .capabilities
        .iter()
        .map(|capability| {
            format!(
                "{TOOL_PREFIX}{}\nDescription: {}\nInput Schema: {}\n",
                single_line(&capability.name),
                single_line(&capability.description),
                canonical_json(&capability.input_schema)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Tool names read back out of a block built by [`serialize_capabilities`].
pub fn capability_names_in_block(block: &str) -> Vec<String> {
    block
        .lines()
        .filter_map(|line| line.strip_prefix(TOOL_PREFIX))
        .map(str::to_string)
        .collect()
}

pub fn build_selection_prompt(capabilities: &CapabilityList, query: &str) -> String {
    let tools_info = if capabilities.is_empty() {
        "(no tools are available)\n".to_string()
    } else {
        serialize_capabilities(capabilities)
    };
    format!(
        "You are a helpful AI assistant with access to specialized tools. \
Your task is to help users by either:
1. Directly answering their questions when no tool is needed
2. Using the appropriate tool when required

Available Tools:
{tools_info}
User's Question: {query}

If you need to use a tool, respond ONLY with a JSON object in this exact format:
{{
    \"tool\": \"tool-name\",
    \"arguments\": {{
        \"argument-name\": \"value\"
    }}
}}

If no tool is needed, respond directly with your answer.

Remember:
- Only use tools when necessary
- Only name tools from the list above
- Follow the exact JSON format when using tools
- Provide clear, helpful responses when answering directly"
    )
}

/// What the model asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    StructuredCall(InvocationRequest),
    PlainAnswer(String),
    /// Looked like a tool call but did not satisfy the contract.
    ParseFailure { raw: String, reason: String },
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ToolCallObject {
    tool: String,
    #[serde(deserialize_with = "nullable_object")]
    arguments: Map<String, Value>,
}

/// `arguments` must be present; `null` stands for no arguments.
fn nullable_object<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Map<String, Value>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

pub fn parse_decision(completion: &str) -> Decision {
    let trimmed = completion.trim();
    let candidate = strip_code_fence(trimmed);
    if !candidate.starts_with('{') {
        return Decision::PlainAnswer(trimmed.to_string());
    }

    match serde_json::from_str::<ToolCallObject>(candidate) {
        Ok(call) if call.tool.trim().is_empty() => Decision::ParseFailure {
            raw: trimmed.to_string(),
            reason: "tool name is empty".to_string(),
        },
        Ok(call) => Decision::StructuredCall(InvocationRequest::new(
            call.tool.trim(),
            call.arguments,
        )),
        Err(err) => Decision::ParseFailure {
            raw: trimmed.to_string(),
            reason: err.to_string(),
        },
    }
}

/// The next step once a decision has been checked against the tool list.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Invoke(InvocationRequest),
    DirectAnswer(String),
    UnknownCapability { name: String, available: Vec<String> },
}

pub fn resolve(decision: Decision, capabilities: &CapabilityList) -> Resolution {
    match decision {
        Decision::StructuredCall(request) => {
            if capabilities.contains(&request.capability_name) {
                debug!(tool = %request.capability_name, "Model selected a tool");
                Resolution::Invoke(request)
            } else {
                warn!(tool = %request.capability_name, "Model selected an unknown tool");
                Resolution::UnknownCapability {
                    name: request.capability_name,
                    available: capabilities.names(),
                }
            }
        }
        Decision::PlainAnswer(answer) => Resolution::DirectAnswer(answer),
        Decision::ParseFailure { raw, reason } => {
            warn!(reason = %reason, "Model output was not a valid tool call; using it as the answer");
            Resolution::DirectAnswer(raw)
        }
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(body) = text.strip_prefix("```") else {
        return text;
    };
    let Some(body) = body.strip_suffix("```") else {
        return text;
    };
    // Drop the info string (```json).
    match body.split_once('\n') {
        Some((info, rest)) if !info.trim_start().starts_with('{') => rest.trim(),
        _ => body.trim(),
    }
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Compact JSON with object keys in sorted order at every depth.
pub fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|key| {
                    format!(
                        "{}:{}",
                        Value::String(key.clone()),
                        canonical_json(&map[key.as_str()])
                    )
                })
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        scalar => scalar.to_string(),
    }
}

#[cfg(test)]
mod tests;
