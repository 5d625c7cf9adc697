use crate::mcp::types::{
    format_from_mime_type, CapabilityDescriptor, CapabilityList, ContentItem, ImagePayload,
    ResultEnvelope,
};
use rust_mcp_schema::schema_utils::ServerMessage;
use rust_mcp_schema::{
    CallToolResult, ContentBlock, GetPromptResult, InitializeResult, ListPromptsResult,
    ListResourceTemplatesResult, ListResourcesResult, ListToolsResult, ReadResourceResult,
    RpcError, Tool,
};
use serde_json::Value;

pub(crate) fn parse_initialize_result(message: ServerMessage) -> Result<InitializeResult, String> {
    let value = parse_response_value(message)?;
    let result =
        serde_json::from_value::<InitializeResult>(value).map_err(|err| err.to_string())?;
    if result.protocol_version.trim().is_empty() {
        return Err("Unexpected initialize response.".to_string());
    }
    Ok(result)
}

pub(crate) fn parse_list_tools(message: ServerMessage) -> Result<ListToolsResult, String> {
    parse_response(message)
}

pub(crate) fn parse_list_resources(message: ServerMessage) -> Result<ListResourcesResult, String> {
    parse_response(message)
}

pub(crate) fn parse_list_resource_templates(
    message: ServerMessage,
) -> Result<ListResourceTemplatesResult, String> {
    parse_response(message)
}

pub(crate) fn parse_list_prompts(message: ServerMessage) -> Result<ListPromptsResult, String> {
    parse_response(message)
}

pub(crate) fn parse_get_prompt(message: ServerMessage) -> Result<GetPromptResult, String> {
    parse_response(message)
}

pub(crate) fn parse_read_resource(message: ServerMessage) -> Result<ReadResourceResult, String> {
    parse_response(message)
}

pub(crate) fn parse_call_tool(message: ServerMessage) -> Result<CallToolResult, String> {
    parse_response(message)
}

pub(crate) fn parse_empty_result(message: ServerMessage) -> Result<(), String> {
    parse_response_value(message).map(|_| ())
}

fn parse_response<T: serde::de::DeserializeOwned>(message: ServerMessage) -> Result<T, String> {
    let value = parse_response_value(message)?;
    serde_json::from_value::<T>(value).map_err(|err| err.to_string())
}

pub(crate) fn parse_response_value(message: ServerMessage) -> Result<Value, String> {
    match message {
        ServerMessage::Response(response) => {
            serde_json::to_value(&response.result).map_err(|err| err.to_string())
        }
        ServerMessage::Error(error) => Err(format_rpc_error(&error.error)),
        other => Err(format_unexpected_server_message(&other)),
    }
}

/// Returns the formatted JSON-RPC error when the message is an error reply.
pub(crate) fn rpc_error_message(message: &ServerMessage) -> Option<String> {
    match message {
        ServerMessage::Error(error) => Some(format_rpc_error(&error.error)),
        _ => None,
    }
}

pub(crate) fn capability_from_tool(tool: Tool) -> CapabilityDescriptor {
    let input_schema = serde_json::to_value(&tool.input_schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object"}));
    CapabilityDescriptor {
        name: tool.name,
        description: tool.description.unwrap_or_default(),
        input_schema,
    }
}

pub(crate) fn capability_list_from_tools(tools: Vec<Tool>) -> CapabilityList {
    CapabilityList::new(tools.into_iter().map(capability_from_tool).collect())
}

/// Resolves wire content blocks into the closed set of content items.
pub(crate) fn envelope_from_call_result(result: CallToolResult) -> ResultEnvelope {
    ResultEnvelope {
        content: result.content.into_iter().map(content_item_from_block).collect(),
        is_error: result.is_error.unwrap_or(false),
    }
}

fn content_item_from_block(block: ContentBlock) -> ContentItem {
    match block {
        ContentBlock::TextContent(text) => ContentItem::Text(text.text),
        ContentBlock::ImageContent(image) => ContentItem::Image {
            payload: ImagePayload::Base64(image.data),
            format: format_from_mime_type(&image.mime_type),
        },
        other => ContentItem::Text(
            serde_json::to_string(&other)
                .unwrap_or_else(|_| "Unsupported tool content.".to_string()),
        ),
    }
}

pub(crate) fn format_unexpected_server_message(message: &ServerMessage) -> String {
    format!("Unexpected MCP server message: {message:?}")
}

pub(crate) fn format_rpc_error(error: &RpcError) -> String {
    let mut output = format!("MCP error {}: {}", error.code, error.message);
    if let Some(data) = &error.data {
        let details = data
            .get("details")
            .and_then(|value| value.as_str())
            .map(|value| value.to_string())
            .or_else(|| data.as_str().map(|value| value.to_string()))
            .or_else(|| serde_json::to_string_pretty(data).ok());

        if let Some(details) = details {
            if !details.is_empty() {
                output.push('\n');
                output.push_str(&details);
            }
        }
    }
    output
}
