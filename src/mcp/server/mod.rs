//! A newline-delimited JSON-RPC server that publishes a [`CapabilityRegistry`].
//!
//! The loop is generic over its streams so the same code serves a process's
//! stdio and in-memory duplex pipes in tests.

use crate::mcp::types::{mime_type_for_format, ContentItem};
use rust_mcp_schema::LATEST_PROTOCOL_VERSION;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

pub mod registry;
pub mod tools;


pub use registry::{CapabilityRegistry, RegistryError, ToolHandler};

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const SERVER_NOT_INITIALIZED: i64 = -32002;
const RESOURCE_NOT_FOUND: i64 = -32002;

struct RpcFailure {
    code: i64,
    message: String,
}

impl RpcFailure {
    fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Serves requests until the inbound stream ends.
pub async fn serve<R, W>(registry: Arc<CapabilityRegistry>, reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut server = ServerState {
        registry,
        initialized: false,
    };
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let reply = match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Array(items)) => {
                let mut replies = Vec::new();
                for item in items {
                    if let Some(reply) = server.handle_message(item).await {
                        replies.push(reply);
                    }
                }
                (!replies.is_empty()).then_some(Value::Array(replies))
            }
            Ok(value) => server.handle_message(value).await,
            Err(err) => {
                warn!(error = %err, "Discarding unparseable JSON-RPC line");
                Some(error_response(
                    Value::Null,
                    RpcFailure::new(PARSE_ERROR, format!("Parse error: {err}")),
                ))
            }
        };

        if let Some(reply) = reply {
            let payload = serde_json::to_string(&reply).map_err(std::io::Error::other)?;
            writer.write_all(payload.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
    }
    debug!("Client closed the server input stream");
    Ok(())
}

struct ServerState {
    registry: Arc<CapabilityRegistry>,
    initialized: bool,
}

impl ServerState {
    async fn handle_message(&mut self, message: Value) -> Option<Value> {
        let Value::Object(mut object) = message else {
            return Some(error_response(
                Value::Null,
                RpcFailure::new(INVALID_REQUEST, "Invalid request"),
            ));
        };

        let Some(method) = object
            .get("method")
            .and_then(Value::as_str)
            .map(str::to_string)
        else {
            // Responses to requests this server never sends.
            return None;
        };
        let params = object.remove("params").unwrap_or(Value::Null);

        let Some(id) = object.remove("id") else {
            self.handle_notification(&method);
            return None;
        };

        debug!(method = %method, id = %id, "Handling MCP request");
        Some(match self.handle_request(&method, params).await {
            Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
            Err(failure) => error_response(id, failure),
        })
    }

    fn handle_notification(&mut self, method: &str) {
        match method {
            "notifications/initialized" => {
                debug!("Client finished initialization");
            }
            other => debug!(method = %other, "Ignoring MCP notification"),
        }
    }

    async fn handle_request(&mut self, method: &str, params: Value) -> Result<Value, RpcFailure> {
        match method {
            "initialize" => return Ok(self.initialize(&params)),
            "ping" => return Ok(json!({})),
            _ => {}
        }

        if !self.initialized {
            return Err(RpcFailure::new(SERVER_NOT_INITIALIZED, "Server not initialized"));
        }

        match method {
            "tools/list" => self.list_tools(&params),
            "tools/call" => self.call_tool(params).await,
            "resources/list" => Ok(self.list_resources()),
            "resources/templates/list" => Ok(self.list_resource_templates()),
            "resources/read" => self.read_resource(&params),
            "prompts/list" => Ok(self.list_prompts()),
            "prompts/get" => self.get_prompt(params),
            other => Err(RpcFailure::new(
                METHOD_NOT_FOUND,
                format!("Method not found: {other}"),
            )),
        }
    }

    fn initialize(&mut self, params: &Value) -> Value {
        self.initialized = true;
        let protocol_version = params
            .get("protocolVersion")
            .and_then(Value::as_str)
            .filter(|version| !version.trim().is_empty())
            .unwrap_or(LATEST_PROTOCOL_VERSION);
        json!({
            "protocolVersion": protocol_version,
            "capabilities": {
                "tools": {"listChanged": false},
                "resources": {"listChanged": false, "subscribe": false},
                "prompts": {"listChanged": false}
            },
            "serverInfo": {
                "name": self.registry.server_name(),
                "version": self.registry.server_version()
            }
        })
    }

    fn list_tools(&self, params: &Value) -> Result<Value, RpcFailure> {
        let offset = match params.get("cursor").and_then(Value::as_str) {
            Some(cursor) => cursor
                .parse::<usize>()
                .map_err(|_| RpcFailure::new(INVALID_PARAMS, format!("Invalid cursor: {cursor}")))?,
            None => 0,
        };
        let (page, next) = self.registry.capability_page(offset);
        let tools: Vec<Value> = page
            .into_iter()
            .map(|descriptor| {
                json!({
                    "name": descriptor.name,
                    "description": descriptor.description,
                    "inputSchema": descriptor.input_schema
                })
            })
            .collect();
        let mut result = json!({"tools": tools});
        if let Some(next) = next {
            result["nextCursor"] = Value::String(next.to_string());
        }
        Ok(result)
    }

    async fn call_tool(&self, params: Value) -> Result<Value, RpcFailure> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcFailure::new(INVALID_PARAMS, "tools/call requires a tool name"))?;
        let arguments = match params.get("arguments") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(arguments)) => arguments.clone(),
            Some(_) => {
                return Err(RpcFailure::new(
                    INVALID_PARAMS,
                    "tools/call arguments must be an object",
                ))
            }
        };

        let output = self.registry.call_tool(name, &arguments).await;
        if output.is_error {
            debug!(tool = %name, "Tool reported an error");
        }
        let content: Vec<Value> = output.content.iter().map(content_to_wire).collect();
        Ok(json!({"content": content, "isError": output.is_error}))
    }

    fn list_resources(&self) -> Value {
        let resources: Vec<Value> = self
            .registry
            .resources()
            .iter()
            .map(|resource| {
                json!({
                    "uri": resource.uri,
                    "name": resource.name,
                    "description": resource.description,
                    "mimeType": resource.mime_type
                })
            })
            .collect();
        json!({"resources": resources})
    }

    fn list_resource_templates(&self) -> Value {
        let templates: Vec<Value> = self
            .registry
            .resource_templates()
            .iter()
            .map(|template| {
                json!({
                    "uriTemplate": template.uri_template,
                    "name": template.name,
                    "description": template.description,
                    "mimeType": template.mime_type
                })
            })
            .collect();
        json!({"resourceTemplates": templates})
    }

    fn read_resource(&self, params: &Value) -> Result<Value, RpcFailure> {
        let uri = params
            .get("uri")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcFailure::new(INVALID_PARAMS, "resources/read requires a uri"))?;
        let (mime_type, text) = self
            .registry
            .read_resource(uri)
            .ok_or_else(|| RpcFailure::new(RESOURCE_NOT_FOUND, format!("Resource not found: {uri}")))?;
        Ok(json!({
            "contents": [{"uri": uri, "mimeType": mime_type, "text": text}]
        }))
    }

    fn list_prompts(&self) -> Value {
        let prompts: Vec<Value> = self
            .registry
            .prompts()
            .iter()
            .map(|prompt| {
                let arguments: Vec<Value> = prompt
                    .arguments
                    .iter()
                    .map(|arg| {
                        json!({
                            "name": arg.name,
                            "description": arg.description,
                            "required": arg.required
                        })
                    })
                    .collect();
                json!({
                    "name": prompt.name,
                    "description": prompt.description,
                    "arguments": arguments
                })
            })
            .collect();
        json!({"prompts": prompts})
    }

    fn get_prompt(&self, params: Value) -> Result<Value, RpcFailure> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcFailure::new(INVALID_PARAMS, "prompts/get requires a name"))?;
        let arguments: HashMap<String, String> = match params.get("arguments") {
            None | Some(Value::Null) => HashMap::new(),
            Some(value) => serde_json::from_value(value.clone()).map_err(|err| {
                RpcFailure::new(INVALID_PARAMS, format!("Invalid prompt arguments: {err}"))
            })?,
        };
        let (description, text) = self
            .registry
            .render_prompt(name, &arguments)
            .map_err(|message| RpcFailure::new(INVALID_PARAMS, message))?;
        Ok(json!({
            "description": description,
            "messages": [{
                "role": "user",
                "content": {"type": "text", "text": text}
            }]
        }))
    }
}

fn content_to_wire(item: &ContentItem) -> Value {
    match item {
        ContentItem::Text(text) => json!({"type": "text", "text": text}),
        ContentItem::Image { payload, format } => json!({
            "type": "image",
            "data": payload.to_base64(),
            "mimeType": mime_type_for_format(format)
        }),
    }
}

fn error_response(id: Value, failure: RpcFailure) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {"code": failure.code, "message": failure.message}
    })
}
