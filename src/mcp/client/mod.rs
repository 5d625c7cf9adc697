//! Client side of the session protocol.
//!
//! A [`McpSession`] owns one server connection for its whole lifetime and
//! walks the `Uninitialized -> Initialized -> Closed` state machine. Requests
//! are written as newline-delimited JSON-RPC and matched to responses by id
//! through a pending map that a background reader task drains.

use crate::mcp::error::McpError;
use crate::mcp::transport::stdio::StdioTransport;
use crate::mcp::transport::{self, LaunchSpec, ListFetch};
use crate::mcp::types::{CapabilityList, InvocationRequest, ResultEnvelope};
use rust_mcp_schema::schema_utils::{
    ClientMessage, FromMessage, MessageFromClient, NotificationFromClient, RequestFromClient,
    ServerMessage,
};
use rust_mcp_schema::{
    CallToolRequestParams, ClientCapabilities, GetPromptRequestParams, GetPromptResult,
    Implementation, InitializeRequestParams, InitializeResult, ListPromptsResult,
    ListResourceTemplatesResult, ListResourcesResult, PaginatedRequestParams,
    ReadResourceRequestParams, ReadResourceResult, RequestId, ServerCapabilities,
    LATEST_PROTOCOL_VERSION,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

pub(crate) mod protocol;


const MCP_MAX_TOOL_LIST: usize = 100;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initialized,
    Closed,
}

#[derive(Default)]
struct PendingRequests {
    waiters: HashMap<RequestId, oneshot::Sender<Result<ServerMessage, String>>>,
    /// Set once the inbound stream has ended; no new waiters are accepted.
    closed: bool,
}

type SharedPending = Arc<Mutex<PendingRequests>>;

pub struct McpSession {
    server_id: String,
    state: SessionState,
    writer: Option<BoxedWriter>,
    pending: SharedPending,
    next_request_id: i64,
    reader_task: Option<JoinHandle<()>>,
    transport: Option<StdioTransport>,
    server_details: Option<InitializeResult>,
    capabilities: Option<CapabilityList>,
}

impl McpSession {
    /// Starts the server process described by `spec` and wires a session to
    /// its stdio. The session is returned uninitialized.
    pub fn spawn(server_id: &str, spec: &LaunchSpec) -> Result<Self, McpError> {
        let mut transport = StdioTransport::open(server_id, spec)?;
        let (stdout, stdin) = transport.take_streams().ok_or_else(|| McpError::Launch {
            command: spec.command.clone(),
            source: std::io::Error::other("Server streams already taken."),
        })?;
        let mut session = Self::from_streams(server_id, stdout, stdin);
        session.transport = Some(transport);
        Ok(session)
    }

    /// Builds a session over an arbitrary pair of byte streams.
    pub fn from_streams<R, W>(server_id: &str, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let pending: SharedPending = Arc::new(Mutex::new(PendingRequests::default()));
        let reader_task = Self::spawn_reader(pending.clone(), Box::new(reader), server_id.to_string());
        Self {
            server_id: server_id.to_string(),
            state: SessionState::Uninitialized,
            writer: Some(Box::new(writer)),
            pending,
            next_request_id: 0,
            reader_task: Some(reader_task),
            transport: None,
            server_details: None,
            capabilities: None,
        }
    }

    fn spawn_reader(pending: SharedPending, reader: BoxedReader, server_id: String) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(err) => {
                        debug!(server_id = %server_id, error = %err, "MCP read failed");
                        break;
                    }
                };
                let value = match serde_json::from_str::<serde_json::Value>(&line) {
                    Ok(value) => value,
                    Err(_) => {
                        debug!(server_id = %server_id, "Skipping non-JSON line from MCP server");
                        continue;
                    }
                };
                let items = match value {
                    serde_json::Value::Array(items) => items,
                    other => vec![other],
                };
                for item in items {
                    match serde_json::from_value::<ServerMessage>(item.clone()) {
                        Ok(message) => Self::dispatch_message(&pending, message, &server_id).await,
                        Err(err) => Self::reject_malformed(&pending, &item, &err, &server_id).await,
                    }
                }
            }

            debug!(server_id = %server_id, "MCP server stream ended");
            let mut pending = pending.lock().await;
            pending.closed = true;
            pending.waiters.clear();
        })
    }

    /// A reply that names a pending request but does not match the schema
    /// fails that request instead of leaving it waiting.
    async fn reject_malformed(
        pending: &SharedPending,
        item: &serde_json::Value,
        err: &serde_json::Error,
        server_id: &str,
    ) {
        let Some(id) = response_id(item) else {
            debug!(server_id = %server_id, error = %err, "Skipping unrecognized MCP message");
            return;
        };
        debug!(server_id = %server_id, response_id = ?id, error = %err, "Malformed MCP response");
        if let Some(tx) = pending.lock().await.waiters.remove(&id) {
            let _ = tx.send(Err(format!("malformed response: {err}")));
        }
    }

    async fn dispatch_message(pending: &SharedPending, message: ServerMessage, server_id: &str) {
        match &message {
            ServerMessage::Response(response) => {
                debug!(server_id = %server_id, response_id = ?response.id, "Received MCP response");
                if let Some(tx) = pending.lock().await.waiters.remove(&response.id) {
                    let _ = tx.send(Ok(message));
                }
            }
            ServerMessage::Error(error) => {
                debug!(
                    server_id = %server_id,
                    error_id = ?error.id,
                    error_code = error.error.code,
                    "Received MCP error"
                );
                if let Some(id) = error.id.as_ref() {
                    if let Some(tx) = pending.lock().await.waiters.remove(id) {
                        let _ = tx.send(Ok(message));
                    }
                }
            }
            ServerMessage::Request(request) => {
                debug!(
                    server_id = %server_id,
                    method = %request.method(),
                    "Ignoring server-initiated MCP request"
                );
            }
            ServerMessage::Notification(_) => {
                debug!(server_id = %server_id, "Received MCP notification");
            }
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn server_details(&self) -> Option<&InitializeResult> {
        self.server_details.as_ref()
    }

    /// The capability list most recently fetched from the server.
    pub fn capabilities(&self) -> Option<&CapabilityList> {
        self.capabilities.as_ref()
    }

    fn server_capabilities(&self) -> Option<&ServerCapabilities> {
        self.server_details
            .as_ref()
            .map(|details| &details.capabilities)
    }

    fn supports_tools(&self) -> bool {
        self.server_capabilities()
            .map(|caps| caps.tools.is_some())
            .unwrap_or(true)
    }

    fn supports_resources(&self) -> bool {
        self.server_capabilities()
            .map(|caps| caps.resources.is_some())
            .unwrap_or(true)
    }

    fn supports_prompts(&self) -> bool {
        self.server_capabilities()
            .map(|caps| caps.prompts.is_some())
            .unwrap_or(true)
    }

    fn require_initialized(&self, operation: &str) -> Result<(), McpError> {
        match self.state {
            SessionState::Initialized => Ok(()),
            SessionState::Uninitialized => Err(McpError::Protocol(format!(
                "{operation} called before initialize"
            ))),
            SessionState::Closed => Err(McpError::Protocol(format!(
                "{operation} called on a closed session"
            ))),
        }
    }

    /// Performs the handshake. Must succeed exactly once before any other
    /// call.
    pub async fn initialize(&mut self) -> Result<&InitializeResult, McpError> {
        match self.state {
            SessionState::Uninitialized => {}
            SessionState::Initialized => {
                return Err(McpError::Protocol("initialize called twice".to_string()));
            }
            SessionState::Closed => {
                return Err(McpError::Protocol(
                    "initialize called on a closed session".to_string(),
                ));
            }
        }

        let response = self
            .send_request(RequestFromClient::InitializeRequest(client_details()))
            .await?;
        if let Some(message) = protocol::rpc_error_message(&response) {
            return Err(McpError::Protocol(format!("initialize rejected: {message}")));
        }
        let result = protocol::parse_initialize_result(response).map_err(McpError::Protocol)?;
        debug!(
            server_id = %self.server_id,
            protocol_version = %result.protocol_version,
            server = %result.server_info.name,
            "MCP session initialized"
        );

        self.send_notification(NotificationFromClient::InitializedNotification(None))
            .await?;
        self.state = SessionState::Initialized;
        Ok(self.server_details.insert(result))
    }

    /// Fetches every tool the server publishes, following pagination
    /// cursors up to a fixed cap.
    pub async fn list_capabilities(&mut self) -> Result<CapabilityList, McpError> {
        self.require_initialized("list_capabilities")?;
        if !self.supports_tools() {
            let empty = CapabilityList::default();
            self.capabilities = Some(empty.clone());
            return Ok(empty);
        }

        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen_cursors = HashSet::new();
        loop {
            let response = self
                .send_request(RequestFromClient::ListToolsRequest(paginated_params(
                    cursor.take(),
                )))
                .await?;
            if transport::is_method_not_found(&response) {
                break;
            }
            // A refused tools/list is a protocol failure.
            let page = expect_result(response, protocol::parse_list_tools).map_err(|err| match err {
                McpError::Rpc(message) => McpError::Protocol(format!("tools/list rejected: {message}")),
                other => other,
            })?;
            tools.extend(page.tools);
            if tools.len() >= MCP_MAX_TOOL_LIST {
                tools.truncate(MCP_MAX_TOOL_LIST);
                break;
            }
            match page.next_cursor {
                Some(next) if !next.is_empty() && seen_cursors.insert(next.clone()) => {
                    cursor = Some(next);
                }
                _ => break,
            }
        }

        let list = protocol::capability_list_from_tools(tools);
        debug!(server_id = %self.server_id, count = list.len(), "Fetched MCP tool list");
        self.capabilities = Some(list.clone());
        Ok(list)
    }

    /// Issues one tool call. A JSON-RPC error from the server surfaces as
    /// [`McpError::Rpc`]; a tool that ran and failed comes back as an
    /// envelope with `is_error` set.
    pub async fn invoke(&mut self, request: &InvocationRequest) -> Result<ResultEnvelope, McpError> {
        self.require_initialized("invoke")?;
        let params = CallToolRequestParams::new(&request.capability_name)
            .with_arguments(request.arguments.clone());
        debug!(server_id = %self.server_id, tool = %request.capability_name, "Invoking MCP tool");
        let response = self
            .send_request(RequestFromClient::CallToolRequest(params))
            .await?;
        let result = expect_result(response, protocol::parse_call_tool)?;
        Ok(protocol::envelope_from_call_result(result))
    }

    pub async fn list_resources(&mut self) -> Result<ListResourcesResult, McpError> {
        self.require_initialized("list_resources")?;
        if !self.supports_resources() {
            return Ok(empty_resources_list());
        }
        let response = self
            .send_request(RequestFromClient::ListResourcesRequest(None))
            .await?;
        list_fetch_result(
            transport::list_fetch_from_response(response, protocol::parse_list_resources),
            empty_resources_list,
        )
    }

    pub async fn list_resource_templates(
        &mut self,
    ) -> Result<ListResourceTemplatesResult, McpError> {
        self.require_initialized("list_resource_templates")?;
        if !self.supports_resources() {
            return Ok(empty_resource_templates_list());
        }
        let response = self
            .send_request(RequestFromClient::ListResourceTemplatesRequest(None))
            .await?;
        list_fetch_result(
            transport::list_fetch_from_response(
                response,
                protocol::parse_list_resource_templates,
            ),
            empty_resource_templates_list,
        )
    }

    pub async fn read_resource(&mut self, uri: &str) -> Result<ReadResourceResult, McpError> {
        self.require_initialized("read_resource")?;
        let params = ReadResourceRequestParams {
            meta: None,
            uri: uri.to_string(),
        };
        let response = self
            .send_request(RequestFromClient::ReadResourceRequest(params))
            .await?;
        expect_result(response, protocol::parse_read_resource)
    }

    pub async fn list_prompts(&mut self) -> Result<ListPromptsResult, McpError> {
        self.require_initialized("list_prompts")?;
        if !self.supports_prompts() {
            return Ok(empty_prompts_list());
        }
        let response = self
            .send_request(RequestFromClient::ListPromptsRequest(None))
            .await?;
        list_fetch_result(
            transport::list_fetch_from_response(response, protocol::parse_list_prompts),
            empty_prompts_list,
        )
    }

    pub async fn get_prompt(
        &mut self,
        name: &str,
        arguments: HashMap<String, String>,
    ) -> Result<GetPromptResult, McpError> {
        self.require_initialized("get_prompt")?;
        let params = GetPromptRequestParams {
            name: name.to_string(),
            arguments: (!arguments.is_empty()).then_some(arguments),
            meta: None,
        };
        let response = self
            .send_request(RequestFromClient::GetPromptRequest(params))
            .await?;
        expect_result(response, protocol::parse_get_prompt)
    }

    pub async fn ping(&mut self) -> Result<(), McpError> {
        self.require_initialized("ping")?;
        let response = self
            .send_request(RequestFromClient::PingRequest(None))
            .await?;
        expect_result(response, protocol::parse_empty_result)
    }

    /// Releases the channel and stops the server process. Idempotent;
    /// closing an uninitialized session is allowed.
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closed;
        debug!(server_id = %self.server_id, "Closing MCP session");

        if let Some(mut writer) = self.writer.take() {
            let _ = writer.shutdown().await;
        }
        if let Some(transport) = self.transport.as_mut() {
            transport.close().await;
        }
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        let mut pending = self.pending.lock().await;
        pending.closed = true;
        pending.waiters.clear();
    }

    fn next_request_id(&mut self) -> RequestId {
        let id = self.next_request_id;
        self.next_request_id += 1;
        RequestId::Integer(id)
    }

    async fn send_request(&mut self, request: RequestFromClient) -> Result<ServerMessage, McpError> {
        let request_id = self.next_request_id();
        let message = ClientMessage::from_message(
            MessageFromClient::RequestFromClient(request),
            Some(request_id.clone()),
        )
        .map_err(|err| McpError::Protocol(err.to_string()))?;

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            if pending.closed {
                return Err(McpError::ChannelClosed(
                    "server closed its output stream".to_string(),
                ));
            }
            pending.waiters.insert(request_id.clone(), tx);
        }

        debug!(server_id = %self.server_id, request_id = ?request_id, "Sending MCP request");
        if let Err(err) = self.write_message(&message).await {
            self.pending.lock().await.waiters.remove(&request_id);
            return Err(err);
        }

        match rx.await {
            Ok(Ok(message)) => {
                debug!(server_id = %self.server_id, request_id = ?request_id, "MCP response received");
                Ok(message)
            }
            Ok(Err(message)) => Err(McpError::Protocol(message)),
            Err(_) => Err(McpError::ChannelClosed(
                "server closed the connection before responding".to_string(),
            )),
        }
    }

    async fn send_notification(&mut self, notification: NotificationFromClient) -> Result<(), McpError> {
        let message = ClientMessage::from_message(
            MessageFromClient::NotificationFromClient(notification),
            None,
        )
        .map_err(|err| McpError::Protocol(err.to_string()))?;
        self.write_message(&message).await
    }

    async fn write_message(&mut self, message: &ClientMessage) -> Result<(), McpError> {
        let payload =
            serde_json::to_string(message).map_err(|err| McpError::Protocol(err.to_string()))?;
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| McpError::ChannelClosed("session writer released".to_string()))?;
        let closed = |err: std::io::Error| McpError::ChannelClosed(err.to_string());
        writer.write_all(payload.as_bytes()).await.map_err(closed)?;
        writer.write_all(b"\n").await.map_err(closed)?;
        writer.flush().await.map_err(closed)?;
        Ok(())
    }
}

impl Drop for McpSession {
    fn drop(&mut self) {
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
    }
}

fn expect_result<T>(
    response: ServerMessage,
    parse: fn(ServerMessage) -> Result<T, String>,
) -> Result<T, McpError> {
    if let Some(message) = protocol::rpc_error_message(&response) {
        return Err(McpError::Rpc(message));
    }
    parse(response).map_err(McpError::Protocol)
}

/// Id of a message shaped like a response (no `method`), if it has one.
fn response_id(item: &serde_json::Value) -> Option<RequestId> {
    if item.get("method").is_some() {
        return None;
    }
    match item.get("id")? {
        serde_json::Value::Number(number) => number.as_i64().map(RequestId::Integer),
        serde_json::Value::String(text) => Some(RequestId::String(text.clone())),
        _ => None,
    }
}

fn list_fetch_result<T>(fetch: ListFetch<T>, empty: fn() -> T) -> Result<T, McpError> {
    match fetch {
        ListFetch::Ok(list) => Ok(list),
        ListFetch::MethodNotFound => Ok(empty()),
        ListFetch::Err(message) => Err(McpError::Rpc(message)),
    }
}

fn paginated_params(cursor: Option<String>) -> Option<PaginatedRequestParams> {
    cursor.map(|cursor| PaginatedRequestParams {
        cursor: Some(cursor),
        meta: None,
    })
}

fn empty_resources_list() -> ListResourcesResult {
    ListResourcesResult {
        meta: None,
        next_cursor: None,
        resources: Vec::new(),
    }
}

fn empty_resource_templates_list() -> ListResourceTemplatesResult {
    ListResourceTemplatesResult {
        meta: None,
        next_cursor: None,
        resource_templates: Vec::new(),
    }
}

fn empty_prompts_list() -> ListPromptsResult {
    ListPromptsResult {
        meta: None,
        next_cursor: None,
        prompts: Vec::new(),
    }
}

fn client_details() -> InitializeRequestParams {
    InitializeRequestParams {
        capabilities: ClientCapabilities::default(),
        client_info: Implementation {
            name: "toolbridge".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            title: Some("Toolbridge".to_string()),
            description: Some("Language-model tool orchestration client".to_string()),
            icons: Vec::new(),
            website_url: None,
        },
        meta: None,
        protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
    }
}
