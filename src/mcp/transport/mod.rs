//! Transport layer: how a server process is started and how its byte
//! streams are handed to the session.

use rust_mcp_schema::schema_utils::ServerMessage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

pub mod stdio;

/// JSON-RPC code used by servers to indicate unsupported methods.
pub const MCP_METHOD_NOT_FOUND: i64 = -32601;

/// How to start a server process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchSpec {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Variables added on top of the inherited environment.
    #[serde(default)]
    pub env: Option<HashMap<String, String>>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

impl LaunchSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: None,
            cwd: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Command line rendered for logs and error messages.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}

/// Normalized outcome for optional list calls.
pub enum ListFetch<T> {
    Ok(T),
    MethodNotFound,
    Err(String),
}

/// Converts a response into a list-fetch status while preserving
/// "method not found" as a soft capability signal.
pub fn list_fetch_from_response<T>(
    response: ServerMessage,
    parse: impl FnOnce(ServerMessage) -> Result<T, String>,
) -> ListFetch<T> {
    if is_method_not_found(&response) {
        return ListFetch::MethodNotFound;
    }
    match parse(response) {
        Ok(list) => ListFetch::Ok(list),
        Err(err) => ListFetch::Err(err),
    }
}

/// Returns true when a server reports the JSON-RPC method-not-found code.
pub fn is_method_not_found(message: &ServerMessage) -> bool {
    matches!(
        message,
        ServerMessage::Error(error) if error.error.code == MCP_METHOD_NOT_FOUND
    )
}
