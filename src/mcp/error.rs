//! Error taxonomy for the transport and session layers.

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

/// Errors raised while launching a server or talking to it.
#[derive(Debug)]
pub enum McpError {
    /// The server process could not be started.
    Launch {
        /// Executable that failed to start.
        command: String,
        /// The underlying spawn error.
        source: std::io::Error,
    },
    /// Handshake or ordering violation, or a response that does not match
    /// the protocol.
    Protocol(String),
    /// The transport closed while a request was outstanding.
    ChannelClosed(String),
    /// The server answered with a JSON-RPC error.
    Rpc(String),
    /// The caller-imposed deadline for a session call elapsed.
    Timeout(Duration),
}

impl McpError {
    /// Returns true for errors after which the session must be torn down.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, McpError::Rpc(_))
    }

    /// Short name of the failing stage, used in user-facing messages.
    pub fn stage(&self) -> &'static str {
        match self {
            McpError::Launch { .. } => "launch",
            McpError::Protocol(_) => "protocol",
            McpError::ChannelClosed(_) => "channel",
            McpError::Rpc(_) => "server",
            McpError::Timeout(_) => "timeout",
        }
    }
}

impl fmt::Display for McpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            McpError::Launch { command, source } => {
                write!(f, "Failed to launch MCP server `{command}`: {source}")
            }
            McpError::Protocol(message) => write!(f, "MCP protocol error: {message}"),
            McpError::ChannelClosed(message) => write!(f, "MCP channel closed: {message}"),
            McpError::Rpc(message) => write!(f, "{message}"),
            McpError::Timeout(duration) => {
                write!(f, "MCP request timed out after {}s", duration.as_secs())
            }
        }
    }
}

impl StdError for McpError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            McpError::Launch { source, .. } => Some(source),
            _ => None,
        }
    }
}
