pub mod client;
pub mod dispatch;
pub mod error;
pub mod server;
pub mod transport;
pub mod types;

pub use client::{McpSession, SessionState};
pub use error::McpError;
