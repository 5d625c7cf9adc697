//! toolbridge lets a language model discover and call tools exposed by an
//! MCP server running as a child process.
//!
//! The crate is organized in layers:
//! - [`mcp`] owns the protocol side: launching a server over stdio, the
//!   session state machine, the dispatcher, and a reference capability
//!   server used by `toolbridge-server` and the tests.
//! - [`core`] turns a user query into at most one tool call through the
//!   [`core::decision`] engine, normalizes the result, and asks the model
//!   for a summary. [`core::orchestrator`] drives one query end to end.
//! - [`api`] defines the OpenAI-compatible chat payloads.
//! - [`cli`] parses arguments and runs the `toolbridge` subcommands.
//!
//! Runtime entrypoints live in `src/main.rs` and `src/bin/toolbridge-server.rs`.

pub mod api;
pub mod cli;
pub mod core;
pub mod logging;
pub mod mcp;
pub mod utils;
