//! Runs one query end to end: discovery, decision, dispatch, normalization,
//! persistence and summary, strictly in that order.
//!
//! Every session call is bounded by the configured session timeout. Session
//! errors other than server-side JSON-RPC errors during invocation abort the
//! query and tear the session down; everything else becomes a
//! [`QueryOutcome`] with a best-effort answer.

use crate::core::config::{Config, ImagePolicy};
use crate::core::decision::{build_selection_prompt, parse_decision, resolve, Decision, Resolution};
use crate::core::llm::{LanguageModel, ModelRequest};
use crate::core::normalize::{
    normalize, persist_images, CanonicalResult, InvocationError, OutputSink, PersistReport,
    PersistenceError,
};
use crate::core::summary::build_summary_request;
use crate::mcp::dispatch::dispatch;
use crate::mcp::transport::LaunchSpec;
use crate::mcp::types::{CapabilityList, InvocationRequest};
use crate::mcp::{McpError, McpSession};
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    pub session_timeout: Duration,
    pub image_policy: ImagePolicy,
    /// `None` disables image persistence.
    pub output_dir: Option<PathBuf>,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            session_timeout: config.session_timeout(),
            image_policy: config.image_policy(),
            output_dir: config.persist_images().then(|| config.output_dir()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// The model answered without a tool, or its tool call was unusable.
    Direct { answer: String },
    Tool {
        request: InvocationRequest,
        result: CanonicalResult,
        /// `None` when no summary was requested or the summary call failed.
        summary: Option<String>,
        saved_images: Vec<PathBuf>,
        persist_failures: Vec<PersistenceError>,
    },
    ToolFailed {
        request: InvocationRequest,
        error: InvocationError,
    },
    UnknownCapability { name: String, available: Vec<String> },
    ModelFailed { message: String },
}

impl QueryOutcome {
    /// The text shown to the user for this outcome.
    pub fn final_response(&self) -> String {
        match self {
            QueryOutcome::Direct { answer } => answer.clone(),
            QueryOutcome::Tool {
                result, summary, ..
            } => match summary {
                Some(summary) => summary.clone(),
                None if result.image_count() > 0 && result.text().is_empty() => {
                    format!("Tool returned {} image(s).", result.image_count())
                }
                None => result.text(),
            },
            QueryOutcome::ToolFailed { error, .. } => error.message.clone(),
            QueryOutcome::UnknownCapability { name, available } => {
                let available = if available.is_empty() {
                    "none".to_string()
                } else {
                    available.join(", ")
                };
                format!(
                    "The model asked for a tool named '{name}', which this server does not provide. Available tools: {available}."
                )
            }
            QueryOutcome::ModelFailed { message } => {
                format!("Language model request failed: {message}")
            }
        }
    }

    pub fn invoked(&self) -> bool {
        matches!(
            self,
            QueryOutcome::Tool { .. } | QueryOutcome::ToolFailed { .. }
        )
    }
}

/// Errors that end the interaction.
#[derive(Debug)]
pub enum OrchestratorError {
    Session {
        stage: &'static str,
        source: McpError,
    },
    Cancelled,
}

impl OrchestratorError {
    fn session(stage: &'static str, source: McpError) -> Self {
        OrchestratorError::Session { stage, source }
    }
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestratorError::Session { stage, source } => {
                write!(f, "{stage} failed ({} error): {source}", source.stage())
            }
            OrchestratorError::Cancelled => write!(f, "Query cancelled"),
        }
    }
}

impl std::error::Error for OrchestratorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OrchestratorError::Session { source, .. } => Some(source),
            OrchestratorError::Cancelled => None,
        }
    }
}

pub struct Orchestrator {
    model: Arc<dyn LanguageModel>,
    sink: Arc<dyn OutputSink>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        sink: Arc<dyn OutputSink>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            model,
            sink,
            settings,
        }
    }

    /// Launches the server and completes the handshake.
    pub async fn connect(&self, server_id: &str, spec: &LaunchSpec) -> Result<McpSession, OrchestratorError> {
        info!(server_id, command = %spec.display(), "Starting MCP server");
        let mut session = McpSession::spawn(server_id, spec)
            .map_err(|err| OrchestratorError::session("launch", err))?;
        self.prepare(&mut session).await?;
        Ok(session)
    }

    /// Runs the handshake on an already opened session.
    pub async fn prepare(&self, session: &mut McpSession) -> Result<(), OrchestratorError> {
        let outcome = self
            .bounded(async {
                session.initialize().await?;
                Ok(())
            })
            .await;
        if let Err(err) = outcome {
            session.close().await;
            return Err(OrchestratorError::session("initialize", err));
        }
        Ok(())
    }

    /// Launch, answer one query, and shut the server down on every path.
    pub async fn ask(
        &self,
        server_id: &str,
        spec: &LaunchSpec,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<QueryOutcome, OrchestratorError> {
        let mut session = tokio::select! {
            session = self.connect(server_id, spec) => session?,
            _ = cancel.cancelled() => return Err(OrchestratorError::Cancelled),
        };
        let outcome = self.run_query_cancellable(&mut session, query, cancel).await;
        session.close().await;
        outcome
    }

    /// [`Self::run_query`], closing the session if `cancel` fires first.
    pub async fn run_query_cancellable(
        &self,
        session: &mut McpSession,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<QueryOutcome, OrchestratorError> {
        let outcome = tokio::select! {
            outcome = self.run_query(session, query) => Some(outcome),
            _ = cancel.cancelled() => None,
        };
        match outcome {
            Some(outcome) => outcome,
            None => {
                warn!(server_id = session.server_id(), "Query cancelled; closing session");
                session.close().await;
                Err(OrchestratorError::Cancelled)
            }
        }
    }

    pub async fn run_query(
        &self,
        session: &mut McpSession,
        query: &str,
    ) -> Result<QueryOutcome, OrchestratorError> {
        let capabilities = self.discover(session).await?;

        let prompt = build_selection_prompt(&capabilities, query);
        debug!(prompt_len = prompt.len(), "Asking model to choose a tool");
        let completion = match self.model.complete(ModelRequest::text(prompt)).await {
            Ok(completion) => completion,
            Err(err) => {
                warn!(error = %err, "Tool selection request failed");
                return Ok(QueryOutcome::ModelFailed {
                    message: err.to_string(),
                });
            }
        };
        debug!(completion = %completion, "Model completion");

        match resolve(parse_decision(&completion), &capabilities) {
            Resolution::DirectAnswer(answer) => Ok(QueryOutcome::Direct { answer }),
            Resolution::UnknownCapability { name, available } => {
                Ok(QueryOutcome::UnknownCapability { name, available })
            }
            Resolution::Invoke(request) => {
                self.invoke_and_summarize(session, request, Some(query)).await
            }
        }
    }

    /// Invokes a named tool without the selection step. The name is still
    /// checked against a fresh capability list.
    pub async fn call(
        &self,
        session: &mut McpSession,
        request: InvocationRequest,
        query: Option<&str>,
    ) -> Result<QueryOutcome, OrchestratorError> {
        let capabilities = self.discover(session).await?;
        match resolve(Decision::StructuredCall(request), &capabilities) {
            Resolution::Invoke(request) => self.invoke_and_summarize(session, request, query).await,
            Resolution::UnknownCapability { name, available } => {
                Ok(QueryOutcome::UnknownCapability { name, available })
            }
            Resolution::DirectAnswer(answer) => Ok(QueryOutcome::Direct { answer }),
        }
    }

    async fn discover(&self, session: &mut McpSession) -> Result<CapabilityList, OrchestratorError> {
        match self.bounded(session.list_capabilities()).await {
            Ok(capabilities) => {
                debug!(count = capabilities.len(), "Discovered capabilities");
                Ok(capabilities)
            }
            Err(err) => {
                session.close().await;
                Err(OrchestratorError::session("discovery", err))
            }
        }
    }

    async fn invoke_and_summarize(
        &self,
        session: &mut McpSession,
        request: InvocationRequest,
        query: Option<&str>,
    ) -> Result<QueryOutcome, OrchestratorError> {
        let envelope = match self.bounded(dispatch(session, &request)).await {
            Ok(envelope) => envelope,
            Err(McpError::Rpc(message)) => {
                return Ok(QueryOutcome::ToolFailed {
                    request,
                    error: InvocationError { message },
                })
            }
            Err(err) => {
                session.close().await;
                return Err(OrchestratorError::session("invocation", err));
            }
        };

        let result = match normalize(&envelope) {
            Ok(result) => result,
            Err(error) => {
                info!(tool = %request.capability_name, error = %error, "Tool reported an error");
                return Ok(QueryOutcome::ToolFailed { request, error });
            }
        };

        let persisted = match self.settings.output_dir.as_deref() {
            Some(dir) if result.image_count() > 0 => persist_images(&result, self.sink.as_ref(), dir),
            _ => PersistReport::default(),
        };

        let summary = match query {
            Some(query) => {
                let summary_request =
                    build_summary_request(query, &result, self.settings.image_policy);
                match self.model.complete(summary_request).await {
                    Ok(summary) => Some(summary),
                    Err(err) => {
                        warn!(error = %err, "Summary request failed; returning the raw result");
                        None
                    }
                }
            }
            None => None,
        };

        Ok(QueryOutcome::Tool {
            request,
            result,
            summary,
            saved_images: persisted.saved,
            persist_failures: persisted.failures,
        })
    }

    /// Applies the session timeout to one session call.
    pub async fn bounded<T>(&self, call: impl Future<Output = Result<T, McpError>>) -> Result<T, McpError> {
        let limit = self.settings.session_timeout;
        match tokio::time::timeout(limit, call).await {
            Ok(outcome) => outcome,
            Err(_) => Err(McpError::Timeout(limit)),
        }
    }
}

#[cfg(test)]
mod tests;
