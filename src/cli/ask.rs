//! One-shot and line-by-line question answering.

use std::error::Error;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::CommandContext;
use crate::core::config::data::path_display;
use crate::core::orchestrator::{OrchestratorError, QueryOutcome};
use crate::mcp::{McpSession, SessionState};

pub async fn run_ask(context: &CommandContext, query: &str) -> Result<(), Box<dyn Error>> {
    if query.trim().is_empty() {
        eprintln!("Usage: toolbridge ask <question>");
        std::process::exit(1);
    }
    warn_if_api_key_missing(context);

    let cancel = CancellationToken::new();
    let watcher = cancel_on_ctrl_c(&cancel);
    let outcome = context
        .orchestrator
        .ask(&context.server_id, &context.launch, query, &cancel)
        .await;
    watcher.abort();

    match outcome {
        Ok(outcome) => {
            report_outcome(&outcome);
            transcribed(context.transcript.log_exchange(query, &outcome.final_response()));
            Ok(())
        }
        Err(err) => {
            transcribed(context.transcript.log_note(&format!("{query}: {err}")));
            eprintln!("❌ {err}");
            std::process::exit(1);
        }
    }
}

/// Reads one question per line. The server session is reused across
/// questions and restarted after a fatal error.
pub async fn run_chat(context: &CommandContext) -> Result<(), Box<dyn Error>> {
    warn_if_api_key_missing(context);
    eprintln!(
        "Using server `{}`. Type a question and press Enter; Ctrl-D or Ctrl-C to quit.",
        context.server_id
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut session: Option<McpSession> = None;

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }

        let mut active = match session.take() {
            Some(existing) if existing.state() == SessionState::Initialized => existing,
            _ => match context
                .orchestrator
                .connect(&context.server_id, &context.launch)
                .await
            {
                Ok(fresh) => fresh,
                Err(err) => {
                    eprintln!("❌ {err}");
                    transcribed(context.transcript.log_note(&err.to_string()));
                    continue;
                }
            },
        };

        let cancel = CancellationToken::new();
        let watcher = cancel_on_ctrl_c(&cancel);
        let outcome = context
            .orchestrator
            .run_query_cancellable(&mut active, query, &cancel)
            .await;
        watcher.abort();

        match outcome {
            Ok(outcome) => {
                report_outcome(&outcome);
                transcribed(context.transcript.log_exchange(query, &outcome.final_response()));
            }
            Err(OrchestratorError::Cancelled) => {
                eprintln!("⚠️  Cancelled; the server will be restarted for the next question.");
                transcribed(context.transcript.log_note("cancelled"));
            }
            Err(err) => {
                eprintln!("❌ {err}");
                transcribed(context.transcript.log_note(&err.to_string()));
            }
        }

        if active.state() == SessionState::Initialized {
            session = Some(active);
        } else {
            info!(server_id = %context.server_id, "Session closed; reconnecting on next question");
        }
    }

    if let Some(mut session) = session {
        session.close().await;
    }
    Ok(())
}

/// Returns whether the transcript write succeeded; failures are logged.
fn transcribed(outcome: Result<(), Box<dyn Error>>) -> bool {
    match outcome {
        Ok(()) => true,
        Err(err) => {
            warn!(error = %err, "Failed to write transcript");
            false
        }
    }
}

/// Lines describing where images were saved and which saves failed.
pub(crate) fn image_notes(outcome: &QueryOutcome) -> Vec<String> {
    let QueryOutcome::Tool {
        saved_images,
        persist_failures,
        ..
    } = outcome
    else {
        return Vec::new();
    };
    saved_images
        .iter()
        .map(|path| format!("🖼️  Saved image to {}", path_display(path)))
        .chain(persist_failures.iter().map(|failure| format!("⚠️  {failure}")))
        .collect()
}

fn report_outcome(outcome: &QueryOutcome) {
    for note in image_notes(outcome) {
        eprintln!("{note}");
    }
    match outcome {
        QueryOutcome::ToolFailed { request, .. } => {
            eprintln!("⚠️  Tool `{}` reported an error:", request.capability_name);
        }
        QueryOutcome::UnknownCapability { .. } | QueryOutcome::ModelFailed { .. } => {
            eprintln!("⚠️  No tool was called.");
        }
        QueryOutcome::Direct { .. } | QueryOutcome::Tool { .. } => {}
    }
    println!("{}", outcome.final_response());
}

fn cancel_on_ctrl_c(cancel: &CancellationToken) -> JoinHandle<()> {
    let cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    })
}

fn warn_if_api_key_missing(context: &CommandContext) {
    if context.config.api_key().is_none() {
        eprintln!(
            "⚠️  {} is not set; requests to {} will be sent without an API key.",
            context.config.api_key_env(),
            context.config.base_url()
        );
    }
}
