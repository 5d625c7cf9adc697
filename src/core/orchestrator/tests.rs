use super::*;
use crate::core::llm::ModelError;
use crate::core::normalize::{FsOutputSink, OutputSink};
use std::path::Path;
use crate::mcp::server::serve;
use crate::mcp::server::tools::{demo_registry, DemoServerOptions};
use crate::mcp::SessionState;
use crate::utils::test_utils::ScriptedModel;
use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader};

const BMI_QUERY: &str = "What is the BMI of a 180cm tall person weighing 84kg?";

fn settings() -> OrchestratorSettings {
    OrchestratorSettings {
        session_timeout: Duration::from_secs(5),
        image_policy: ImagePolicy::Describe,
        output_dir: None,
    }
}

fn build_orchestrator(model: Arc<dyn LanguageModel>, settings: OrchestratorSettings) -> Orchestrator {
    Orchestrator::new(model, Arc::new(FsOutputSink), settings)
}

async fn demo_session(orchestrator: &Orchestrator, options: DemoServerOptions) -> McpSession {
    let registry = Arc::new(demo_registry(options).expect("registry should build"));
    let (client_out, server_in) = duplex(256 * 1024);
    let (server_out, client_in) = duplex(256 * 1024);
    tokio::spawn(async move {
        let _ = serve(registry, server_in, server_out).await;
    });
    let mut session = McpSession::from_streams("demo", client_in, client_out);
    orchestrator
        .prepare(&mut session)
        .await
        .expect("handshake should succeed");
    session
}

/// A server that answers `initialize` and then replies with whatever `reply`
/// returns; `None` leaves the request unanswered.
async fn scripted_session(
    orchestrator: &Orchestrator,
    reply: fn(&str, &Value) -> Option<Value>,
) -> McpSession {
    let (client_out, server_in) = duplex(64 * 1024);
    let (mut server_out, client_in) = duplex(64 * 1024);
    tokio::spawn(async move {
        let mut lines = BufReader::new(server_in).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let Ok(message) = serde_json::from_str::<Value>(&line) else {
                continue;
            };
            let Some(id) = message.get("id").cloned() else {
                continue;
            };
            let method = message["method"].as_str().unwrap_or_default().to_string();
            let response = if method == "initialize" {
                Some(json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": {
                        "protocolVersion": "2025-11-25",
                        "capabilities": {"tools": {}},
                        "serverInfo": {"name": "scripted", "version": "0.1.0"}
                    }
                }))
            } else {
                reply(&method, &id)
            };
            if let Some(response) = response {
                let payload = format!("{response}\n");
                if server_out.write_all(payload.as_bytes()).await.is_err() {
                    return;
                }
            }
        }
    });
    let mut session = McpSession::from_streams("scripted", client_in, client_out);
    orchestrator
        .prepare(&mut session)
        .await
        .expect("handshake should succeed");
    session
}

fn write_png(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("frame.png");
    std::fs::write(&path, [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]).expect("write frame");
    path
}

struct HangingModel;

#[async_trait]
impl LanguageModel for HangingModel {
    async fn complete(&self, _request: ModelRequest) -> Result<String, ModelError> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn bmi_query_selects_the_tool_and_summarizes() {
    let model = Arc::new(ScriptedModel::new([
        r#"{"tool": "calculate_bmi", "arguments": {"weight_kg": 84, "height_cm": 180}}"#,
        "The BMI is 25.93, which falls in the Overweight range.",
    ]));
    let orchestrator = build_orchestrator(model.clone(), settings());
    let mut session = demo_session(&orchestrator, DemoServerOptions::default()).await;

    let outcome = orchestrator
        .run_query(&mut session, BMI_QUERY)
        .await
        .expect("query should complete");

    let QueryOutcome::Tool {
        request,
        result,
        summary,
        saved_images,
        persist_failures,
    } = &outcome
    else {
        panic!("expected a tool outcome, got {outcome:?}");
    };
    assert_eq!(request.capability_name, "calculate_bmi");
    assert_eq!(request.arguments["weight_kg"], json!(84));
    assert_eq!(request.arguments["height_cm"], json!(180));
    assert_eq!(result.text(), "{\"bmi\":25.93,\"category\":\"Overweight\"}");
    assert_eq!(
        summary.as_deref(),
        Some("The BMI is 25.93, which falls in the Overweight range.")
    );
    assert!(saved_images.is_empty());
    assert!(persist_failures.is_empty());

    let requests = model.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].prompt.contains("Tool: calculate_bmi"));
    assert!(requests[0].prompt.contains(BMI_QUERY));
    assert_eq!(
        requests[1].prompt,
        format!("Here is the result for the query '{BMI_QUERY}': {{\"bmi\":25.93,\"category\":\"Overweight\"}}")
    );
    assert_eq!(session.state(), SessionState::Initialized);
}

#[tokio::test]
async fn plain_completions_are_final_answers_without_invocation() {
    let model = Arc::new(ScriptedModel::new(["Tools are not needed here."]));
    let orchestrator = build_orchestrator(model.clone(), settings());
    let mut session = demo_session(&orchestrator, DemoServerOptions::default()).await;

    let outcome = orchestrator
        .run_query(&mut session, "What is the capital of France?")
        .await
        .expect("query should complete");

    assert_eq!(
        outcome,
        QueryOutcome::Direct {
            answer: "Tools are not needed here.".to_string()
        }
    );
    assert!(!outcome.invoked());
    assert_eq!(model.call_count(), 1);
}

#[tokio::test]
async fn missing_executables_fail_at_launch() {
    let model = Arc::new(ScriptedModel::new(Vec::<String>::new()));
    let orchestrator = build_orchestrator(model.clone(), settings());

    let err = orchestrator
        .ask(
            "missing",
            &LaunchSpec::new("/definitely/not/a/real/server"),
            BMI_QUERY,
            &CancellationToken::new(),
        )
        .await
        .expect_err("launch must fail");

    assert!(
        matches!(err, OrchestratorError::Session { stage: "launch", source: McpError::Launch { .. } }),
        "{err:?}"
    );
    assert!(err.to_string().starts_with("launch failed (launch error)"));
    assert_eq!(model.call_count(), 0);
}

#[tokio::test]
async fn tool_errors_are_surfaced_verbatim_without_a_summary() {
    let model = Arc::new(ScriptedModel::new([
        r#"{"tool": "take_screenshot", "arguments": {}}"#,
        "This summary must never be requested.",
    ]));
    let orchestrator = build_orchestrator(model.clone(), settings());
    let mut session = demo_session(&orchestrator, DemoServerOptions::default()).await;

    let outcome = orchestrator
        .run_query(&mut session, "Take a picture of me")
        .await
        .expect("query should complete");

    let QueryOutcome::ToolFailed { request, error } = &outcome else {
        panic!("expected a tool failure, got {outcome:?}");
    };
    assert_eq!(request.capability_name, "take_screenshot");
    assert!(error.message.contains("camera not found"));
    assert_eq!(outcome.final_response(), error.message);
    assert_eq!(model.call_count(), 1);
    assert_eq!(session.state(), SessionState::Initialized);
}

#[tokio::test]
async fn unknown_tools_skip_dispatch_and_keep_the_session() {
    let model = Arc::new(ScriptedModel::new([
        r#"{"tool": "teleport", "arguments": {"to": "Mars"}}"#,
        "The weather in Paris is sunny.",
    ]));
    let orchestrator = build_orchestrator(model.clone(), settings());
    let mut session = demo_session(&orchestrator, DemoServerOptions::default()).await;

    let outcome = orchestrator
        .run_query(&mut session, "Teleport me")
        .await
        .expect("query should complete");

    assert_eq!(
        outcome,
        QueryOutcome::UnknownCapability {
            name: "teleport".to_string(),
            available: vec![
                "calculate_bmi".to_string(),
                "hello_world".to_string(),
                "calculate_sum".to_string(),
                "take_screenshot".to_string(),
            ],
        }
    );
    assert!(outcome.final_response().contains("'teleport'"));
    assert_eq!(model.call_count(), 1);

    let follow_up = orchestrator
        .run_query(&mut session, "What is the weather?")
        .await
        .expect("session should stay usable");
    assert!(matches!(follow_up, QueryOutcome::Direct { .. }));
}

#[tokio::test]
async fn malformed_tool_calls_become_direct_answers() {
    let completion = r#"{"tool": "calculate_bmi", "arguments": "84kg"}"#;
    let model = Arc::new(ScriptedModel::new([completion]));
    let orchestrator = build_orchestrator(model.clone(), settings());
    let mut session = demo_session(&orchestrator, DemoServerOptions::default()).await;

    let outcome = orchestrator
        .run_query(&mut session, BMI_QUERY)
        .await
        .expect("query should complete");
    assert_eq!(
        outcome,
        QueryOutcome::Direct {
            answer: completion.to_string()
        }
    );
}

#[tokio::test]
async fn images_are_persisted_and_described_by_default() {
    let dir = TempDir::new().expect("tempdir");
    let source = write_png(&dir);
    let output_dir = dir.path().join("output");
    let model = Arc::new(ScriptedModel::new([
        r#"{"tool": "take_screenshot", "arguments": {"output_filename": "me.png"}}"#,
        "A screenshot was captured.",
    ]));
    let orchestrator = build_orchestrator(
        model.clone(),
        OrchestratorSettings {
            output_dir: Some(output_dir.clone()),
            ..settings()
        },
    );
    let mut session = demo_session(
        &orchestrator,
        DemoServerOptions {
            capture_source: Some(source),
            ..DemoServerOptions::default()
        },
    )
    .await;

    let outcome = orchestrator
        .run_query(&mut session, "Take a picture of me")
        .await
        .expect("query should complete");

    let QueryOutcome::Tool {
        result,
        saved_images,
        ..
    } = &outcome
    else {
        panic!("expected a tool outcome, got {outcome:?}");
    };
    assert_eq!(result.image_count(), 1);
    assert_eq!(saved_images.len(), 1);
    assert!(saved_images[0].starts_with(&output_dir));
    assert_eq!(
        std::fs::read(&saved_images[0]).expect("persisted image"),
        vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]
    );

    let requests = model.requests();
    assert!(requests[1].images.is_empty());
    assert!(requests[1].prompt.contains("1 image not shown here"));
}

#[tokio::test]
async fn attach_policy_sends_images_to_the_summary() {
    let dir = TempDir::new().expect("tempdir");
    let source = write_png(&dir);
    let model = Arc::new(ScriptedModel::new([
        r#"{"tool": "take_screenshot", "arguments": {}}"#,
        "A person smiling.",
    ]));
    let orchestrator = build_orchestrator(
        model.clone(),
        OrchestratorSettings {
            image_policy: ImagePolicy::Attach,
            ..settings()
        },
    );
    let mut session = demo_session(
        &orchestrator,
        DemoServerOptions {
            capture_source: Some(source),
            ..DemoServerOptions::default()
        },
    )
    .await;

    let outcome = orchestrator
        .run_query(&mut session, "What do I look like?")
        .await
        .expect("query should complete");
    assert_eq!(outcome.final_response(), "A person smiling.");

    let requests = model.requests();
    assert_eq!(requests[1].images.len(), 1);
    assert!(requests[1].images[0].starts_with("data:image/png;base64,"));
}

#[tokio::test]
async fn model_failures_yield_best_effort_outcomes() {
    let model = Arc::new(ScriptedModel::with_results([Err(ModelError::Http(
        "connection refused".to_string(),
    ))]));
    let orchestrator = build_orchestrator(model.clone(), settings());
    let mut session = demo_session(&orchestrator, DemoServerOptions::default()).await;

    let outcome = orchestrator
        .run_query(&mut session, BMI_QUERY)
        .await
        .expect("model failures are not fatal");
    assert!(matches!(outcome, QueryOutcome::ModelFailed { ref message } if message.contains("connection refused")));

    // Selection succeeds, the summary call fails: the raw result is the answer.
    let model = Arc::new(ScriptedModel::new([
        r#"{"tool": "hello_world", "arguments": {"name": "Ada"}}"#,
    ]));
    let orchestrator = build_orchestrator(model.clone(), settings());
    let mut session = demo_session(&orchestrator, DemoServerOptions::default()).await;
    let outcome = orchestrator
        .run_query(&mut session, "Greet Ada")
        .await
        .expect("summary failures are not fatal");
    assert!(matches!(outcome, QueryOutcome::Tool { summary: None, .. }));
    assert_eq!(outcome.final_response(), "Hello, Ada!");
    assert_eq!(model.call_count(), 2);
}

#[tokio::test]
async fn direct_calls_skip_the_selection_step() {
    let model = Arc::new(ScriptedModel::new(Vec::<String>::new()));
    let orchestrator = build_orchestrator(model.clone(), settings());
    let mut session = demo_session(&orchestrator, DemoServerOptions::default()).await;

    let request = InvocationRequest::new(
        "calculate_sum",
        json!({"a": 2, "b": 3}).as_object().cloned().expect("object"),
    );
    let outcome = orchestrator
        .call(&mut session, request, None)
        .await
        .expect("call should complete");
    assert_eq!(outcome.final_response(), "5");
    assert_eq!(model.call_count(), 0);

    let outcome = orchestrator
        .call(&mut session, InvocationRequest::new("nope", Default::default()), None)
        .await
        .expect("unknown names are recoverable");
    assert!(matches!(outcome, QueryOutcome::UnknownCapability { .. }));
}

#[tokio::test]
async fn server_rpc_errors_during_invocation_are_recoverable() {
    let model = Arc::new(ScriptedModel::new([
        r#"{"tool": "flaky", "arguments": {}}"#,
    ]));
    let orchestrator = build_orchestrator(model.clone(), settings());
    let mut session = scripted_session(&orchestrator, |method, id| {
        Some(match method {
            "tools/list" => json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {"tools": [{"name": "flaky", "inputSchema": {"type": "object"}}]}
            }),
            _ => json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32603, "message": "Internal error"}
            }),
        })
    })
    .await;

    let outcome = orchestrator
        .run_query(&mut session, "Do the flaky thing")
        .await
        .expect("rpc errors are recoverable");
    let QueryOutcome::ToolFailed { error, .. } = &outcome else {
        panic!("expected a tool failure, got {outcome:?}");
    };
    assert_eq!(error.message, "MCP error -32603: Internal error");
    assert_eq!(session.state(), SessionState::Initialized);
}

#[tokio::test]
async fn rejected_tool_listing_is_a_protocol_failure() {
    let model = Arc::new(ScriptedModel::new(Vec::<String>::new()));
    let orchestrator = build_orchestrator(model.clone(), settings());
    let mut session = scripted_session(&orchestrator, |_, id| {
        Some(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": -32603, "message": "Internal error"}
        }))
    })
    .await;

    let err = orchestrator
        .run_query(&mut session, BMI_QUERY)
        .await
        .expect_err("a refused tool list ends the query");
    let OrchestratorError::Session {
        stage: "discovery",
        source: McpError::Protocol(message),
    } = &err
    else {
        panic!("expected a discovery protocol error, got {err:?}");
    };
    assert_eq!(message, "tools/list rejected: MCP error -32603: Internal error");
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(model.call_count(), 0);
}

#[tokio::test]
async fn malformed_responses_fail_fast_instead_of_timing_out() {
    let model = Arc::new(ScriptedModel::new(Vec::<String>::new()));
    let orchestrator = build_orchestrator(
        model.clone(),
        OrchestratorSettings {
            session_timeout: Duration::from_secs(30),
            ..settings()
        },
    );
    let mut session = scripted_session(&orchestrator, |_, id| {
        Some(json!({"jsonrpc": "2.0", "id": id, "result": "oops"}))
    })
    .await;

    let started = tokio::time::Instant::now();
    let err = orchestrator
        .run_query(&mut session, BMI_QUERY)
        .await
        .expect_err("a malformed reply ends the query");
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(
        matches!(
            &err,
            OrchestratorError::Session { stage: "discovery", source: McpError::Protocol(message) }
                if message.starts_with("malformed response")
        ),
        "{err:?}"
    );
    assert_eq!(session.state(), SessionState::Closed);
}

struct ReadOnlySink;

impl OutputSink for ReadOnlySink {
    fn write(&self, _path: &Path, _bytes: &[u8]) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only file system",
        ))
    }
}

#[tokio::test]
async fn persistence_failures_are_carried_in_the_outcome() {
    let dir = TempDir::new().expect("tempdir");
    let source = write_png(&dir);
    let output_dir = dir.path().join("output");
    let model = Arc::new(ScriptedModel::new([
        r#"{"tool": "take_screenshot", "arguments": {}}"#,
        "A screenshot was captured.",
    ]));
    let orchestrator = Orchestrator::new(
        model.clone(),
        Arc::new(ReadOnlySink),
        OrchestratorSettings {
            output_dir: Some(output_dir.clone()),
            ..settings()
        },
    );
    let mut session = demo_session(
        &orchestrator,
        DemoServerOptions {
            capture_source: Some(source),
            ..DemoServerOptions::default()
        },
    )
    .await;

    let outcome = orchestrator
        .run_query(&mut session, "Take a picture of me")
        .await
        .expect("persistence failures are not fatal");
    let QueryOutcome::Tool {
        saved_images,
        persist_failures,
        summary,
        ..
    } = &outcome
    else {
        panic!("expected a tool outcome, got {outcome:?}");
    };
    assert!(saved_images.is_empty());
    assert_eq!(persist_failures.len(), 1);
    assert!(persist_failures[0].path.starts_with(&output_dir));
    assert_eq!(persist_failures[0].message, "read-only file system");
    assert_eq!(summary.as_deref(), Some("A screenshot was captured."));
}

#[tokio::test]
async fn unanswered_session_calls_time_out_and_close_the_session() {
    let model = Arc::new(ScriptedModel::new(Vec::<String>::new()));
    let orchestrator = build_orchestrator(
        model.clone(),
        OrchestratorSettings {
            session_timeout: Duration::from_millis(100),
            ..settings()
        },
    );
    let mut session = scripted_session(&orchestrator, |_, _| None).await;

    let err = orchestrator
        .run_query(&mut session, BMI_QUERY)
        .await
        .expect_err("discovery must time out");
    assert!(
        matches!(err, OrchestratorError::Session { stage: "discovery", source: McpError::Timeout(_) }),
        "{err:?}"
    );
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(model.call_count(), 0);
}

#[tokio::test]
async fn cancellation_closes_the_session() {
    let orchestrator = build_orchestrator(Arc::new(HangingModel), settings());
    let mut session = demo_session(&orchestrator, DemoServerOptions::default()).await;
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = orchestrator
        .run_query_cancellable(&mut session, BMI_QUERY, &cancel)
        .await
        .expect_err("query must be cancelled");
    assert!(matches!(err, OrchestratorError::Cancelled));
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn settings_follow_the_config() {
    let config = Config {
        session_timeout_secs: Some(7),
        summary_images: Some(ImagePolicy::Attach),
        persist_images: Some(false),
        ..Config::default()
    };
    let settings = OrchestratorSettings::from_config(&config);
    assert_eq!(settings.session_timeout, Duration::from_secs(7));
    assert_eq!(settings.image_policy, ImagePolicy::Attach);
    assert_eq!(settings.output_dir, None);

    let settings = OrchestratorSettings::from_config(&Config::default());
    assert_eq!(settings.output_dir, Some(PathBuf::from("output")));
}
