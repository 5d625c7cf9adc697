//! Commands that talk to the server without the model: listing, reading,
//! and direct tool calls.

use std::error::Error;

use rust_mcp_schema::{ContentBlock, ListPromptsResult, PromptArgument, PromptMessage};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::cli::prompt_args::{parse_prompt_args, validate_prompt_args};
use crate::cli::ask::image_notes;
use crate::cli::CommandContext;
use crate::core::orchestrator::QueryOutcome;
use crate::mcp::types::InvocationRequest;
use crate::mcp::McpSession;

pub async fn run_list_tools(context: &CommandContext) -> Result<(), Box<dyn Error>> {
    let mut session = connect_or_exit(context).await;
    let outcome = context
        .orchestrator
        .bounded(session.list_capabilities())
        .await;
    session.close().await;
    print_json(&exit_on_error(outcome))
}

pub async fn run_list_resources(context: &CommandContext) -> Result<(), Box<dyn Error>> {
    let mut session = connect_or_exit(context).await;
    let resources = context
        .orchestrator
        .bounded(session.list_resources())
        .await;
    let templates = context
        .orchestrator
        .bounded(session.list_resource_templates())
        .await;
    session.close().await;

    let resources = exit_on_error(resources);
    let templates = exit_on_error(templates);
    print_json(&serde_json::json!({
        "resources": resources.resources,
        "resourceTemplates": templates.resource_templates,
    }))
}

pub async fn run_read(context: &CommandContext, uri: &str) -> Result<(), Box<dyn Error>> {
    let mut session = connect_or_exit(context).await;
    let outcome = context
        .orchestrator
        .bounded(session.read_resource(uri))
        .await;
    session.close().await;

    let result = serde_json::to_value(exit_on_error(outcome))?;
    let contents = result
        .get("contents")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for item in contents {
        match item.get("text").and_then(Value::as_str) {
            Some(text) => println!("{text}"),
            None => println!("{}", serde_json::to_string_pretty(&item)?),
        }
    }
    Ok(())
}

pub async fn run_list_prompts(context: &CommandContext) -> Result<(), Box<dyn Error>> {
    let mut session = connect_or_exit(context).await;
    let outcome = context.orchestrator.bounded(session.list_prompts()).await;
    session.close().await;
    print_json(&exit_on_error(outcome).prompts)
}

pub async fn run_prompt(
    context: &CommandContext,
    name: &str,
    tokens: &[String],
) -> Result<(), Box<dyn Error>> {
    let mut session = connect_or_exit(context).await;
    let prompts = context.orchestrator.bounded(session.list_prompts()).await;
    let prompts = match prompts {
        Ok(prompts) => prompts,
        Err(err) => {
            session.close().await;
            eprintln!("❌ {err}");
            std::process::exit(1);
        }
    };

    let Some(declared) = declared_arguments(&prompts, name) else {
        session.close().await;
        eprintln!("❌ Unknown prompt '{name}'");
        std::process::exit(1);
    };
    let arguments = match parse_prompt_args(tokens, &declared)
        .and_then(|args| validate_prompt_args(&args, &declared).map(|_| args))
    {
        Ok(arguments) => arguments,
        Err(err) => {
            session.close().await;
            eprintln!("❌ {err}");
            std::process::exit(1);
        }
    };

    let outcome = context
        .orchestrator
        .bounded(session.get_prompt(name, arguments))
        .await;
    session.close().await;
    let result = exit_on_error(outcome);
    for message in &result.messages {
        println!("{}", render_prompt_message(message));
    }
    Ok(())
}

pub async fn run_call(
    context: &CommandContext,
    tool: &str,
    raw_args: Option<&str>,
    query: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    let arguments = match parse_call_arguments(raw_args) {
        Ok(arguments) => arguments,
        Err(err) => {
            eprintln!("❌ {err}");
            std::process::exit(1);
        }
    };

    let mut session = connect_or_exit(context).await;
    let outcome = context
        .orchestrator
        .call(&mut session, InvocationRequest::new(tool, arguments), query)
        .await;
    session.close().await;

    let outcome = exit_on_error(outcome);
    for note in image_notes(&outcome) {
        eprintln!("{note}");
    }
    println!("{}", outcome.final_response());
    if matches!(
        outcome,
        QueryOutcome::ToolFailed { .. } | QueryOutcome::UnknownCapability { .. }
    ) {
        std::process::exit(1);
    }
    Ok(())
}

fn declared_arguments(prompts: &ListPromptsResult, name: &str) -> Option<Vec<PromptArgument>> {
    prompts
        .prompts
        .iter()
        .find(|prompt| prompt.name == name)
        .map(|prompt| prompt.arguments.clone())
}

pub(crate) fn parse_call_arguments(raw: Option<&str>) -> Result<Map<String, Value>, String> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(Map::new());
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(arguments)) => Ok(arguments),
        Ok(_) => Err("--args must be a JSON object".to_string()),
        Err(err) => Err(format!("--args is not valid JSON: {err}")),
    }
}

pub(crate) fn render_prompt_message(message: &PromptMessage) -> String {
    let role = serde_json::to_value(&message.role)
        .ok()
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_else(|| "message".to_string());
    let content = match &message.content {
        ContentBlock::TextContent(text) => text.text.clone(),
        other => serde_json::to_string(other)
            .unwrap_or_else(|_| "Unsupported prompt content.".to_string()),
    };
    format!("{role}: {content}")
}

async fn connect_or_exit(context: &CommandContext) -> McpSession {
    match context
        .orchestrator
        .connect(&context.server_id, &context.launch)
        .await
    {
        Ok(session) => session,
        Err(err) => {
            eprintln!("❌ {err}");
            std::process::exit(1);
        }
    }
}

fn exit_on_error<T, E: std::fmt::Display>(outcome: Result<T, E>) -> T {
    match outcome {
        Ok(value) => value,
        Err(err) => {
            eprintln!("❌ {err}");
            std::process::exit(1);
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn call_arguments_must_be_a_json_object() {
        assert_eq!(parse_call_arguments(None), Ok(Map::new()));
        assert_eq!(parse_call_arguments(Some("  ")), Ok(Map::new()));
        assert_eq!(
            parse_call_arguments(Some(r#"{"a": 2, "b": 3}"#)),
            Ok(json!({"a": 2, "b": 3}).as_object().cloned().expect("object"))
        );
        assert_eq!(
            parse_call_arguments(Some("[1, 2]")),
            Err("--args must be a JSON object".to_string())
        );
        assert!(parse_call_arguments(Some("{"))
            .expect_err("invalid JSON")
            .starts_with("--args is not valid JSON"));
    }

    #[test]
    fn declared_arguments_come_from_the_named_prompt() {
        let prompts: ListPromptsResult = serde_json::from_value(json!({
            "prompts": [
                {"name": "get-started", "arguments": []},
                {
                    "name": "greet",
                    "arguments": [{"name": "who", "required": true}]
                }
            ]
        }))
        .expect("prompt list");

        let declared = declared_arguments(&prompts, "greet").expect("greet is listed");
        assert_eq!(declared.len(), 1);
        assert_eq!(declared[0].name, "who");
        assert_eq!(declared[0].required, Some(true));
        assert!(declared_arguments(&prompts, "get-started").is_some_and(|args| args.is_empty()));
        assert!(declared_arguments(&prompts, "missing").is_none());
    }

    #[test]
    fn prompt_messages_render_role_and_text() {
        let message: PromptMessage = serde_json::from_value(json!({
            "role": "user",
            "content": {"type": "text", "text": "Call hello_world"}
        }))
        .expect("prompt message");
        assert_eq!(render_prompt_message(&message), "user: Call hello_world");
    }
}
