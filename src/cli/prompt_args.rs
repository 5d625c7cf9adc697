use rust_mcp_schema::PromptArgument;
use std::collections::HashMap;

/// Parses `key=value` tokens for a prompt. A prompt with exactly one
/// declared argument also accepts a bare value.
pub fn parse_prompt_args(
    tokens: &[String],
    prompt_args: &[PromptArgument],
) -> Result<HashMap<String, String>, String> {
    if tokens.is_empty() {
        return Ok(HashMap::new());
    }

    if prompt_args.len() == 1 {
        if let Ok(map) = parse_kv_args(tokens) {
            return Ok(map);
        }
        let mut args = HashMap::new();
        args.insert(prompt_args[0].name.clone(), tokens.join(" "));
        return Ok(args);
    }

    parse_kv_args(tokens)
}

pub fn validate_prompt_args(
    args: &HashMap<String, String>,
    prompt_args: &[PromptArgument],
) -> Result<(), String> {
    let mut allowed: Vec<&str> = prompt_args.iter().map(|arg| arg.name.as_str()).collect();

    for key in args.keys() {
        if !allowed.iter().any(|name| name == key) {
            allowed.sort();
            let allowed_list = if allowed.is_empty() {
                "none".to_string()
            } else {
                allowed.join(", ")
            };
            return Err(format!(
                "Unknown prompt argument '{}'. Allowed: {}.",
                key, allowed_list
            ));
        }
    }

    let missing: Vec<&str> = prompt_args
        .iter()
        .filter(|arg| arg.required.unwrap_or(false) && !args.contains_key(&arg.name))
        .map(|arg| arg.name.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(format!(
            "Missing required prompt argument(s): {}.",
            missing.join(", ")
        ));
    }

    Ok(())
}

pub fn parse_kv_args(tokens: &[String]) -> Result<HashMap<String, String>, String> {
    let mut args = HashMap::new();
    for token in tokens {
        let Some((key, value)) = token.split_once('=') else {
            return Err(format!(
                "Invalid prompt argument '{}'. Use key=value.",
                token
            ));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err("Prompt argument name cannot be empty.".to_string());
        }
        args.insert(key.to_string(), value.to_string());
    }
    Ok(args)
}
