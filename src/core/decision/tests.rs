use super::*;
use crate::mcp::types::CapabilityDescriptor;
use serde_json::json;

fn demo_capabilities() -> CapabilityList {
    CapabilityList::new(vec![
        CapabilityDescriptor::new(
            "calculate_bmi",
            "Calculate BMI given weight in kg and height in cm.",
            json!({
                "type": "object",
                "required": ["weight_kg", "height_cm"],
                "properties": {
                    "weight_kg": {"type": "number"},
                    "height_cm": {"type": "number"}
                }
            }),
        ),
        CapabilityDescriptor::new(
            "hello_world",
            "Say hello\nto someone.",
            json!({"type": "object", "properties": {"name": {"type": "string"}}}),
        ),
    ])
}

#[test]
fn serialized_block_lists_every_capability_once() {
    let capabilities = demo_capabilities();
    let block = serialize_capabilities(&capabilities);
    assert_eq!(capability_names_in_block(&block), capabilities.names());
    assert!(block.contains("Description: Say hello to someone.\n"));
}

#[test]
fn schemas_are_rendered_with_sorted_keys() {
    let block = serialize_capabilities(&demo_capabilities());
    assert!(block.contains(
        "Input Schema: {\"properties\":{\"height_cm\":{\"type\":\"number\"},\"weight_kg\":{\"type\":\"number\"}},\"required\":[\"weight_kg\",\"height_cm\"],\"type\":\"object\"}"
    ));
    assert_eq!(block, serialize_capabilities(&demo_capabilities()));
}

#[test]
fn prompt_contains_tools_query_and_contract() {
    let prompt = build_selection_prompt(
        &demo_capabilities(),
        "What is the BMI of a 180cm tall person weighing 84kg?",
    );
    assert!(prompt.contains("Tool: calculate_bmi"));
    assert!(prompt.contains("User's Question: What is the BMI of a 180cm tall person weighing 84kg?"));
    assert!(prompt.contains("respond ONLY with a JSON object"));
    assert!(prompt.contains("\"tool\": \"tool-name\""));
}

#[test]
fn prompt_notes_when_no_tools_exist() {
    let prompt = build_selection_prompt(&CapabilityList::default(), "hi");
    assert!(prompt.contains("(no tools are available)"));
}

#[test]
fn valid_tool_calls_become_invocations() {
    let decision = parse_decision(
        r#"{"tool": "calculate_bmi", "arguments": {"weight_kg": 84, "height_cm": 180}}"#,
    );
    let expected = InvocationRequest::new(
        "calculate_bmi",
        json!({"weight_kg": 84, "height_cm": 180})
            .as_object()
            .cloned()
            .expect("object"),
    );
    assert_eq!(decision, Decision::StructuredCall(expected.clone()));
    assert_eq!(
        resolve(decision, &demo_capabilities()),
        Resolution::Invoke(expected)
    );
}

#[test]
fn fenced_tool_calls_are_accepted() {
    let decision = parse_decision("```json\n{\"tool\": \"hello_world\", \"arguments\": {}}\n```");
    assert!(matches!(decision, Decision::StructuredCall(ref request) if request.capability_name == "hello_world"));

    let decision = parse_decision("```\n{\"tool\": \"hello_world\", \"arguments\": null}\n```");
    assert!(matches!(decision, Decision::StructuredCall(ref request) if request.arguments.is_empty()));
}

#[test]
fn plain_text_is_a_direct_answer() {
    let decision = parse_decision("Tools are not needed here.");
    assert_eq!(
        decision,
        Decision::PlainAnswer("Tools are not needed here.".to_string())
    );
    assert_eq!(
        resolve(decision, &demo_capabilities()),
        Resolution::DirectAnswer("Tools are not needed here.".to_string())
    );
}

#[test]
fn malformed_tool_calls_degrade_to_answers() {
    for raw in [
        "{\"tool\": \"calculate_bmi\", \"arguments\": ",
        "{\"tool\": \"\", \"arguments\": {}}",
        "{\"tool\": \"calculate_bmi\", \"arguments\": [84, 180]}",
        "{\"tool\": \"calculate_bmi\", \"arguments\": {}, \"reason\": \"because\"}",
        "{\"arguments\": {}}",
        "{\"tool\": 7}",
        "{\"tool\": \"hello_world\"}",
        "  {\"tool\": \"hello_world\", \"arguments\": \"Ada\"}\n",
    ] {
        let decision = parse_decision(raw);
        assert!(
            matches!(decision, Decision::ParseFailure { .. }),
            "{raw}: {decision:?}"
        );
        assert_eq!(
            resolve(decision, &demo_capabilities()),
            Resolution::DirectAnswer(raw.trim().to_string())
        );
    }
}

#[test]
fn null_arguments_mean_no_arguments() {
    let decision = parse_decision("{\"tool\": \"hello_world\", \"arguments\": null}");
    assert!(matches!(decision, Decision::StructuredCall(ref request) if request.arguments.is_empty()));
}

#[test]
fn unknown_tools_are_reported_with_the_available_names() {
    let decision = parse_decision("{\"tool\": \"teleport\", \"arguments\": {}}");
    assert_eq!(
        resolve(decision, &demo_capabilities()),
        Resolution::UnknownCapability {
            name: "teleport".to_string(),
            available: vec!["calculate_bmi".to_string(), "hello_world".to_string()],
        }
    );
}

#[test]
fn canonical_json_sorts_nested_keys() {
    let value = json!({"b": [{"z": 1, "a": null}], "a": "x\"y"});
    assert_eq!(canonical_json(&value), r#"{"a":"x\"y","b":[{"a":null,"z":1}]}"#);
}
