use anyhow::{anyhow, Result};
use regex::Regex;
use serde_json::{json, Value};

use crate::models::message::{AssistantMessage, Message};
use crate::models::tool::{Tool, ToolCall};

/// Convert internal Message format to OpenAI's API message specification
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    let mut messages_spec = Vec::new();

    for message in messages {
        match message {
            Message::User(user) => messages_spec.push(json!({
                "role": "user",
                "content": user.content,
            })),
            Message::System(system) => messages_spec.push(json!({
                "role": "system",
                "content": system.content,
            })),
            Message::Assistant(assistant) => {
                let mut converted = json!({ "role": "assistant" });
                if !assistant.content.is_empty() {
                    converted["content"] = json!(assistant.content);
                }
                if !assistant.tool_calls.is_empty() {
                    let tool_calls: Vec<Value> =
                        assistant.tool_calls.iter().map(tool_call_to_openai_spec).collect();
                    converted["tool_calls"] = json!(tool_calls);
                }
                if converted.get("content").is_none() && converted.get("tool_calls").is_none() {
                    converted["content"] = json!("");
                }
                messages_spec.push(converted);
            }
            Message::Tool(tool) => messages_spec.push(json!({
                "role": "tool",
                "content": content_as_text(&tool.content),
                "tool_call_id": tool.tool_call_id,
            })),
            Message::Function(function) => messages_spec.push(json!({
                "role": "function",
                "name": sanitize_function_name(&function.name),
                "content": content_as_text(&function.content),
            })),
            Message::Unknown(raw) => {
                tracing::warn!(message = %raw, "skipping unrecognized message");
            }
        }
    }

    messages_spec
}

fn tool_call_to_openai_spec(tool_call: &ToolCall) -> Value {
    // Arguments that failed to parse are carried as the raw string and sent back as-is
    let arguments = match &tool_call.args {
        Value::String(raw) => raw.clone(),
        args => args.to_string(),
    };

    json!({
        "id": tool_call.id.clone().unwrap_or_default(),
        "type": "function",
        "function": {
            "name": sanitize_function_name(&tool_call.name),
            "arguments": arguments,
        }
    })
}

/// Tool and function results are sent as text; structured results are sent as json text
pub fn content_as_text(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Convert internal Tool format to OpenAI's API tool specification
pub fn tools_to_openai_spec(tools: &[Tool]) -> Result<Vec<Value>> {
    let mut tool_names = std::collections::HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        let name = sanitize_function_name(&tool.name);
        if !tool_names.insert(name.clone()) {
            return Err(anyhow!("Duplicate tool name: {}", tool.name));
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": name,
                "description": tool.description,
                "parameters": tool.parameters,
            }
        }));
    }

    Ok(result)
}

/// Convert OpenAI's API response to internal Message format
pub fn openai_response_to_message(response: &Value) -> Result<Message> {
    let original = response
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| anyhow!("No message in response: {}", response))?;

    let content = original
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut tool_calls = Vec::new();
    if let Some(tool_calls_array) = original.get("tool_calls").and_then(Value::as_array) {
        for tool_call in tool_calls_array {
            let id = tool_call["id"].as_str().unwrap_or_default().to_string();
            let function_name = tool_call["function"]["name"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            let arguments = tool_call["function"]["arguments"]
                .as_str()
                .unwrap_or_default();

            let args = parse_tool_arguments(arguments).unwrap_or_else(|| {
                tracing::warn!(
                    tool = %function_name,
                    "could not interpret tool call arguments: {}",
                    arguments
                );
                Value::String(arguments.to_string())
            });

            let mut call = ToolCall::new(function_name, args);
            if !id.is_empty() {
                call = call.with_id(id);
            }
            tool_calls.push(call);
        }
    }

    if tool_calls.is_empty() {
        Ok(Message::assistant(content))
    } else {
        if !content.is_empty() {
            tracing::debug!("assistant text alongside tool calls: {}", content);
        }
        Ok(Message::Assistant(AssistantMessage {
            content,
            tool_calls,
        }))
    }
}

/// Empty arguments mean a call without parameters
fn parse_tool_arguments(arguments: &str) -> Option<Value> {
    if arguments.trim().is_empty() {
        return Some(json!({}));
    }
    serde_json::from_str(arguments).ok()
}

pub fn sanitize_function_name(name: &str) -> String {
    let re = Regex::new(r"[^a-zA-Z0-9_-]").unwrap();
    re.replace_all(name, "_").to_string()
}

#[derive(Debug, thiserror::Error)]
#[error("Input message too long. Message: {0}")]
pub struct InitialMessageTooLargeError(String);

pub fn check_openai_context_length_error(error: &Value) -> Option<InitialMessageTooLargeError> {
    let code = error.get("code")?.as_str()?;
    if code == "context_length_exceeded" || code == "string_above_max_length" {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error")
            .to_string();
        Some(InitialMessageTooLargeError(message))
    } else {
        None
    }
}
