use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};

use super::base::{ProviderChunk, Usage};
use crate::errors::AgentError;
use crate::models::message::{Message, MessageContent};
use crate::models::role::Role;
use crate::models::tool::{Tool, ToolCall};

/// Convert internal Message format to Gemini `contents`
///
/// Gemini matches function responses to calls by name rather than id, so the
/// names are recovered from the tool requests earlier in the history.
pub fn messages_to_gemini_spec(messages: &[Message]) -> Vec<Value> {
    let mut names_by_id: HashMap<&str, &str> = HashMap::new();
    let mut contents = Vec::new();

    for message in messages {
        let role = match message.role {
            Role::User => "user",
            Role::Assistant => "model",
        };
        let mut parts = Vec::new();

        for content in &message.content {
            match content {
                MessageContent::Text(text) => {
                    if !text.text.is_empty() {
                        parts.push(json!({ "text": text.text }));
                    }
                }
                MessageContent::ToolRequest(request) => match &request.tool_call {
                    Ok(tool_call) => {
                        names_by_id.insert(request.id.as_str(), tool_call.name.as_str());
                        parts.push(json!({
                            "functionCall": {
                                "name": tool_call.name,
                                "args": tool_call.arguments,
                            }
                        }));
                    }
                    Err(e) => {
                        // the model produced an unusable call; show it what went wrong
                        parts.push(json!({ "text": format!("(invalid tool call: {})", e) }));
                    }
                },
                MessageContent::ToolResponse(response) => {
                    let Some(name) = names_by_id.get(response.id.as_str()) else {
                        continue;
                    };
                    let body = match &response.tool_result {
                        Ok(output) => json!({ "result": output }),
                        Err(e) => json!({ "error": e.to_string() }),
                    };
                    parts.push(json!({
                        "functionResponse": {
                            "name": name,
                            "response": body,
                        }
                    }));
                }
            }
        }

        if !parts.is_empty() {
            contents.push(json!({ "role": role, "parts": parts }));
        }
    }

    contents
}

/// Convert internal Tool format to Gemini's `tools` specification
pub fn tools_to_gemini_spec(tools: &[Tool]) -> Result<Vec<Value>> {
    if tools.is_empty() {
        return Ok(vec![]);
    }

    let mut tool_names = HashSet::new();
    let mut declarations = Vec::new();
    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(anyhow!("Duplicate tool name: {}", tool.name));
        }
        declarations.push(json!({
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.input_schema,
        }));
    }

    Ok(vec![json!({ "functionDeclarations": declarations })])
}

pub fn gemini_usage(response: &Value) -> Option<Usage> {
    let metadata = response.get("usageMetadata")?;
    let field = |name: &str| metadata.get(name).and_then(Value::as_i64).map(|v| v as i32);
    Some(Usage::new(
        field("promptTokenCount"),
        field("candidatesTokenCount"),
        field("totalTokenCount"),
    ))
}

/// Convert one Gemini `GenerateContentResponse` (full or streamed) to chunks.
/// Usage is not included; streamed responses repeat it cumulatively.
pub fn gemini_response_to_chunks(response: &Value) -> Result<Vec<ProviderChunk>> {
    if let Some(error) = response.get("error") {
        return Err(anyhow!(
            "Gemini error: {}",
            error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
        ));
    }

    let candidate = match response.pointer("/candidates/0") {
        Some(candidate) => candidate,
        None => {
            if let Some(reason) = response
                .pointer("/promptFeedback/blockReason")
                .and_then(Value::as_str)
            {
                return Err(anyhow!("Gemini blocked the prompt: {}", reason));
            }
            // usage-only chunk
            return Ok(vec![]);
        }
    };

    let mut chunks = Vec::new();
    let parts = candidate
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    for part in parts {
        if let Some(text) = part.get("text").and_then(Value::as_str) {
            if !text.is_empty() {
                chunks.push(ProviderChunk::Text(text.to_string()));
            }
        } else if let Some(call) = part.get("functionCall") {
            let id = format!("call_{}", uuid::Uuid::new_v4().simple());
            let tool_call = match call.get("name").and_then(Value::as_str) {
                Some(name) if !name.is_empty() => Ok(ToolCall::new(
                    name,
                    call.get("args").cloned().unwrap_or_else(|| json!({})),
                )),
                _ => Err(AgentError::InvalidParameters(
                    "function call without a name".to_string(),
                )),
            };
            chunks.push(ProviderChunk::ToolRequest { id, tool_call });
        }
    }

    if chunks.is_empty() {
        if let Some(reason) = candidate.get("finishReason").and_then(Value::as_str) {
            if reason == "SAFETY" || reason == "RECITATION" {
                return Err(anyhow!("Gemini stopped generating: {}", reason));
            }
        }
    }

    Ok(chunks)
}

/// Assemble chunks back into a complete assistant message
pub fn chunks_to_message(chunks: Vec<ProviderChunk>) -> Message {
    let mut message = Message::assistant();
    for chunk in chunks {
        message = match chunk {
            ProviderChunk::Text(text) => message.with_text(text),
            ProviderChunk::ToolRequest { id, tool_call } => message.with_tool_request(id, tool_call),
            ProviderChunk::Usage(_) => message,
        };
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_to_gemini_spec_maps_roles_and_tool_round() {
        let messages = vec![
            Message::user().with_text("What is 2*3?"),
            Message::assistant()
                .with_tool_request("call_1", Ok(ToolCall::new("calculator", json!({"expression": "2*3"})))),
            Message::user().with_tool_response("call_1", Ok(json!({"result": 6.0}))),
            Message::assistant().with_text("6"),
        ];

        let spec = messages_to_gemini_spec(&messages);
        assert_eq!(spec.len(), 4);
        assert_eq!(spec[0], json!({"role": "user", "parts": [{"text": "What is 2*3?"}]}));
        assert_eq!(
            spec[1],
            json!({"role": "model", "parts": [{"functionCall": {"name": "calculator", "args": {"expression": "2*3"}}}]})
        );
        assert_eq!(
            spec[2],
            json!({"role": "user", "parts": [{"functionResponse": {"name": "calculator", "response": {"result": {"result": 6.0}}}}]})
        );
        assert_eq!(spec[3]["role"], json!("model"));
    }

    #[test]
    fn test_messages_to_gemini_spec_reports_tool_errors_and_skips_empty() {
        let messages = vec![
            Message::assistant()
                .with_tool_request("call_1", Ok(ToolCall::new("web_search", json!({"query": "x"})))),
            Message::user().with_tool_response("call_1", Err(AgentError::ExecutionError("timeout".into()))),
            Message::user().with_tool_response("unknown", Ok(json!({}))),
            Message::assistant().with_text(""),
        ];

        let spec = messages_to_gemini_spec(&messages);
        assert_eq!(spec.len(), 2);
        assert_eq!(
            spec[1]["parts"][0]["functionResponse"]["response"],
            json!({"error": "Tool execution failed: timeout"})
        );
    }

    #[test]
    fn test_tools_to_gemini_spec() {
        let tools = vec![
            Tool::new("calculator", "Do math", json!({"type": "object"})),
            Tool::new("web_search", "Search", json!({"type": "object"})),
        ];
        let spec = tools_to_gemini_spec(&tools).unwrap();
        assert_eq!(spec.len(), 1);
        assert_eq!(spec[0]["functionDeclarations"][1]["name"], json!("web_search"));

        assert!(tools_to_gemini_spec(&[]).unwrap().is_empty());

        let duplicated = vec![tools[0].clone(), tools[0].clone()];
        assert!(tools_to_gemini_spec(&duplicated).is_err());
    }

    #[test]
    fn test_gemini_response_to_chunks() {
        let response = json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"text": "Checking"},
                    {"functionCall": {"name": "calculator", "args": {"expression": "1+1"}}}
                ]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 7, "candidatesTokenCount": 3, "totalTokenCount": 10}
        });

        let chunks = gemini_response_to_chunks(&response).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], ProviderChunk::Text("Checking".into()));
        match &chunks[1] {
            ProviderChunk::ToolRequest { id, tool_call } => {
                assert!(id.starts_with("call_"));
                assert_eq!(
                    tool_call.as_ref().unwrap(),
                    &ToolCall::new("calculator", json!({"expression": "1+1"}))
                );
            }
            other => panic!("unexpected chunk {:?}", other),
        }
        assert_eq!(gemini_usage(&response), Some(Usage::new(Some(7), Some(3), Some(10))));

        let message = chunks_to_message(chunks);
        assert_eq!(message.text(), "Checking");
        assert_eq!(message.tool_requests().count(), 1);
    }

    #[test]
    fn test_gemini_blocked_and_error_responses() {
        let blocked = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        assert!(gemini_response_to_chunks(&blocked).is_err());

        let error = json!({"error": {"code": 400, "message": "bad request"}});
        let err = gemini_response_to_chunks(&error).unwrap_err();
        assert!(err.to_string().contains("bad request"));

        let usage_only = json!({"usageMetadata": {"totalTokenCount": 1}});
        assert!(gemini_response_to_chunks(&usage_only).unwrap().is_empty());
    }
}
