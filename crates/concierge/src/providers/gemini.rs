use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response};
use serde_json::{json, Value};
use std::time::Duration;

use super::base::{ChunkStream, Provider, ProviderChunk, ProviderError, Usage};
use super::configs::GeminiProviderConfig;
use super::utils::{
    chunks_to_message, gemini_response_to_chunks, gemini_usage, messages_to_gemini_spec,
    tools_to_gemini_spec,
};
use crate::models::message::Message;
use crate::models::tool::Tool;
use crate::protocol::LineDecoder;

pub struct GeminiProvider {
    client: Client,
    config: GeminiProviderConfig,
}

impl GeminiProvider {
    pub fn new(config: GeminiProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    fn url(&self, method: &str) -> String {
        format!(
            "{}/v1beta/models/{}:{}",
            self.config.host.trim_end_matches('/'),
            self.config.model,
            method
        )
    }

    fn payload(&self, system: &str, messages: &[Message], tools: &[Tool]) -> Result<Value> {
        let mut payload = json!({
            "systemInstruction": { "parts": [{ "text": system }] },
            "contents": messages_to_gemini_spec(messages),
        });

        let tools_spec = tools_to_gemini_spec(tools)?;
        if !tools_spec.is_empty() {
            payload["tools"] = json!(tools_spec);
        }

        let mut generation_config = serde_json::Map::new();
        if let Some(temperature) = self.config.temperature {
            generation_config.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(max_tokens) = self.config.max_tokens {
            generation_config.insert("maxOutputTokens".to_string(), json!(max_tokens));
        }
        if !generation_config.is_empty() {
            payload["generationConfig"] = Value::Object(generation_config);
        }

        Ok(payload)
    }

    async fn post(&self, url: &str, payload: &Value) -> Result<Response> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(String::from))
            .unwrap_or(body);
        Err(ProviderError {
            status: status.as_u16(),
            message,
        }
        .into())
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<(Message, Usage)> {
        let payload = self.payload(system, messages, tools)?;
        let response: Value = self
            .post(&self.url("generateContent"), &payload)
            .await?
            .json()
            .await?;

        let chunks = gemini_response_to_chunks(&response)?;
        let usage = gemini_usage(&response).unwrap_or_default();
        Ok((chunks_to_message(chunks), usage))
    }

    async fn stream(&self, system: &str, messages: &[Message], tools: &[Tool]) -> Result<ChunkStream> {
        let payload = self.payload(system, messages, tools)?;
        let response = self
            .post(&self.url("streamGenerateContent?alt=sse"), &payload)
            .await?;
        let mut bytes = response.bytes_stream();

        Ok(Box::pin(async_stream::try_stream! {
            let mut decoder = LineDecoder::new();
            let mut usage = None;

            while let Some(chunk) = bytes.next().await {
                for line in decoder.push(&chunk?) {
                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let event: Value = serde_json::from_str(data.trim())?;
                    if let Some(latest) = gemini_usage(&event) {
                        usage = Some(latest);
                    }
                    for chunk in gemini_response_to_chunks(&event)? {
                        yield chunk;
                    }
                }
            }

            if let Some(line) = decoder.finish() {
                if let Some(data) = line.strip_prefix("data:") {
                    let event: Value = serde_json::from_str(data.trim())?;
                    if let Some(latest) = gemini_usage(&event) {
                        usage = Some(latest);
                    }
                    for chunk in gemini_response_to_chunks(&event)? {
                        yield chunk;
                    }
                }
            }

            yield ProviderChunk::Usage(usage.unwrap_or_default());
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tool::ToolCall;
    use futures::TryStreamExt;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> GeminiProvider {
        GeminiProvider::new(GeminiProviderConfig {
            host: server.uri(),
            api_key: "gemini-key".to_string(),
            model: "gemini-test".to_string(),
            temperature: Some(0.2),
            max_tokens: None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_complete_sends_system_and_tools() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-test:generateContent"))
            .and(header("x-goog-api-key", "gemini-key"))
            .and(body_partial_json(json!({
                "systemInstruction": {"parts": [{"text": "be brief"}]},
                "generationConfig": {"temperature": 0.2}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"role": "model", "parts": [{"text": "Hi!"}]}}],
                "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 2, "totalTokenCount": 6}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tools = vec![Tool::new("calculator", "math", json!({"type": "object"}))];
        let (message, usage) = provider_for(&server)
            .complete("be brief", &[Message::user().with_text("hello")], &tools)
            .await
            .unwrap();

        assert_eq!(message.text(), "Hi!");
        assert_eq!(usage, Usage::new(Some(4), Some(2), Some(6)));
    }

    #[tokio::test]
    async fn test_stream_parses_sse_events() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hel\"}]}}]}\r\n\r\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"lo\"}]}}]}\r\n\r\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"functionCall\":{\"name\":\"calculator\",\"args\":{\"expression\":\"1\"}}}]}}],",
            "\"usageMetadata\":{\"promptTokenCount\":5,\"candidatesTokenCount\":3,\"totalTokenCount\":8}}\r\n\r\n"
        );
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-test:streamGenerateContent"))
            .and(query_param("alt", "sse"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let chunks: Vec<ProviderChunk> = provider_for(&server)
            .stream("system", &[Message::user().with_text("hi")], &[])
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0], ProviderChunk::Text("Hel".into()));
        assert_eq!(chunks[1], ProviderChunk::Text("lo".into()));
        match &chunks[2] {
            ProviderChunk::ToolRequest { tool_call, .. } => assert_eq!(
                tool_call.as_ref().unwrap(),
                &ToolCall::new("calculator", json!({"expression": "1"}))
            ),
            other => panic!("unexpected chunk {:?}", other),
        }
        assert_eq!(chunks[3], ProviderChunk::Usage(Usage::new(Some(5), Some(3), Some(8))));
    }

    #[tokio::test]
    async fn test_api_failure_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": {"code": 429, "message": "Resource has been exhausted"}
            })))
            .mount(&server)
            .await;

        let err = match provider_for(&server)
            .stream("system", &[Message::user().with_text("hi")], &[])
            .await
        {
            Ok(_) => panic!("expected failure"),
            Err(err) => err,
        };
        let provider_error = err.downcast_ref::<ProviderError>().unwrap();
        assert_eq!(provider_error.status, 429);
        assert_eq!(provider_error.message, "Resource has been exhausted");
    }
}
