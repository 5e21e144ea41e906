use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::{Arc, Mutex};

use crate::models::message::{Message, MessageContent};
use crate::models::tool::Tool;
use crate::providers::base::{ChunkStream, Provider, ProviderChunk, ProviderError, Usage};

/// What the mock was asked on one call
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system: String,
    pub messages: Vec<Message>,
    pub tools: Vec<String>,
}

/// A mock provider that returns pre-configured responses for testing.
///
/// Clones share the script and the call log, so a test can keep a handle after
/// giving the provider away.
#[derive(Clone, Default)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<Result<Message, ProviderError>>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of responses
    pub fn new(responses: Vec<Message>) -> Self {
        Self::scripted(responses.into_iter().map(Ok).collect())
    }

    /// Create a mock whose responses may also be API failures
    pub fn scripted(responses: Vec<Result<Message, ProviderError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            calls: Arc::default(),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    fn next_response(&self, system: &str, messages: &[Message], tools: &[Tool]) -> Result<Message> {
        self.calls.lock().unwrap().push(RecordedCall {
            system: system.to_string(),
            messages: messages.to_vec(),
            tools: tools.iter().map(|t| t.name.clone()).collect(),
        });

        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            // Return empty response if no more pre-configured responses
            Ok(Message::assistant().with_text(""))
        } else {
            Ok(responses.remove(0)?)
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<(Message, Usage)> {
        Ok((self.next_response(system, messages, tools)?, Usage::default()))
    }

    /// Streams text word by word so consumers see several deltas
    async fn stream(&self, system: &str, messages: &[Message], tools: &[Tool]) -> Result<ChunkStream> {
        let message = self.next_response(system, messages, tools)?;
        let mut chunks = Vec::new();
        for content in message.content {
            match content {
                MessageContent::Text(text) => chunks.extend(
                    text.text
                        .split_inclusive(' ')
                        .map(|word| ProviderChunk::Text(word.to_string())),
                ),
                MessageContent::ToolRequest(request) => chunks.push(ProviderChunk::ToolRequest {
                    id: request.id,
                    tool_call: request.tool_call,
                }),
                MessageContent::ToolResponse(_) => {}
            }
        }
        chunks.push(ProviderChunk::Usage(Usage::new(Some(1), Some(1), Some(2))));
        Ok(stream::iter(chunks.into_iter().map(Ok)).boxed())
    }
}
