use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::AgentResult;
use crate::models::message::{Message, MessageContent};
use crate::models::tool::{Tool, ToolCall};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }

    /// Accumulate another round's usage into this one
    pub fn add(&mut self, other: &Usage) {
        fn sum(a: Option<i32>, b: Option<i32>) -> Option<i32> {
            match (a, b) {
                (None, None) => None,
                (a, b) => Some(a.unwrap_or(0) + b.unwrap_or(0)),
            }
        }
        self.input_tokens = sum(self.input_tokens, other.input_tokens);
        self.output_tokens = sum(self.output_tokens, other.output_tokens);
        self.total_tokens = sum(self.total_tokens, other.total_tokens);
    }
}

/// A failure reported by the model API, carrying its HTTP status
#[derive(Error, Debug, Clone, PartialEq)]
#[error("model provider returned {status}: {message}")]
pub struct ProviderError {
    pub status: u16,
    pub message: String,
}

/// One increment of a streamed completion
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderChunk {
    Text(String),
    ToolRequest {
        id: String,
        tool_call: AgentResult<ToolCall>,
    },
    Usage(Usage),
}

pub type ChunkStream = BoxStream<'static, Result<ProviderChunk>>;

/// Split a complete message into the chunks a streaming provider would emit
pub fn message_to_chunks(message: Message, usage: Usage) -> Vec<ProviderChunk> {
    let mut chunks: Vec<ProviderChunk> = message
        .content
        .into_iter()
        .filter_map(|content| match content {
            MessageContent::Text(text) => Some(ProviderChunk::Text(text.text)),
            MessageContent::ToolRequest(request) => Some(ProviderChunk::ToolRequest {
                id: request.id,
                tool_call: request.tool_call,
            }),
            MessageContent::ToolResponse(_) => None,
        })
        .collect();
    chunks.push(ProviderChunk::Usage(usage));
    chunks
}

/// Base trait for AI providers
#[async_trait]
pub trait Provider: Send + Sync {
    /// Generate the next message
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<(Message, Usage)>;

    /// Generate the next message incrementally. Errors opening the stream are
    /// returned before any chunk is produced.
    async fn stream(&self, system: &str, messages: &[Message], tools: &[Tool]) -> Result<ChunkStream> {
        let (message, usage) = self.complete(system, messages, tools).await?;
        Ok(stream::iter(message_to_chunks(message, usage).into_iter().map(Ok)).boxed())
    }
}
