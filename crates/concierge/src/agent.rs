use anyhow::Result;
use futures::stream::{BoxStream, StreamExt};
use indoc::formatdoc;
use serde_json::{json, Value};

use crate::capabilities::{self, Capability, CapabilitySet};
use crate::errors::{AgentError, AgentResult};
use crate::events::{AgentEvent, FinishReason};
use crate::models::message::{Message, ToolRequest};
use crate::models::tool::ToolCall;
use crate::providers::base::{Provider, ProviderChunk, Usage};
use crate::provisioner::Provision;

/// Tool rounds allowed in one reply before the agent gives up
pub const MAX_ROUNDS: usize = 8;

/// Everything one invocation needs. Built fresh for every request and moved
/// into the agent, so nothing is shared between requests.
pub struct SessionContext {
    pub history: Vec<Message>,
    pub capabilities: CapabilitySet,
    pub template: String,
}

impl SessionContext {
    /// Combine a history with a provision, appending the degradation note (if
    /// any) to the behavior template
    pub fn new(history: Vec<Message>, provision: Provision, template: String) -> Self {
        let template = match provision.note {
            Some(note) => formatdoc! {"
                {template}

                {note}
            "},
            None => template,
        };
        Self {
            history,
            capabilities: provision.capabilities,
            template,
        }
    }
}

/// Agent drives a model through tool rounds with the capabilities it was provisioned
pub struct Agent {
    provider: Box<dyn Provider>,
    max_rounds: usize,
}

impl Agent {
    /// Create a new Agent with the specified provider
    pub fn new(provider: Box<dyn Provider>) -> Self {
        Self {
            provider,
            max_rounds: MAX_ROUNDS,
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Stream the agent's reply to the history in `context`.
    ///
    /// The first model call is made before returning, so an API failure (bad
    /// key, quota) is reported here rather than as a stream event. Later
    /// failures end the stream with [`AgentEvent::Error`].
    pub async fn reply(self, context: SessionContext) -> Result<BoxStream<'static, AgentEvent>> {
        let SessionContext {
            mut history,
            capabilities,
            template,
        } = context;
        let tools = capabilities::tools(&capabilities);
        let first = self.provider.stream(&template, &history, &tools).await?;

        Ok(Box::pin(async_stream::stream! {
            let mut pending = Some(first);
            let mut total = Usage::default();
            let mut rounds = 0;

            loop {
                let mut chunks = match pending.take() {
                    Some(chunks) => chunks,
                    None => match self.provider.stream(&template, &history, &tools).await {
                        Ok(chunks) => chunks,
                        Err(e) => {
                            yield AgentEvent::Error(e.to_string());
                            return;
                        }
                    },
                };

                let mut response = Message::assistant();
                let mut text = String::new();
                let mut failure = None;
                while let Some(chunk) = chunks.next().await {
                    match chunk {
                        Ok(ProviderChunk::Text(delta)) => {
                            if delta.is_empty() {
                                continue;
                            }
                            text.push_str(&delta);
                            yield AgentEvent::TextDelta(delta);
                        }
                        Ok(ProviderChunk::ToolRequest { id, tool_call }) => {
                            if !text.is_empty() {
                                response = response.with_text(std::mem::take(&mut text));
                            }
                            response = response.with_tool_request(id, tool_call);
                        }
                        Ok(ProviderChunk::Usage(usage)) => {
                            total.add(&usage);
                            yield AgentEvent::Usage(usage);
                        }
                        Err(e) => {
                            failure = Some(e.to_string());
                            break;
                        }
                    }
                }
                if let Some(message) = failure {
                    yield AgentEvent::Error(message);
                    return;
                }
                if !text.is_empty() {
                    response = response.with_text(text);
                }

                let requests: Vec<ToolRequest> = response.tool_requests().cloned().collect();
                history.push(response);

                if requests.is_empty() {
                    yield AgentEvent::Completion {
                        reason: FinishReason::Stop,
                        usage: total,
                    };
                    return;
                }

                if rounds == self.max_rounds {
                    tracing::warn!(max_rounds = self.max_rounds, "agent stopped after reaching its tool round limit");
                    yield AgentEvent::Completion {
                        reason: FinishReason::Length,
                        usage: total,
                    };
                    return;
                }
                rounds += 1;

                for request in &requests {
                    let (name, arguments) = describe(&request.tool_call);
                    yield AgentEvent::ToolCallStarted {
                        id: request.id.clone(),
                        name,
                        arguments,
                    };
                }

                // Make sure the started events are flushed before slow tools run
                tokio::task::yield_now().await;

                let outputs = futures::future::join_all(
                    requests
                        .iter()
                        .map(|request| dispatch(&capabilities, request.tool_call.clone())),
                )
                .await;

                let mut tool_responses = Message::user();
                for (request, output) in requests.iter().zip(outputs) {
                    let (name, _) = describe(&request.tool_call);
                    yield AgentEvent::ToolCallFinished {
                        id: request.id.clone(),
                        name,
                        result: output.clone(),
                    };
                    tool_responses = tool_responses.with_tool_response(request.id.clone(), output);
                }
                history.push(tool_responses);
            }
        }))
    }
}

fn describe(tool_call: &AgentResult<ToolCall>) -> (String, Value) {
    match tool_call {
        Ok(call) => (call.name.clone(), call.arguments.clone()),
        Err(_) => ("unknown".to_string(), json!({})),
    }
}

/// Dispatch a single tool call to the capability that declares it
async fn dispatch(
    capabilities: &[std::sync::Arc<dyn Capability>],
    tool_call: AgentResult<ToolCall>,
) -> AgentResult<Value> {
    let call = tool_call?;
    let capability = capabilities::find(capabilities, &call.name)
        .ok_or_else(|| AgentError::ToolNotFound(call.name.clone()))?;
    capability.call(call.arguments).await
}
