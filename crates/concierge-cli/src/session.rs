use anyhow::Result;
use futures::StreamExt;

use concierge::protocol::WireEvent;

use crate::chat::ChatSession;
use crate::prompt::{InputType, Prompt};
use crate::transport::{ChatResponse, ChatTransport, EventStream};

/// Opens the re-authentication page
pub type UrlOpener<'a> = Box<dyn Fn(&str) -> Result<()> + 'a>;

pub struct Session<'a> {
    chat: ChatSession,
    transport: Box<dyn ChatTransport + 'a>,
    prompt: Box<dyn Prompt + 'a>,
    reauth_url: String,
    open_url: UrlOpener<'a>,
}

impl<'a> Session<'a> {
    pub fn new(
        transport: Box<dyn ChatTransport + 'a>,
        prompt: Box<dyn Prompt + 'a>,
        reauth_url: String,
        open_url: UrlOpener<'a>,
    ) -> Self {
        Session {
            chat: ChatSession::new(),
            transport,
            prompt,
            reauth_url,
            open_url,
        }
    }

    pub fn chat(&self) -> &ChatSession {
        &self.chat
    }

    pub async fn start(&mut self) -> Result<()> {
        loop {
            let input = self.prompt.get_input(self.chat.error())?;
            match input.input_type {
                InputType::Exit => break,
                InputType::AskAgain => continue,
                InputType::Retry => self.retry()?,
                InputType::Message => {
                    if let Some(content) = &input.content {
                        self.send(content).await;
                    }
                }
            }
        }
        self.prompt.close();
        Ok(())
    }

    /// Submit one message and consume its reply
    pub async fn send(&mut self, text: &str) {
        let Some(request) = self.chat.submit(text) else {
            tracing::debug!("submission ignored while loading or blocked");
            return;
        };

        self.prompt.show_busy();
        match self.transport.send(&request).await {
            Err(e) => self.chat.on_transport_error(&e.to_string()),
            Ok(ChatResponse::Failed { status, body }) => {
                tracing::warn!(status, "chat request failed");
                self.chat.on_response_failed(status, &body);
            }
            Ok(ChatResponse::Streaming(stream)) => {
                self.chat.on_response_ok();
                self.consume(stream).await;
            }
        }
        self.prompt.hide_busy();

        for notification in self.chat.take_notifications() {
            self.prompt.notify(&notification);
        }
        if let Some(message) = self.chat.error().message() {
            self.prompt.show_error(message);
        }
    }

    async fn consume(&mut self, mut stream: EventStream) {
        loop {
            tokio::select! {
                event = stream.next() => {
                    match event {
                        Some(Ok(event)) => {
                            if self.chat.on_event(&event) {
                                self.render(&event);
                            }
                        }
                        Some(Err(e)) => {
                            self.chat.on_transport_error(&e.to_string());
                            break;
                        }
                        None => {
                            self.chat.on_stream_end();
                            break;
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    drop(stream);
                    // Keep what was streamed so far and stop listening
                    self.chat.on_stream_end();
                    self.prompt.end_reply();
                    self.prompt.notify("Interrupted, the rest of this reply was discarded");
                    break;
                }
            }
        }
    }

    fn render(&mut self, event: &WireEvent) {
        match event {
            WireEvent::Text(delta) => self.prompt.render_delta(delta),
            WireEvent::ToolCall { .. } | WireEvent::ToolResult { .. } => {
                if let Some(step) = self.chat.messages().last() {
                    self.prompt.render_tool_step(&step.content);
                }
            }
            WireEvent::Finish { .. } => self.prompt.end_reply(),
            // shown as the banner once the request settles
            WireEvent::Error(_) => {}
        }
    }

    /// The single recovery action: send the user through re-authentication
    fn retry(&mut self) -> Result<()> {
        let Some(url) = self.chat.retry(&self.reauth_url) else {
            return Ok(());
        };

        if let Err(e) = (self.open_url)(&url) {
            tracing::warn!("could not open a browser: {}", e);
            self.prompt.notify(&format!("Open {} to sign in again", url));
        }
        if self.prompt.confirm_reauth(&url)? {
            self.chat.reauthenticated();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_state::{ErrorState, BLOCKED_PLACEHOLDER};
    use crate::prompt::Input;
    use crate::transport::TransportError;
    use async_trait::async_trait;
    use concierge::protocol::ChatRequest;
    use futures::stream;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Replays scripted responses and records the requests it was sent
    struct MockTransport {
        responses: Mutex<VecDeque<Result<ChatResponse, TransportError>>>,
        requests: Arc<Mutex<Vec<ChatRequest>>>,
    }

    #[async_trait]
    impl ChatTransport for MockTransport {
        async fn send(&self, request: &ChatRequest) -> Result<ChatResponse, TransportError> {
            self.requests.lock().unwrap().push(request.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ChatResponse::Streaming(stream::empty().boxed())))
        }
    }

    #[derive(Default)]
    struct Recorded {
        output: Vec<String>,
        states_seen: Vec<ErrorState>,
    }

    /// Answers with scripted inputs and records everything it is asked to show
    struct RecordingPrompt {
        inputs: VecDeque<Input>,
        recorded: Arc<Mutex<Recorded>>,
        confirm: bool,
    }

    impl RecordingPrompt {
        fn log(&self, line: String) {
            self.recorded.lock().unwrap().output.push(line);
        }
    }

    impl Prompt for RecordingPrompt {
        fn get_input(&mut self, error: &ErrorState) -> Result<Input> {
            self.recorded.lock().unwrap().states_seen.push(error.clone());
            Ok(self
                .inputs
                .pop_front()
                .unwrap_or_else(|| Input::of(InputType::Exit)))
        }
        fn render_delta(&mut self, delta: &str) {
            self.log(format!("delta:{}", delta));
        }
        fn render_tool_step(&mut self, step: &str) {
            self.log(format!("tool:{}", step));
        }
        fn end_reply(&mut self) {
            self.log("end".into());
        }
        fn show_error(&mut self, message: &str) {
            self.log(format!("banner:{}", message));
        }
        fn notify(&mut self, message: &str) {
            self.log(format!("notify:{}", message));
        }
        fn show_busy(&mut self) {}
        fn hide_busy(&mut self) {}
        fn confirm_reauth(&mut self, url: &str) -> Result<bool> {
            self.log(format!("reauth:{}", url));
            Ok(self.confirm)
        }
        fn close(&self) {}
    }

    const REAUTH_URL: &str = "https://app.example.com/auth/logout";

    struct Harness {
        requests: Arc<Mutex<Vec<ChatRequest>>>,
        recorded: Arc<Mutex<Recorded>>,
        opened: Arc<Mutex<Vec<String>>>,
    }

    fn session(
        responses: Vec<Result<ChatResponse, TransportError>>,
        inputs: Vec<Input>,
    ) -> (Session<'static>, Harness) {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let opened = Arc::new(Mutex::new(Vec::new()));

        let transport = MockTransport {
            responses: Mutex::new(responses.into()),
            requests: requests.clone(),
        };
        let prompt = RecordingPrompt {
            inputs: inputs.into(),
            recorded: recorded.clone(),
            confirm: true,
        };
        let opened_by_session = opened.clone();
        let session = Session::new(
            Box::new(transport),
            Box::new(prompt),
            REAUTH_URL.to_string(),
            Box::new(move |url: &str| {
                opened_by_session.lock().unwrap().push(url.to_string());
                Ok(())
            }),
        );
        (
            session,
            Harness {
                requests,
                recorded,
                opened,
            },
        )
    }

    fn streaming(events: Vec<WireEvent>) -> Result<ChatResponse, TransportError> {
        Ok(ChatResponse::Streaming(
            stream::iter(events.into_iter().map(Ok)).boxed(),
        ))
    }

    fn finish() -> WireEvent {
        WireEvent::Finish {
            finish_reason: "stop".into(),
            prompt_tokens: 1,
            completion_tokens: 1,
        }
    }

    #[tokio::test]
    async fn test_forbidden_blocks_until_reauth() {
        let (mut session, harness) = session(
            vec![
                Ok(ChatResponse::Failed {
                    status: 403,
                    body: r#"{ "error": "forbidden" }"#.to_string(),
                }),
                streaming(vec![WireEvent::Text("Welcome back".into()), finish()]),
            ],
            vec![
                Input::message("read my mail"),
                Input::message("please?"),
                Input::of(InputType::Retry),
                Input::message("read my mail"),
            ],
        );

        session.start().await.unwrap();

        // the message sent while blocked never left the client
        assert_eq!(harness.requests.lock().unwrap().len(), 2);
        assert_eq!(*harness.opened.lock().unwrap(), vec![REAUTH_URL.to_string()]);

        let recorded = harness.recorded.lock().unwrap();
        assert!(recorded.output.contains(&"banner:forbidden".to_string()));
        assert!(recorded.output.contains(&format!("reauth:{}", REAUTH_URL)));

        let blocked = &recorded.states_seen[1];
        assert_eq!(blocked.message(), Some("forbidden"));
        assert!(!blocked.input_enabled());
        assert_eq!(blocked.placeholder(), BLOCKED_PLACEHOLDER);

        // cleared once back from re-authentication
        assert_eq!(recorded.states_seen[3], ErrorState::Clear);
        assert_eq!(*session.chat().error(), ErrorState::Clear);
    }

    #[tokio::test]
    async fn test_stream_renders_deltas_and_tool_steps() {
        let (mut session, harness) = session(
            vec![streaming(vec![
                WireEvent::ToolCall {
                    tool_call_id: "call_1".into(),
                    tool_name: "calculator".into(),
                    args: serde_json::json!({"expression": "2+2"}),
                },
                WireEvent::ToolResult {
                    tool_call_id: "call_1".into(),
                    result: serde_json::json!({"result": 4.0}),
                },
                WireEvent::Text("It is ".into()),
                WireEvent::Text("4.".into()),
                finish(),
            ])],
            vec![],
        );

        session.send("2+2?").await;

        let output = harness.recorded.lock().unwrap().output.clone();
        assert_eq!(
            output,
            vec![
                r#"tool:Using calculator {"expression":"2+2"}"#.to_string(),
                r#"tool:Result {"result":4.0}"#.to_string(),
                "delta:It is ".to_string(),
                "delta:4.".to_string(),
                "end".to_string(),
            ]
        );
        assert_eq!(session.chat().messages().last().unwrap().content, "It is 4.");
        assert!(!session.chat().loading());
    }

    #[tokio::test]
    async fn test_stream_error_blocks_and_notifies() {
        let (mut session, harness) = session(
            vec![streaming(vec![
                WireEvent::Text("Partial".into()),
                WireEvent::Error("model overloaded".into()),
                WireEvent::Text(" ignored".into()),
            ])],
            vec![],
        );

        session.send("hi").await;

        let output = harness.recorded.lock().unwrap().output.clone();
        assert_eq!(
            output,
            vec![
                "delta:Partial".to_string(),
                "notify:model overloaded".to_string(),
                "banner:model overloaded".to_string(),
            ]
        );
        assert_eq!(session.chat().messages().last().unwrap().content, "Partial");
    }

    #[tokio::test]
    async fn test_transport_failure_blocks_with_its_message() {
        let (mut session, harness) = session(vec![], vec![]);
        // replace the default empty stream with a broken connection
        session.transport = Box::new(MockTransport {
            responses: Mutex::new(
                vec![Err(TransportError::Protocol(
                    concierge::protocol::ProtocolError::MissingPrefix("garbage".into()),
                ))]
                .into(),
            ),
            requests: harness.requests.clone(),
        });

        session.send("hi").await;

        let message = session.chat().error().message().unwrap().to_string();
        let output = harness.recorded.lock().unwrap().output.clone();
        assert_eq!(
            output,
            vec![format!("notify:{}", message), format!("banner:{}", message)]
        );
    }
}
