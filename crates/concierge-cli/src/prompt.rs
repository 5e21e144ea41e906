use anyhow::Result;

use crate::error_state::ErrorState;

pub mod cliclack;

pub trait Prompt {
    /// Ask for the next action. `error` decides what the user may do.
    fn get_input(&mut self, error: &ErrorState) -> Result<Input>;
    fn render_delta(&mut self, delta: &str);
    fn render_tool_step(&mut self, step: &str);
    /// The assistant finished its reply
    fn end_reply(&mut self);
    /// Show the blocking error banner
    fn show_error(&mut self, message: &str);
    /// Transient, dismissible notification
    fn notify(&mut self, message: &str);
    fn show_busy(&mut self);
    fn hide_busy(&mut self);
    /// Wait for the user to finish signing in again at `url`. Returns whether
    /// they did.
    fn confirm_reauth(&mut self, url: &str) -> Result<bool>;
    fn close(&self);
}

pub struct Input {
    pub input_type: InputType,
    pub content: Option<String>, // Only set for messages
}

impl Input {
    pub fn message<S: Into<String>>(content: S) -> Self {
        Self {
            input_type: InputType::Message,
            content: Some(content.into()),
        }
    }

    pub fn of(input_type: InputType) -> Self {
        Self {
            input_type,
            content: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputType {
    AskAgain, // Ask the user for input again. Control flow command.
    Message,  // User sent a message
    Retry,    // User chose to sign in again
    Exit,     // User wants to exit the session
}
