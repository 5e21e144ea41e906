use std::io::{self, Write};

use anyhow::Result;
use cliclack::{confirm, input, select, spinner};
use console::style;

use super::{Input, InputType, Prompt};
use crate::error_state::ErrorState;

pub struct CliclackPrompt {
    spinner: Option<cliclack::ProgressBar>,
    /// Whether a reply is being printed on the current line
    mid_reply: bool,
}

impl CliclackPrompt {
    pub fn new() -> Self {
        CliclackPrompt {
            spinner: None,
            mid_reply: false,
        }
    }

    fn blocked_input(&mut self, message: &str) -> Result<Input> {
        let choice = select(format!("{} {}", style("Error:").red().bold(), message))
            .item(InputType::Retry, "Sign out and sign back in", "opens your browser")
            .item(InputType::Exit, "Exit", "")
            .interact()?;
        Ok(Input::of(choice))
    }
}

impl Default for CliclackPrompt {
    fn default() -> Self {
        Self::new()
    }
}

fn flush() {
    // a failed flush only delays output
    let _ = io::stdout().flush();
}

impl Prompt for CliclackPrompt {
    fn get_input(&mut self, error: &ErrorState) -> Result<Input> {
        if let Some(message) = error.message() {
            return self.blocked_input(message);
        }

        let message_text: String = input("You:")
            .placeholder(error.placeholder())
            .interact()?;
        let message_text = message_text.trim().to_string();

        if message_text.eq_ignore_ascii_case("/exit") || message_text.eq_ignore_ascii_case("/quit")
        {
            Ok(Input::of(InputType::Exit))
        } else if message_text.eq_ignore_ascii_case("/?") {
            println!("Commands:");
            println!("/exit - Exit the session");
            println!("/? - Display this help message");
            println!("Ctrl+C - Stop the current reply");
            Ok(Input::of(InputType::AskAgain))
        } else {
            Ok(Input::message(message_text))
        }
    }

    fn render_delta(&mut self, delta: &str) {
        self.hide_busy();
        if !self.mid_reply {
            print!("{} ", style("Assistant:").cyan().bold());
            self.mid_reply = true;
        }
        print!("{}", delta);
        flush();
    }

    fn render_tool_step(&mut self, step: &str) {
        self.hide_busy();
        if self.mid_reply {
            println!();
            self.mid_reply = false;
        }
        println!("{}", style(step).dim());
    }

    fn end_reply(&mut self) {
        self.hide_busy();
        if self.mid_reply {
            println!();
            self.mid_reply = false;
        }
        println!();
    }

    fn show_error(&mut self, message: &str) {
        self.end_reply();
        let _ = cliclack::log::error(message);
    }

    fn notify(&mut self, message: &str) {
        self.hide_busy();
        let _ = cliclack::log::warning(message);
    }

    fn show_busy(&mut self) {
        let spin = spinner();
        spin.start("awaiting reply");
        self.spinner = Some(spin);
    }

    fn hide_busy(&mut self) {
        if let Some(spin) = self.spinner.take() {
            spin.stop("");
        }
    }

    fn confirm_reauth(&mut self, url: &str) -> Result<bool> {
        println!("Sign in at {}", style(url).underlined());
        let done = confirm("Finished signing back in?")
            .initial_value(true)
            .interact()?;
        Ok(done)
    }

    fn close(&self) {
        // No cleanup required
    }
}
