pub mod conversation_state;
pub mod math;
pub mod prompt;

use std::fs;
use std::io::Write;
use std::process::ExitCode;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use color_print::cformat;
use conversation_state::{ConversationController, Message, Nudge, TutorConfig};
use crossterm::style::Stylize;
use eyre::{eyre, Result};
use math::{TerminalTypesetter, Typesetter};
use prompt::generate_prompt;
use rustyline::error::ReadlineError;
use tracing::debug;

use crate::tutor_client::TutorClient;

const WELCOME_TEXT: &str = "
Type a math problem, or attach a photo of one with /image <path>.

/why          Ask why we did the last step
/next         Ask for the next step
/image <path> Attach an image to your next message
/clear        Start the conversation over
/help         Show the help dialogue
/quit         Quit the application
";

const HELP_TEXT: &str = "
Socratica CLI

/why          Ask why we did the last step
/next         Ask for the next step
/image <path> Attach an image to your next message
              (press Enter on an empty line to send the image by itself)
/clear        Start the conversation over
/help         Show this help dialogue
/quit         Quit the application
";

pub struct ChatContext {
    output: Box<dyn Write>,
    input: Option<String>,
    interactive: bool,
    controller: ConversationController,
    tutor: TutorClient,
    pending_image: Option<String>,
    typesetter: Box<dyn Typesetter>,
}

impl ChatContext {
    pub fn new(
        output: Box<dyn Write>,
        input: Option<String>,
        interactive: bool,
        model: String,
        config: TutorConfig,
    ) -> Self {
        Self {
            output,
            input,
            interactive,
            controller: ConversationController::new(config),
            tutor: TutorClient::new(model),
            pending_image: None,
            typesetter: Box::new(TerminalTypesetter),
        }
    }

    pub async fn run(&mut self) -> Result<ExitCode> {
        if self.interactive {
            self.print_welcome()?;
            if let Some(greeting) = self.controller.conversation().messages().first().cloned() {
                self.display_message(&greeting)?;
            }
        }

        // Non-interactive mode (single query)
        if let Some(input) = self.input.take() {
            self.handle_input(&input).await?;
            return Ok(ExitCode::SUCCESS);
        }

        if self.interactive {
            self.run_interactive().await?;
        }

        Ok(ExitCode::SUCCESS)
    }

    fn print_welcome(&mut self) -> Result<()> {
        writeln!(
            self.output,
            "{}",
            cformat!("<bold><cyan>Socratica</cyan></bold> — your compassionate math mentor")
        )?;
        writeln!(self.output, "{}", WELCOME_TEXT)?;
        Ok(())
    }

    async fn run_interactive(&mut self) -> Result<()> {
        let mut rl = prompt::rl()?;
        let history = prompt::history_path();
        if let Some(path) = &history {
            let _ = rl.load_history(path);
        }

        loop {
            let prompt_text = generate_prompt(None);
            let readline = rl.readline(&prompt_text);

            match readline {
                Ok(line) => {
                    if line.trim().is_empty() {
                        // An empty line sends a pending image on its own.
                        if self.pending_image.is_some() {
                            if let Err(e) = self.process_chat_input("").await {
                                writeln!(self.output, "Error: {}", e)?;
                            }
                        }
                        continue;
                    }

                    rl.add_history_entry(line.as_str());

                    if line.trim() == "/quit" {
                        break;
                    }

                    if let Err(e) = self.handle_input(&line).await {
                        writeln!(self.output, "Error: {}", e)?;
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(e) => {
                    writeln!(self.output, "Error: {}", e)?;
                    break;
                }
            }
        }

        if let Some(path) = &history {
            let _ = rl.save_history(path);
        }

        Ok(())
    }

    async fn handle_input(&mut self, input: &str) -> Result<()> {
        let trimmed = input.trim();
        match trimmed {
            "/help" => {
                writeln!(self.output, "{}", HELP_TEXT)?;
            }
            "/clear" => {
                self.controller.reset();
                self.pending_image = None;
                writeln!(self.output, "Conversation cleared.")?;
                if let Some(greeting) = self.controller.conversation().messages().first().cloned() {
                    self.display_message(&greeting)?;
                }
            }
            "/why" => {
                self.process_nudge(Nudge::Why).await?;
            }
            "/next" => {
                self.process_nudge(Nudge::NextStep).await?;
            }
            "/image" => {
                writeln!(self.output, "Usage: /image <path>")?;
            }
            _ => {
                if let Some(path) = trimmed.strip_prefix("/image ") {
                    self.attach_image(path.trim())?;
                } else {
                    self.process_chat_input(trimmed).await?;
                }
            }
        }

        Ok(())
    }

    /// Reads an image fully into memory and holds it as a data string for the
    /// next send. No size limit is enforced here; an oversized payload is the
    /// provider's problem.
    fn attach_image(&mut self, path: &str) -> Result<()> {
        let bytes =
            fs::read(path).map_err(|e| eyre!("Failed to read image {}: {}", path, e))?;
        self.pending_image = Some(format!(
            "data:image/jpeg;base64,{}",
            BASE64_STANDARD.encode(bytes)
        ));
        writeln!(
            self.output,
            "Image attached. It will go with your next message; press Enter to send it on its own."
        )?;
        Ok(())
    }

    async fn process_chat_input(&mut self, text: &str) -> Result<()> {
        let image = self.pending_image.take();
        if !self.controller.can_send(text, image.as_deref()) {
            self.pending_image = image;
            writeln!(self.output, "Type a question or attach an image first.")?;
            return Ok(());
        }

        self.show_thinking()?;
        if let Some(reply) = self.controller.send(&self.tutor, text, image).await {
            self.display_message(&reply)?;
        }
        Ok(())
    }

    async fn process_nudge(&mut self, nudge: Nudge) -> Result<()> {
        if !self.controller.can_nudge() {
            writeln!(
                self.output,
                "Ask me a question first, then I can help with follow-ups."
            )?;
            return Ok(());
        }

        writeln!(self.output, "{}{}", generate_prompt(None), nudge.text())?;
        self.show_thinking()?;
        if let Some(reply) = self.controller.nudge(&self.tutor, nudge).await {
            self.display_message(&reply)?;
        }
        Ok(())
    }

    fn show_thinking(&mut self) -> Result<()> {
        writeln!(
            self.output,
            "{}",
            "Socratica is thinking deeply...".dim().italic()
        )?;
        Ok(())
    }

    fn display_message(&mut self, message: &Message) -> Result<()> {
        debug!(
            "rendering message {} created at {}",
            message.id, message.timestamp
        );
        writeln!(self.output, "{}", "Socratica".bold())?;
        for part in &message.parts {
            if part.image.is_some() {
                writeln!(self.output, "[image]")?;
            }
            if let Some(text) = &part.text {
                let rendered = math::render_to_terminal(text, self.typesetter.as_ref());
                writeln!(self.output, "{}", rendered)?;
            }
        }
        writeln!(self.output)?;
        Ok(())
    }
}
