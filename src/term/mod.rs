//! Interactive line-buffered terminal against the sandbox's process-spawn
//! surface. Input arrives character by character; a carriage return runs the
//! accumulated line. Output and echo go to a surface sink owned by whatever
//! renders the terminal.

use crate::sandbox::SandboxHandle;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Sink for everything the terminal renders: echoes, command output,
/// prompts. Owned by the rendering surface.
pub type TerminalOutput = mpsc::UnboundedSender<String>;

const PROMPT: &str = "\r\n$ ";
const BANNER: &str = "sandpit terminal";
const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";
const BACKSPACE: &str = "\u{7f}";
const ERASE_LAST: &str = "\x08 \x08";

pub struct TerminalSession {
    sandbox: Arc<SandboxHandle>,
    surface: TerminalOutput,
    line: String,
    history: Vec<String>,
    history_cursor: Option<usize>,
    kill: CancellationToken,
}

impl TerminalSession {
    pub fn new(sandbox: Arc<SandboxHandle>, surface: TerminalOutput) -> Self {
        Self {
            sandbox,
            surface,
            line: String::new(),
            history: Vec::new(),
            history_cursor: None,
            kill: CancellationToken::new(),
        }
    }

    /// Write the banner and the first prompt.
    pub fn greet(&mut self) {
        self.write(BANNER);
        self.prompt();
    }

    /// Feed raw input. Printable characters are echoed and accumulated;
    /// backspace erases the last character when there is one; a carriage
    /// return executes the line.
    pub async fn handle_input(&mut self, data: &str) {
        match data {
            "\r" | "\n" | "\r\n" => {
                let line = std::mem::take(&mut self.line);
                self.execute(&line).await;
            }
            BACKSPACE => {
                if self.line.pop().is_some() {
                    self.write(ERASE_LAST);
                }
            }
            _ => {
                for ch in data.chars().filter(|c| !c.is_control()) {
                    self.line.push(ch);
                    self.write(ch.to_string());
                }
            }
        }
    }

    /// Run one command line. Blank lines and `clear` are handled locally;
    /// anything else is split on whitespace and spawned in the sandbox,
    /// with output streamed to the surface until exit or kill.
    pub async fn execute(&mut self, command: &str) {
        let trimmed = command.trim();
        if !trimmed.is_empty() && self.history.last().map(String::as_str) != Some(trimmed) {
            self.history.push(trimmed.to_string());
        }
        self.history_cursor = None;

        if trimmed.is_empty() {
            self.prompt();
            return;
        }
        if trimmed == "clear" {
            self.write(CLEAR_SCREEN);
            self.write(BANNER);
            self.prompt();
            return;
        }

        let mut parts = trimmed.split_whitespace();
        let program = parts.next().unwrap_or_default();
        let args: Vec<String> = parts.map(str::to_string).collect();

        self.write("\r\n");
        match self.sandbox.spawn(program, &args).await {
            Ok(mut handle) => {
                let token = self.kill.clone();
                loop {
                    tokio::select! {
                        _ = token.cancelled() => {
                            handle.kill();
                            break;
                        }
                        chunk = handle.output.next() => match chunk {
                            Some(Ok(bytes)) => {
                                self.write(String::from_utf8_lossy(&bytes).into_owned());
                            }
                            Some(Err(err)) => {
                                debug!(error = %err, "terminal output stream error");
                            }
                            None => break,
                        },
                    }
                }
                let _ = handle.wait().await;
                if token.is_cancelled() {
                    // Allow the next command after a kill.
                    self.kill = CancellationToken::new();
                }
                self.prompt();
            }
            Err(_) => {
                self.write(format!("\r\nCommand not found: {trimmed}"));
                self.prompt();
            }
        }
    }

    /// Token that stops the currently running (or next) command when
    /// cancelled; output delivery ends and a fresh prompt is written.
    pub fn kill_token(&self) -> CancellationToken {
        self.kill.clone()
    }

    /// Most recent command, for history recall.
    pub fn last_command(&self) -> Option<&str> {
        self.history.last().map(String::as_str)
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Step back through history, replacing the input line.
    pub fn history_prev(&mut self) -> Option<&str> {
        if self.history.is_empty() {
            return None;
        }
        let next = match self.history_cursor {
            None => self.history.len() - 1,
            Some(0) => 0,
            Some(index) => index - 1,
        };
        self.history_cursor = Some(next);
        self.line = self.history[next].clone();
        Some(&self.history[next])
    }

    /// Step forward again; walking past the newest entry clears the line.
    pub fn history_next(&mut self) -> Option<&str> {
        match self.history_cursor {
            Some(index) if index + 1 < self.history.len() => {
                self.history_cursor = Some(index + 1);
                self.line = self.history[index + 1].clone();
                Some(&self.history[index + 1])
            }
            Some(_) => {
                self.history_cursor = None;
                self.line.clear();
                None
            }
            None => None,
        }
    }

    pub fn current_line(&self) -> &str {
        &self.line
    }

    fn prompt(&mut self) {
        self.write(PROMPT);
        self.line.clear();
    }

    fn write(&self, text: impl Into<String>) {
        let _ = self.surface.send(text.into());
    }
}
