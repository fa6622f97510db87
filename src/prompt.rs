// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Operator interaction.
//!
//! The engine only asks questions when a record would otherwise end up fully depooled.
//! A cancelled or invalid answer is reported as [`PromptError::Cancelled`] so callers
//! can leave the record untouched instead of guessing.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::warn;

use crate::constants::PROMPT_MAX_TRIES;
use crate::dns_errors::PromptError;

/// Asks the operator to choose among options.
#[async_trait]
pub trait OperatorPrompt: Send + Sync {
    /// Ask `message` and return one of `options`.
    ///
    /// # Errors
    ///
    /// Returns [`PromptError::Cancelled`] if no valid choice was made.
    async fn ask_choice(&self, message: &str, options: &[String]) -> Result<String, PromptError>;

    /// Ask a yes/no question. Anything but `yes` counts as no.
    async fn confirm(&self, message: &str) -> bool {
        let options = ["yes".to_string(), "no".to_string()];
        matches!(self.ask_choice(message, &options).await.as_deref(), Ok("yes"))
    }
}

/// Prompt reading numbered or literal answers from the terminal.
pub struct TerminalPrompt {
    stdin: Mutex<BufReader<tokio::io::Stdin>>,
    max_tries: u32,
}

impl Default for TerminalPrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalPrompt {
    #[must_use]
    pub fn new() -> Self {
        Self {
            stdin: Mutex::new(BufReader::new(tokio::io::stdin())),
            max_tries: PROMPT_MAX_TRIES,
        }
    }
}

#[async_trait]
impl OperatorPrompt for TerminalPrompt {
    async fn ask_choice(&self, message: &str, options: &[String]) -> Result<String, PromptError> {
        let io_error = |e: std::io::Error| PromptError::Io {
            reason: e.to_string(),
        };
        let mut stdout = tokio::io::stdout();
        let mut stdin = self.stdin.lock().await;

        for _ in 0..self.max_tries {
            let mut text = format!("{message}\n");
            for (i, option) in options.iter().enumerate() {
                text.push_str(&format!("  {}) {option}\n", i + 1));
            }
            text.push_str("> ");
            stdout.write_all(text.as_bytes()).await.map_err(io_error)?;
            stdout.flush().await.map_err(io_error)?;

            let mut line = String::new();
            if stdin.read_line(&mut line).await.map_err(io_error)? == 0 {
                return Err(PromptError::Cancelled {
                    message: message.to_string(),
                });
            }
            if let Some(choice) = parse_choice(&line, options) {
                return Ok(choice);
            }
            warn!(answer = %line.trim(), "Invalid answer");
        }

        warn!(tries = self.max_tries, "Giving up on the question");
        Err(PromptError::Cancelled {
            message: message.to_string(),
        })
    }
}

/// Match an answer by its 1-based number or its literal text.
pub(crate) fn parse_choice(answer: &str, options: &[String]) -> Option<String> {
    let answer = answer.trim();
    if answer.is_empty() {
        return None;
    }
    if let Ok(n) = answer.parse::<usize>() {
        return n.checked_sub(1).and_then(|i| options.get(i)).cloned();
    }
    options.iter().find(|o| o.as_str() == answer).cloned()
}

/// Prompt that always gives the same answer, for unattended runs.
///
/// If the preset answer isn't among the options the question is cancelled, which
/// leaves the record untouched.
#[derive(Debug, Clone)]
pub struct FixedPrompt {
    answer: String,
}

impl Default for FixedPrompt {
    fn default() -> Self {
        Self::new("skip")
    }
}

impl FixedPrompt {
    #[must_use]
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
        }
    }
}

#[async_trait]
impl OperatorPrompt for FixedPrompt {
    async fn ask_choice(&self, message: &str, options: &[String]) -> Result<String, PromptError> {
        if options.contains(&self.answer) {
            warn!(question = %message, answer = %self.answer, "Answering automatically");
            Ok(self.answer.clone())
        } else {
            warn!(question = %message, answer = %self.answer, "Preset answer is not an option");
            Err(PromptError::Cancelled {
                message: message.to_string(),
            })
        }
    }
}

#[cfg(test)]
#[path = "prompt_tests.rs"]
mod prompt_tests;
