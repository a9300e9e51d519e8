//! Interactive questions asked during `invite` and `join`.
//!
//! Prompts are a seam so that batch runs and tests never touch the
//! terminal.

use crate::error::{InviteResult, IoContext};
use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdin};

/// How many answers a prompt loop accepts before giving up.
pub const MAX_PROMPT_ATTEMPTS: usize = 5;

#[async_trait]
pub trait Prompter: Send {
    /// Whether a human can answer
    fn is_interactive(&self) -> bool;

    /// Ask `message`; `None` once input is exhausted
    async fn prompt(&mut self, message: &str) -> InviteResult<Option<String>>;
}

/// Never asks; every prompt behaves like end of input
#[derive(Debug, Default, Clone, Copy)]
pub struct NonInteractive;

#[async_trait]
impl Prompter for NonInteractive {
    fn is_interactive(&self) -> bool {
        false
    }

    async fn prompt(&mut self, _message: &str) -> InviteResult<Option<String>> {
        Ok(None)
    }
}

/// Questions on stderr, answers from stdin
pub struct StdinPrompter {
    input: BufReader<Stdin>,
}

impl StdinPrompter {
    pub fn new() -> Self {
        Self { input: BufReader::new(tokio::io::stdin()) }
    }
}

impl Default for StdinPrompter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Prompter for StdinPrompter {
    fn is_interactive(&self) -> bool {
        true
    }

    async fn prompt(&mut self, message: &str) -> InviteResult<Option<String>> {
        let mut stderr = tokio::io::stderr();
        stderr.write_all(message.as_bytes()).await.context(|| "writing prompt")?;
        stderr.flush().await.context(|| "writing prompt")?;

        let mut line = String::new();
        let n = self.input.read_line(&mut line).await.context(|| "reading stdin")?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(&['\r', '\n'][..]).to_string()))
    }
}

/// Pre-recorded answers, for tests and scripted runs
#[derive(Debug, Default, Clone)]
pub struct ScriptedPrompter {
    answers: VecDeque<String>,
    pub asked: Vec<String>,
}

impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { answers: answers.into_iter().map(Into::into).collect(), asked: Vec::new() }
    }
}

#[async_trait]
impl Prompter for ScriptedPrompter {
    fn is_interactive(&self) -> bool {
        true
    }

    async fn prompt(&mut self, message: &str) -> InviteResult<Option<String>> {
        self.asked.push(message.to_string());
        Ok(self.answers.pop_front())
    }
}
