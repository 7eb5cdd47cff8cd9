// Test doubles for the Moderator / Generator capabilities

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::models::ModerationVerdict;
use crate::services::capabilities::{Completion, CompletionRequest, Generator, Moderator};
use crate::services::errors::{GuardError, GuardResult};

/// Replays a fixed list of answers and records every request it saw.
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<GuardResult<Completion>>>,
    seen: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedGenerator {
    pub fn new(script: Vec<GuardResult<Completion>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Ok(Completion::Text(t.to_string()))).collect())
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.seen.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn complete(&self, request: &CompletionRequest) -> GuardResult<Completion> {
        self.seen.lock().unwrap().push(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GuardError::service("script exhausted")))
    }
}

/// Answers through a closure; safe to share across concurrent calls.
pub struct FnGenerator<F> {
    answer: F,
}

impl<F> FnGenerator<F>
where
    F: Fn(&CompletionRequest) -> GuardResult<Completion> + Send + Sync,
{
    pub fn new(answer: F) -> Self {
        Self { answer }
    }
}

#[async_trait]
impl<F> Generator for FnGenerator<F>
where
    F: Fn(&CompletionRequest) -> GuardResult<Completion> + Send + Sync,
{
    async fn complete(&self, request: &CompletionRequest) -> GuardResult<Completion> {
        tokio::task::yield_now().await;
        (self.answer)(request)
    }
}

/// Moderator whose verdict is derived from the text.
pub struct FnModerator<F> {
    verdict: F,
}

impl<F> FnModerator<F>
where
    F: Fn(&str) -> GuardResult<ModerationVerdict> + Send + Sync,
{
    pub fn new(verdict: F) -> Self {
        Self { verdict }
    }
}

#[async_trait]
impl<F> Moderator for FnModerator<F>
where
    F: Fn(&str) -> GuardResult<ModerationVerdict> + Send + Sync,
{
    async fn moderate(&self, text: &str) -> GuardResult<ModerationVerdict> {
        tokio::task::yield_now().await;
        (self.verdict)(text)
    }
}

pub fn unflagged() -> GuardResult<ModerationVerdict> {
    Ok(ModerationVerdict::default())
}
