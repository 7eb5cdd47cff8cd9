// External Capabilities
// The two provider-facing seams of the pipeline: moderation and text generation

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::errors::GuardResult;
use crate::models::ModerationVerdict;

/// One stateless generation call. No history crosses calls.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f64,
    /// Ask for a JSON object; the generator fails with `MalformedResponse` if it does not parse.
    pub expect_json: bool,
}

impl CompletionRequest {
    pub fn text(system: impl Into<String>, user: impl Into<String>, temperature: f64) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature,
            expect_json: false,
        }
    }

    pub fn structured(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature: 0.0,
            expect_json: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Text(String),
    Structured(Value),
}

impl Completion {
    pub fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Structured(value) => value.to_string(),
        }
    }
}

/// Binary flagged/unflagged moderation signal with per-category passthrough.
#[async_trait]
pub trait Moderator: Send + Sync {
    async fn moderate(&self, text: &str) -> GuardResult<ModerationVerdict>;
}

/// Free-form or structured text generation.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> GuardResult<Completion>;
}
