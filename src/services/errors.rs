// Error Taxonomy
// Failures the moderation pipeline can surface to its caller

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GuardError {
    /// External capability unreachable or rejected the call (transport, auth, quota).
    #[error("service error: {0}")]
    Service(String),
    /// External capability answered with data that breaks the expected contract.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    /// Invalid administrative input (threshold, mode, config file).
    #[error("configuration error: {0}")]
    Configuration(String),
}

pub type GuardResult<T> = Result<T, GuardError>;

impl GuardError {
    pub fn service(msg: impl Into<String>) -> Self {
        Self::Service(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}
