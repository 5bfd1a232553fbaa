//! Structured-generation capability.
//!
//! The pipeline only depends on [`StructuredGenerator`]; [`GenerativeClient`]
//! is the OpenAI-compatible HTTP implementation used in production.

mod client;
mod models;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use client::GenerativeClient;

/// One structured-generation call: fixed instruction, user text and the JSON
/// schema the answer must follow.
#[derive(Debug, Clone, Copy)]
pub struct StructuredRequest<'a> {
    pub system: &'a str,
    pub user: &'a str,
    pub schema_name: &'a str,
    pub schema: &'a Value,
}

/// Transport-level failures of the generative service.
///
/// Anything that prevents the service from handing back text ends up here;
/// text that comes back but does not match the schema is the caller's concern.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("request timeout")]
    Timeout,

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited")]
    RateLimited,

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait StructuredGenerator: Send + Sync {
    /// Model identifier, for logging.
    fn model(&self) -> &str;

    /// Returns the raw text produced for `request`. No retry is attempted.
    async fn generate(&self, request: &StructuredRequest<'_>) -> Result<String, LlmError>;
}
