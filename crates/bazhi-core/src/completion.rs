//! Chat-completion capability trait.
//!
//! Every remote model call (both translations, the consultation, the
//! analysis and the extraction) goes through this one seam. The relay
//! client in the interaction crate is the production implementation;
//! tests script the trait directly.

use crate::error::Result;
use crate::session::ChatTurn;
use async_trait::async_trait;

/// One chat-completion request.
///
/// The system prompt is kept apart from the turns so implementations can
/// place it wherever their wire format expects it.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub messages: Vec<ChatTurn>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(
        system_prompt: impl Into<String>,
        messages: Vec<ChatTurn>,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            messages,
            temperature,
            max_tokens,
        }
    }
}

/// An abstract chat-completion backend.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Sends one request and returns the assistant's text.
    ///
    /// # Returns
    ///
    /// - `Ok(String)`: The completion text, non-empty
    /// - `Err(_)`: Transport or backend failure; no retries are attempted
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}
