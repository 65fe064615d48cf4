//! Generative model abstraction.
//!
//! An [`AnswerModel`] produces text either in one piece
//! ([`generate`](AnswerModel::generate)) or as a [`TextStream`] of
//! increments ([`stream`](AnswerModel::stream)). Citation markers can span
//! increment boundaries, so anything parsing the output must wait for the
//! complete text.

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};

/// A stream of generated text increments.
pub type TextStream = BoxStream<'static, Result<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// One generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// System directive constraining the model.
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A generative language model.
#[async_trait]
pub trait AnswerModel: Send + Sync {
    /// Returns the model identifier (e.g. `"gpt-4o"`).
    fn model_name(&self) -> &str;

    /// Generate the complete response text.
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;

    /// Generate the response as a stream of increments.
    ///
    /// The default yields the whole [`generate`](AnswerModel::generate)
    /// output as a single increment.
    async fn stream(&self, request: &GenerationRequest) -> Result<TextStream> {
        let text = self.generate(request).await?;
        Ok(stream::once(async move { Ok(text) }).boxed())
    }
}

/// Drain a [`TextStream`] into one string, stopping at the first error.
pub async fn collect_text(mut stream: TextStream) -> Result<String> {
    let mut text = String::new();
    while let Some(piece) = stream.next().await {
        text.push_str(&piece?);
    }
    Ok(text)
}
