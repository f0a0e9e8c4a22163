pub mod gemini;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde_json::Value;
use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

/// Incremental text fragments from a streaming generation.
pub type TextStream = BoxStream<'static, ModelResult<String>>;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model request failed: {0}")]
    Request(String),
    #[error("model provider returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("model response contained no text")]
    EmptyResponse,
    #[error("failed to decode model response: {0}")]
    ResponseParsing(String),
}

/// The generative-model provider, reduced to the three invocation shapes the
/// application needs. Held as a trait object in `AppState` so tests can
/// substitute a scripted double.
#[async_trait]
pub trait GenerativeModel: Send + Sync + 'static {
    /// One-shot grounded generation: full answer text, atomically.
    async fn generate(&self, system: &str, prompt: &str) -> ModelResult<String>;

    /// Streaming variant of [`generate`](Self::generate); yields text
    /// fragments in emission order.
    async fn generate_stream(&self, system: &str, prompt: &str) -> ModelResult<TextStream>;

    /// Schema-constrained generation. Returns the raw JSON text produced by
    /// the provider; callers parse it and treat malformed output as a hard
    /// error, never as an empty result.
    async fn generate_structured(
        &self,
        system: &str,
        prompt: &str,
        schema: Value,
    ) -> ModelResult<String>;
}
