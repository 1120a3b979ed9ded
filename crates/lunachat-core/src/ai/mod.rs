pub mod groq;
pub mod sse;

pub use groq::GroqClient;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::InferenceError;
use crate::state::ChatMessage;

/// One incremental piece of a streamed completion
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    Text(String),
    /// A chunk whose content was not plain text
    Structured(serde_json::Value),
}

impl Fragment {
    pub fn text(s: impl Into<String>) -> Self {
        Fragment::Text(s.into())
    }
}

/// Lazy, finite, non-restartable sequence of fragments
pub type FragmentStream = BoxStream<'static, Result<Fragment, InferenceError>>;

/// Everything the inference API needs for one completion
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
}

#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Open a streaming completion. Errors before the first fragment come back
    /// here; errors after that come through the stream.
    async fn stream_completion(
        &self,
        request: &CompletionRequest,
    ) -> Result<FragmentStream, InferenceError>;
}
