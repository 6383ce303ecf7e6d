use futures_core::stream::BoxStream;
use std::future::Future;
use std::pin::Pin;

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub prompt: String,
}

#[derive(Debug, Clone)]
pub struct ChatChunk {
    pub text: String,
}

/// Incremental response text. Ends after the last chunk or after the first `Err`.
pub type ChatStream = BoxStream<'static, anyhow::Result<ChatChunk>>;

/// A text-generation backend that streams its output.
pub trait Provider {
    fn name(&self) -> &'static str;

    /// Start streaming a response.
    ///
    /// Fails before any chunk when the request cannot be sent or is rejected.
    fn stream_chat(
        &self,
        req: ChatRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ChatStream>> + Send>>;
}
