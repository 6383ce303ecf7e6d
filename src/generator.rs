use crate::error::GenerateError;
use crate::prompt::{build_prompt, JobInput};
use crate::provider::{ChatRequest, Provider};
use futures_core::stream::BoxStream;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

pub const DEFAULT_MODEL: &str = "gemini-flash-lite-latest";

/// Fragments of one job description, in arrival order.
///
/// Finite and not restartable. A failure is the last item.
pub type Fragments = BoxStream<'static, Result<String, GenerateError>>;

/// Turns form input into a streamed job description.
#[derive(Clone)]
pub struct JobDescriptionGenerator {
    provider: Arc<dyn Provider + Send + Sync>,
    model: String,
}

impl JobDescriptionGenerator {
    pub fn new(provider: Arc<dyn Provider + Send + Sync>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Open one streaming call for `input`.
    ///
    /// Never retries. Any provider error, whether on connect or mid-stream,
    /// is logged and replaced by a single [`GenerateError::Backend`].
    pub async fn stream(&self, input: &JobInput) -> Fragments {
        if !input.is_complete() {
            return Box::pin(tokio_stream::once(Err(GenerateError::Validation)));
        }

        let req = ChatRequest {
            model: self.model.clone(),
            prompt: build_prompt(input),
        };

        tracing::info!(provider = self.provider.name(), model = %self.model, "generating job description");
        let mut inner = match self.provider.stream_chat(req).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("error generating job description: {e:#}");
                return Box::pin(tokio_stream::once(Err(GenerateError::Backend)));
            }
        };

        let (tx, rx) = mpsc::channel::<Result<String, GenerateError>>(64);
        tokio::spawn(async move {
            while let Some(item) = inner.next().await {
                match item {
                    Ok(chunk) if chunk.text.is_empty() => {}
                    Ok(chunk) => {
                        if tx.send(Ok(chunk.text)).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        tracing::error!("job description stream failed: {e:#}");
                        let _ = tx.send(Err(GenerateError::Backend)).await;
                        return;
                    }
                }
            }
        });

        Box::pin(ReceiverStream::new(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::stub::StubProvider;

    fn input() -> JobInput {
        JobInput::new("Backend Engineer", "Go, Postgres", "3+ years")
    }

    async fn collect(mut s: Fragments) -> Vec<Result<String, GenerateError>> {
        let mut out = Vec::new();
        while let Some(item) = s.next().await {
            out.push(item);
        }
        out
    }

    #[tokio::test]
    async fn forwards_fragments_in_order_and_drops_empty_ones() {
        let stub = StubProvider::scripted(["# Intro\n", "", "## Responsibilities\n- Build\n"]);
        let g = JobDescriptionGenerator::new(Arc::new(stub), DEFAULT_MODEL);

        let items = collect(g.stream(&input()).await).await;
        assert_eq!(
            items,
            vec![Ok("# Intro\n".to_string()), Ok("## Responsibilities\n- Build\n".to_string())]
        );
    }

    #[tokio::test]
    async fn mid_stream_error_becomes_one_backend_failure() {
        let stub = StubProvider::scripted(["partial"]).failing_after("connection reset by peer");
        let g = JobDescriptionGenerator::new(Arc::new(stub), DEFAULT_MODEL);

        let items = collect(g.stream(&input()).await).await;
        assert_eq!(items, vec![Ok("partial".to_string()), Err(GenerateError::Backend)]);
    }

    #[tokio::test]
    async fn rejected_request_yields_generic_failure() {
        let g = JobDescriptionGenerator::new(Arc::new(StubProvider::rejecting("HTTP 403: API key invalid")), "m");

        let items = collect(g.stream(&input()).await).await;
        assert_eq!(items, vec![Err(GenerateError::Backend)]);
        let msg = GenerateError::Backend.to_string();
        assert!(!msg.contains("403"));
    }

    #[tokio::test]
    async fn incomplete_input_never_reaches_provider() {
        let stub = StubProvider::scripted(["x"]);
        let g = JobDescriptionGenerator::new(Arc::new(stub.clone()), "m");

        let items = collect(g.stream(&JobInput::new("Title", "", "1 year")).await).await;
        assert_eq!(items, vec![Err(GenerateError::Validation)]);
        assert_eq!(stub.calls(), 0);
    }
}
