use super::{ChatChunk, ChatRequest, ChatStream, Provider};
use anyhow::{anyhow, Context};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/";

/// Gemini over the Generative Language REST API, authenticated with an API key.
#[derive(Debug, Clone)]
pub struct GoogleProvider {
    http: reqwest::Client,
    api_key: String,
    api_base: Url,
}

impl GoogleProvider {
    pub fn new(http: reqwest::Client, api_key: String, api_base: Option<&str>) -> anyhow::Result<Self> {
        let base = api_base.unwrap_or(DEFAULT_API_BASE);
        let mut api_base = Url::parse(base).with_context(|| format!("invalid Gemini api_base: {base}"))?;
        // Url::join drops the last segment unless the base ends with a slash.
        if !api_base.path().ends_with('/') {
            let path = format!("{}/", api_base.path());
            api_base.set_path(&path);
        }
        Ok(Self { http, api_key, api_base })
    }

    fn build_url(&self, model: &str) -> anyhow::Result<Url> {
        // Docs: https://ai.google.dev/api/rest/v1beta/models/streamGenerateContent
        let mut url = self
            .api_base
            .join(&format!("v1beta/models/{model}:streamGenerateContent"))?;
        url.query_pairs_mut()
            .append_pair("key", &self.api_key)
            .append_pair("alt", "sse");
        Ok(url)
    }

    fn headers() -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        h
    }
}

impl Provider for GoogleProvider {
    fn name(&self) -> &'static str {
        "google"
    }

    fn stream_chat(
        &self,
        req: ChatRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ChatStream>> + Send>> {
        let this = self.clone();

        Box::pin(async move {
            let url = this.build_url(&req.model)?;

            let body = StreamGenerateContentRequest {
                contents: vec![Content {
                    role: Some("user".to_string()),
                    parts: vec![Part { text: Some(req.prompt) }],
                }],
            };

            tracing::debug!(model = %req.model, "opening Gemini stream");
            let resp = this
                .http
                .post(url)
                .headers(Self::headers())
                .json(&body)
                .send()
                .await
                .context("failed to start Gemini request")?;

            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                return Err(anyhow!("Gemini API error: HTTP {status}: {text}"));
            }

            let (tx, rx) = mpsc::channel::<anyhow::Result<ChatChunk>>(64);

            tokio::spawn(async move {
                let mut stream = resp.bytes_stream();
                let mut parser = SseParser::default();

                while let Some(item) = stream.next().await {
                    let bytes = match item {
                        Ok(b) => b,
                        Err(e) => {
                            let _ = tx.send(Err(anyhow!(e).context("network stream error"))).await;
                            return;
                        }
                    };

                    if !forward(&tx, parser.push(&bytes)).await {
                        return;
                    }
                }
                if forward(&tx, parser.finish()).await {
                    tracing::debug!("Gemini stream closed");
                }
            });

            Ok(Box::pin(ReceiverStream::new(rx)) as ChatStream)
        })
    }
}

/// Send decoded chunks downstream. False once the stream must stop.
async fn forward(tx: &mpsc::Sender<anyhow::Result<ChatChunk>>, events: Vec<anyhow::Result<String>>) -> bool {
    for data in events {
        match data.and_then(|d| decode_event(&d)) {
            Ok(Some(text)) => {
                if tx.send(Ok(ChatChunk { text })).await.is_err() {
                    return false;
                }
            }
            Ok(None) => {}
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                return false;
            }
        }
    }
    true
}

#[derive(Debug, Clone, Serialize)]
struct StreamGenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Clone, Deserialize)]
struct StreamGenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Clone, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

/// Text carried by one SSE `data:` payload, if any.
fn decode_event(data: &str) -> anyhow::Result<Option<String>> {
    if data.trim().is_empty() {
        return Ok(None);
    }
    let r: StreamGenerateContentResponse =
        serde_json::from_str(data).context("failed to parse SSE JSON")?;
    if let Some(e) = r.error {
        return Err(anyhow!(
            "Gemini API error: {} {}: {}",
            e.code.map(|c| c.to_string()).unwrap_or_default(),
            e.status.unwrap_or_default(),
            e.message
        ));
    }
    Ok(extract_text(&r))
}

fn extract_text(r: &StreamGenerateContentResponse) -> Option<String> {
    // Concatenate all text parts of the first candidate.
    let content = r.candidates.first()?.content.as_ref()?;
    let out: String = content.parts.iter().filter_map(|p| p.text.as_deref()).collect();
    if out.is_empty() { None } else { Some(out) }
}

/// Incremental SSE decoder.
///
/// Buffers bytes until a full line is available, so a network chunk may split
/// a line (or a UTF-8 sequence) anywhere. Yields the joined `data:` payload of
/// each event when the blank line terminating it arrives.
#[derive(Default)]
struct SseParser {
    buf: Vec<u8>,
    cur_data: String,
}

impl SseParser {
    fn push(&mut self, chunk: &[u8]) -> Vec<anyhow::Result<String>> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();

        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            self.line(line, &mut out);
        }

        out
    }

    /// Flush whatever the server sent after its last blank line.
    fn finish(&mut self) -> Vec<anyhow::Result<String>> {
        let mut out = Vec::new();
        let rest = std::mem::take(&mut self.buf);
        if !rest.is_empty() {
            self.line(rest, &mut out);
        }
        self.line(Vec::new(), &mut out);
        out
    }

    fn line(&mut self, mut line: Vec<u8>, out: &mut Vec<anyhow::Result<String>>) {
        if line.last() == Some(&b'\r') {
            line.pop();
        }

        if line.is_empty() {
            if !self.cur_data.is_empty() {
                self.cur_data.pop();
                out.push(Ok(std::mem::take(&mut self.cur_data)));
            }
            return;
        }

        let s = match std::str::from_utf8(&line) {
            Ok(s) => s,
            Err(e) => {
                out.push(Err(anyhow!(e).context("SSE line is not valid UTF-8")));
                return;
            }
        };

        // event:, id:, retry: and comments are irrelevant here.
        if let Some(rest) = s.strip_prefix("data:") {
            let rest = rest.strip_prefix(' ').unwrap_or(rest);
            self.cur_data.push_str(rest);
            self.cur_data.push('\n');
        }
    }
}
