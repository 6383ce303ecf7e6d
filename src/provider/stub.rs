use super::{ChatChunk, ChatRequest, ChatStream, Provider};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Offline provider.
///
/// By default it drips a canned job description assembled from the prompt's
/// details. Tests script it with exact fragments and an optional failure.
#[derive(Debug, Clone, Default)]
pub struct StubProvider {
    script: Option<Script>,
    delay: Duration,
    calls: Arc<AtomicUsize>,
    sent: Arc<AtomicUsize>,
    abandoned: Arc<AtomicBool>,
}

#[derive(Debug, Clone)]
struct Script {
    fragments: Vec<String>,
    failure: Option<Failure>,
}

#[derive(Debug, Clone)]
enum Failure {
    /// Rejected before any fragment is produced.
    OnStart(String),
    /// Fails after every scripted fragment was sent.
    AfterFragments(String),
}

impl StubProvider {
    pub fn new() -> Self {
        Self::default().with_delay(Duration::from_millis(40))
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn scripted<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Some(Script {
                fragments: fragments.into_iter().map(Into::into).collect(),
                failure: None,
            }),
            ..Self::default()
        }
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn rejecting(reason: impl Into<String>) -> Self {
        let mut p = Self::scripted(Vec::<String>::new());
        if let Some(s) = p.script.as_mut() {
            s.failure = Some(Failure::OnStart(reason.into()));
        }
        p
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn failing_after(mut self, reason: impl Into<String>) -> Self {
        let script = self.script.get_or_insert_with(|| Script {
            fragments: Vec::new(),
            failure: None,
        });
        script.failure = Some(Failure::AfterFragments(reason.into()));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of `stream_chat` calls made so far, shared across clones.
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Fragments accepted by the consumer so far.
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }

    /// True once a send found the consumer gone.
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn abandoned(&self) -> bool {
        self.abandoned.load(Ordering::SeqCst)
    }
}

impl Provider for StubProvider {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn stream_chat(
        &self,
        req: ChatRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ChatStream>> + Send>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let this = self.clone();

        Box::pin(async move {
            let (fragments, failure) = match this.script {
                Some(Script { fragments, failure }) => (fragments, failure),
                None => (canned_description(&req.prompt), None),
            };

            if let Some(Failure::OnStart(reason)) = &failure {
                anyhow::bail!("stub provider rejected request: {reason}");
            }

            let (tx, rx) = mpsc::channel::<anyhow::Result<ChatChunk>>(32);
            let delay = this.delay;
            let (sent, abandoned) = (this.sent.clone(), this.abandoned.clone());

            tokio::spawn(async move {
                for text in fragments {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    if tx.send(Ok(ChatChunk { text })).await.is_err() {
                        abandoned.store(true, Ordering::SeqCst);
                        return;
                    }
                    sent.fetch_add(1, Ordering::SeqCst);
                }
                if let Some(Failure::AfterFragments(reason)) = failure {
                    let _ = tx.send(Err(anyhow::anyhow!("stub stream broke: {reason}"))).await;
                }
            });

            Ok(Box::pin(ReceiverStream::new(rx)) as ChatStream)
        })
    }
}

/// Pulls the `- **Label:** value` detail lines back out of a generated prompt.
fn detail(prompt: &str, label: &str) -> String {
    let marker = format!("**{label}:**");
    prompt
        .lines()
        .find_map(|l| l.split_once(&marker).map(|(_, v)| v.trim().to_string()))
        .unwrap_or_default()
}

fn canned_description(prompt: &str) -> Vec<String> {
    let title = detail(prompt, "Job Title");
    let skills = detail(prompt, "Key Skills & Technologies");
    let experience = detail(prompt, "Required Experience");

    let doc = format!(
        "## Introduction\n\nWe're hiring a **{title}** to help us build what comes next.\n\n\
         ## Key Responsibilities\n\n- Design, build and ship features end to end\n\
         - Review code and mentor teammates\n- Work closely with product and design\n\n\
         ## Qualifications & Skills\n\n- {experience}\n- Hands-on with {skills}\n\
         - Clear written communication\n\n\
         ## Why Join Us?\n\nSmall teams, real ownership, and time to do things properly.\n"
    );

    // Fixed-width pieces so boundaries fall mid-word, like a real stream.
    let chars: Vec<char> = doc.chars().collect();
    chars.chunks(24).map(|c| c.iter().collect()).collect()
}
