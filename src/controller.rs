use crate::error::GenerateError;
use crate::generator::JobDescriptionGenerator;
use crate::prompt::JobInput;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;

/// Everything the form renders. Only [`Controller`] mutates it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormState {
    pub input: JobInput,
    pub display: String,
    pub error: Option<String>,
    pub loading: bool,
}

impl FormState {
    /// The submit control is enabled only for complete input outside a run.
    pub fn can_submit(&self) -> bool {
        !self.loading && self.input.is_complete()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submitted {
    Started(u64),
    Rejected,
    Busy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEventKind {
    Fragment(String),
    Done,
    Failed(GenerateError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    pub attempt: u64,
    pub kind: StreamEventKind,
}

/// What [`Controller::apply`] did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    Appended(String),
    Finished,
    Failed,
    /// Belonged to an attempt that is no longer current.
    Stale,
}

/// Which form field an edit targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Title,
    Skills,
    Experience,
}

impl Field {
    pub const ALL: [Field; 3] = [Field::Title, Field::Skills, Field::Experience];

    pub fn label(self) -> &'static str {
        match self {
            Field::Title => "Job Title",
            Field::Skills => "Key Skills & Technologies",
            Field::Experience => "Experience Level",
        }
    }

    pub fn placeholder(self) -> &'static str {
        match self {
            Field::Title => "e.g., Senior Frontend Engineer",
            Field::Skills => "e.g., React, TypeScript, Next.js, Tailwind CSS",
            Field::Experience => "e.g., 5+ years of professional experience",
        }
    }
}

/// Drives one generation attempt at a time.
///
/// Each attempt gets a fresh id. Its producer task forwards fragments tagged
/// with that id, and anything tagged with an older id is dropped on arrival.
pub struct Controller {
    generator: JobDescriptionGenerator,
    state: FormState,
    attempt: u64,
    producer: Option<JoinHandle<()>>,
    tx: mpsc::UnboundedSender<StreamEvent>,
    rx: mpsc::UnboundedReceiver<StreamEvent>,
}

impl Controller {
    pub fn new(generator: JobDescriptionGenerator) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            generator,
            state: FormState::default(),
            attempt: 0,
            producer: None,
            tx,
            rx,
        }
    }

    pub fn with_input(mut self, input: JobInput) -> Self {
        self.state.input = input;
        self
    }

    pub fn state(&self) -> &FormState {
        &self.state
    }

    /// Edit a field. Ignored while a run is in progress.
    pub fn field_mut(&mut self, field: Field) -> Option<&mut String> {
        if self.state.loading {
            return None;
        }
        Some(match field {
            Field::Title => &mut self.state.input.title,
            Field::Skills => &mut self.state.input.skills,
            Field::Experience => &mut self.state.input.experience,
        })
    }

    pub fn submit(&mut self) -> Submitted {
        if self.state.loading {
            tracing::debug!(attempt = self.attempt, "submit ignored while generating");
            return Submitted::Busy;
        }
        if !self.state.input.is_complete() {
            self.state.error = Some(GenerateError::Validation.to_string());
            return Submitted::Rejected;
        }

        self.attempt += 1;
        let attempt = self.attempt;

        self.state.error = None;
        self.state.display.clear();
        self.state.loading = true;

        let generator = self.generator.clone();
        let input = self.state.input.clone();
        let tx = self.tx.clone();

        self.producer = Some(tokio::spawn(async move {
            let mut fragments = generator.stream(&input).await;
            while let Some(item) = fragments.next().await {
                let kind = match item {
                    Ok(text) => StreamEventKind::Fragment(text),
                    Err(e) => {
                        let _ = tx.send(StreamEvent { attempt, kind: StreamEventKind::Failed(e) });
                        return;
                    }
                };
                if tx.send(StreamEvent { attempt, kind }).is_err() {
                    return;
                }
            }
            let _ = tx.send(StreamEvent { attempt, kind: StreamEventKind::Done });
        }));

        tracing::debug!(attempt, "generation started");
        Submitted::Started(attempt)
    }

    /// Wait for the next event from any producer.
    ///
    /// Pending forever when nothing is running, which keeps it usable as a
    /// `select!` branch.
    pub async fn next_event(&mut self) -> StreamEvent {
        match self.rx.recv().await {
            Some(ev) => ev,
            // The controller holds a sender, so the channel never closes.
            None => std::future::pending().await,
        }
    }

    pub fn apply(&mut self, ev: StreamEvent) -> Update {
        if ev.attempt != self.attempt || !self.state.loading {
            tracing::debug!(attempt = ev.attempt, current = self.attempt, "dropping stale stream event");
            return Update::Stale;
        }

        match ev.kind {
            StreamEventKind::Fragment(text) => {
                self.state.display.push_str(&text);
                Update::Appended(text)
            }
            StreamEventKind::Done => {
                self.state.loading = false;
                self.producer = None;
                tracing::info!(attempt = ev.attempt, chars = self.state.display.chars().count(), "generation finished");
                Update::Finished
            }
            StreamEventKind::Failed(e) => {
                // A half-written description must not read as a finished one.
                self.state.display.clear();
                self.state.error = Some(e.to_string());
                self.state.loading = false;
                self.producer = None;
                Update::Failed
            }
        }
    }

    /// Drive the current attempt to its end, reporting each applied update.
    pub async fn run_to_end(&mut self, mut on_update: impl FnMut(&Update)) {
        while self.state.loading {
            let ev = self.next_event().await;
            let update = self.apply(ev);
            on_update(&update);
        }
    }

}

impl Drop for Controller {
    fn drop(&mut self) {
        if let Some(handle) = self.producer.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::stub::StubProvider;
    use std::sync::Arc;
    use std::time::Duration;

    fn controller(stub: &StubProvider) -> Controller {
        Controller::new(JobDescriptionGenerator::new(Arc::new(stub.clone()), "test-model"))
    }

    fn backend_engineer() -> JobInput {
        JobInput::new("Backend Engineer", "Go, Postgres", "3+ years")
    }

    #[tokio::test]
    async fn three_fragment_scenario_concatenates_exactly() {
        let fragments = ["# Intro\n", "## Responsibilities\n- Build\n", "## Qualifications\n- Go"];
        let stub = StubProvider::scripted(fragments);
        let mut c = controller(&stub).with_input(backend_engineer());

        assert_eq!(c.submit(), Submitted::Started(1));
        assert!(c.state().loading);

        let mut appended = Vec::new();
        c.run_to_end(|u| {
            if let Update::Appended(t) = u {
                appended.push(t.clone());
            }
        })
        .await;

        assert_eq!(appended, fragments);
        let s = c.state();
        assert_eq!(s.display, fragments.concat());
        assert_eq!(s.error, None);
        assert!(!s.loading);
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn empty_field_is_rejected_without_backend_call() {
        for input in [
            JobInput::new("", "Go", "3+ years"),
            JobInput::new("Backend Engineer", "", "3+ years"),
            JobInput::new("Backend Engineer", "Go", " "),
        ] {
            let stub = StubProvider::scripted(["never"]);
            let mut c = controller(&stub).with_input(input.clone());

            assert_eq!(c.submit(), Submitted::Rejected);
            assert_eq!(c.state().error.as_deref(), Some("Please fill out all fields."));
            assert!(!c.state().loading);
            assert_eq!(c.state().input, input);

            tokio::task::yield_now().await;
            assert_eq!(stub.calls(), 0);
        }
    }

    #[tokio::test]
    async fn rejection_keeps_previous_output() {
        let stub = StubProvider::scripted(["done"]);
        let mut c = controller(&stub).with_input(backend_engineer());
        c.submit();
        c.run_to_end(|_| {}).await;

        c.field_mut(Field::Skills).unwrap().clear();
        assert_eq!(c.submit(), Submitted::Rejected);
        assert_eq!(c.state().display, "done");
    }

    #[tokio::test]
    async fn submit_is_disabled_while_loading() {
        let stub = StubProvider::scripted(["a", "b"]).with_delay(Duration::from_millis(20));
        let mut c = controller(&stub).with_input(backend_engineer());

        assert!(c.state().can_submit());
        c.submit();
        assert!(!c.state().can_submit());
        assert_eq!(c.submit(), Submitted::Busy);
        assert!(c.field_mut(Field::Title).is_none());

        c.run_to_end(|_| {}).await;
        assert!(c.state().can_submit());
        assert_eq!(c.state().display, "ab");
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn failure_clears_partial_output_and_loading() {
        let stub = StubProvider::scripted(["## Intro\n", "We are"]).failing_after("socket closed");
        let mut c = controller(&stub).with_input(backend_engineer());
        c.submit();

        let mut last = None;
        c.run_to_end(|u| last = Some(u.clone())).await;

        assert_eq!(last, Some(Update::Failed));
        let s = c.state();
        assert!(!s.loading);
        assert_eq!(s.display, "");
        assert_eq!(
            s.error.as_deref(),
            Some("Failed to communicate with the AI model. Please check your connection and API key.")
        );
    }

    #[tokio::test]
    async fn new_submission_resets_error_and_display() {
        let stub = StubProvider::rejecting("offline");
        let mut c = controller(&stub).with_input(backend_engineer());
        c.submit();
        c.run_to_end(|_| {}).await;
        assert!(c.state().error.is_some());

        c.generator = JobDescriptionGenerator::new(Arc::new(StubProvider::scripted(["ok"])), "m");
        assert_eq!(c.submit(), Submitted::Started(2));
        assert_eq!(c.state().error, None);
        assert_eq!(c.state().display, "");
        c.run_to_end(|_| {}).await;
        assert_eq!(c.state().display, "ok");
    }

    #[tokio::test]
    async fn late_events_from_a_finished_attempt_are_dropped() {
        let stub = StubProvider::scripted(["first"]);
        let mut c = controller(&stub).with_input(backend_engineer());
        assert_eq!(c.submit(), Submitted::Started(1));
        c.run_to_end(|_| {}).await;

        c.generator = JobDescriptionGenerator::new(
            Arc::new(StubProvider::scripted(["second"]).with_delay(Duration::from_millis(20))),
            "m",
        );
        assert_eq!(c.submit(), Submitted::Started(2));

        let late = StreamEvent {
            attempt: 1,
            kind: StreamEventKind::Fragment("late".into()),
        };
        assert_eq!(c.apply(late), Update::Stale);
        let late_done = StreamEvent { attempt: 1, kind: StreamEventKind::Done };
        assert_eq!(c.apply(late_done), Update::Stale);
        assert!(c.state().loading);

        c.run_to_end(|_| {}).await;
        assert_eq!(c.state().display, "second");

        let after = StreamEvent {
            attempt: 2,
            kind: StreamEventKind::Fragment("after".into()),
        };
        assert_eq!(c.apply(after), Update::Stale);
        assert_eq!(c.state().display, "second");
    }

    #[tokio::test]
    async fn dropping_the_controller_stops_its_stream() {
        let fragments: Vec<String> = (0..20).map(|i| format!("f{i} ")).collect();
        let stub = StubProvider::scripted(fragments).with_delay(Duration::from_millis(20));
        let mut c = controller(&stub).with_input(backend_engineer());
        c.submit();

        let ev = c.next_event().await;
        assert_eq!(c.apply(ev), Update::Appended("f0 ".into()));
        drop(c);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(stub.abandoned());
        assert!(stub.sent() < 5, "stream kept running: {} fragments sent", stub.sent());
    }
}
