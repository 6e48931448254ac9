//! Streaming analysis API: progress events while the pipeline runs.
//!
//! Each call spawns one background task that runs the same pipeline as
//! [`crate::analyze::analyze`] and pushes [`ProgressEvent`]s into an
//! unbounded channel. The returned [`EventStream`] yields zero or more
//! `progress` events followed by exactly one `result` or `error` event,
//! then ends.
//!
//! The task's reporter owns the sender. Whatever way the task exits
//! (success, error, panic or abort) the reporter is dropped with it and
//! emits the terminal event if none was sent. Dropping the `EventStream`
//! aborts the task, which drops any in-flight LLM calls.

use crate::analyze::{prepare_input, run_pipeline, DocumentInput, PreparedInput};
use crate::config::{AnalysisConfig, LlmSettings};
use crate::engine::SummaryEngine;
use crate::error::DigestError;
use crate::output::AnalysisResponse;
use crate::pipeline::llm::ChatBackend;
use crate::progress::{AnalysisProgressCallback, ProgressCallback, ProgressEvent, Stage};
use futures::stream::StreamExt;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::AbortHandle;
use tokio_stream::Stream;
use tracing::{error, info, warn};

/// Message sent when the task goes away without a terminal event.
const CANCELLED_MESSAGE: &str = "Analysis was cancelled before completion";

enum StreamMessage {
    Event(ProgressEvent),
    End,
}

/// Stream of progress events for one analysis.
///
/// Dropping it cancels the analysis.
pub struct EventStream {
    rx: UnboundedReceiver<StreamMessage>,
    task: AbortHandle,
    finished: bool,
}

impl EventStream {
    /// The same events as NDJSON lines, newline included.
    pub fn ndjson(self) -> impl Stream<Item = String> + Send {
        self.map(|event| event.to_ndjson())
    }

    /// Drain the stream and return the final response or the error message.
    pub async fn into_result(mut self) -> Result<AnalysisResponse, String> {
        let mut last = None;
        while let Some(event) = self.next().await {
            last = Some(event);
        }
        match last {
            Some(ProgressEvent::Result { data, .. }) => Ok(*data),
            Some(ProgressEvent::Error { message, .. }) => Err(message),
            _ => Err(CANCELLED_MESSAGE.to_string()),
        }
    }
}

impl Stream for EventStream {
    type Item = ProgressEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(StreamMessage::Event(event))) => Poll::Ready(Some(event)),
            Poll::Ready(Some(StreamMessage::End)) | Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        if !self.finished {
            self.task.abort();
        }
    }
}

/// Turns stage transitions into events and guarantees the terminal one.
struct StreamReporter {
    tx: UnboundedSender<StreamMessage>,
    high_water: AtomicU8,
    terminated: AtomicBool,
    forward: Option<ProgressCallback>,
}

impl StreamReporter {
    fn new(tx: UnboundedSender<StreamMessage>, forward: Option<ProgressCallback>) -> Self {
        Self {
            tx,
            high_water: AtomicU8::new(0),
            terminated: AtomicBool::new(false),
            forward,
        }
    }

    fn send(&self, event: ProgressEvent) {
        // The receiver may already be gone; nobody is listening then.
        let _ = self.tx.send(StreamMessage::Event(event));
    }

    /// Emit the one terminal event followed by the end marker.
    fn finish(&self, result: Result<AnalysisResponse, DigestError>) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        let (stage, event) = match result {
            Ok(response) => (Stage::Completed, ProgressEvent::result(response)),
            Err(e) => {
                error!("Analysis failed: {}", e);
                (Stage::Failed, ProgressEvent::error(e.to_string()))
            }
        };
        if let Some(ref cb) = self.forward {
            cb.on_stage(&stage);
        }
        self.send(event);
        let _ = self.tx.send(StreamMessage::End);
    }
}

impl AnalysisProgressCallback for StreamReporter {
    fn on_stage(&self, stage: &Stage) {
        if stage.is_terminal() || self.terminated.load(Ordering::SeqCst) {
            return;
        }
        if let Some(ref cb) = self.forward {
            cb.on_stage(stage);
        }
        let percent = stage.percent();
        let clamped = self.high_water.fetch_max(percent, Ordering::SeqCst).max(percent);
        self.send(ProgressEvent::progress(clamped, stage.message()));
    }
}

impl Drop for StreamReporter {
    fn drop(&mut self) {
        if !self.terminated.load(Ordering::SeqCst) {
            warn!("Analysis task ended without a result");
            self.finish(Err(DigestError::Internal(CANCELLED_MESSAGE.to_string())));
        }
    }
}

fn spawn_analysis(input: PreparedInput, engine: SummaryEngine) -> EventStream {
    let (tx, rx) = mpsc::unbounded_channel();
    let reporter = StreamReporter::new(tx, engine.config().progress_callback.clone());

    let handle = tokio::spawn(async move {
        let result = run_pipeline(input, &engine, &reporter).await;
        reporter.finish(result);
    });

    info!("Streaming analysis started");
    EventStream {
        rx,
        task: handle.abort_handle(),
        finished: false,
    }
}

/// Analyze a local document, streaming progress.
///
/// Input and provider configuration errors are returned directly; anything
/// later arrives as the terminal `error` event.
///
/// # Example
/// ```rust,no_run
/// use edgequake_docsum::{analyze_stream, AnalysisConfig, LlmSettings};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let settings = LlmSettings::new(std::env::var("OPENAI_API_KEY")?);
/// let mut lines = analyze_stream("report.pdf", &settings, &AnalysisConfig::default())
///     .await?
///     .ndjson();
/// while let Some(line) = lines.next().await {
///     print!("{line}");
/// }
/// # Ok(())
/// # }
/// ```
pub async fn analyze_stream(
    path: impl AsRef<Path>,
    settings: &LlmSettings,
    config: &AnalysisConfig,
) -> Result<EventStream, DigestError> {
    let input = prepare_input(DocumentInput::Path(path.as_ref().to_path_buf()), config)?;
    let engine = SummaryEngine::from_settings(settings, config.clone())?;
    Ok(spawn_analysis(input, engine))
}

/// Streaming equivalent of [`crate::analyze::analyze_bytes`].
///
/// The staged temp file lives until the background task finishes parsing.
pub async fn analyze_stream_bytes(
    bytes: &[u8],
    filename: &str,
    settings: &LlmSettings,
    config: &AnalysisConfig,
) -> Result<EventStream, DigestError> {
    let input = prepare_input(
        DocumentInput::Upload {
            bytes: bytes.to_vec(),
            filename: filename.to_string(),
        },
        config,
    )?;
    let engine = SummaryEngine::from_settings(settings, config.clone())?;
    Ok(spawn_analysis(input, engine))
}

/// Stream an analysis of any input with an explicit chat backend.
pub async fn analyze_stream_with_backend(
    input: DocumentInput,
    backend: Arc<dyn ChatBackend>,
    config: &AnalysisConfig,
) -> Result<EventStream, DigestError> {
    let input = prepare_input(input, config)?;
    Ok(spawn_analysis(input, SummaryEngine::new(backend, config.clone())))
}
