//! Pipeline stages, progress percentages and the wire-level progress events.
//!
//! Every analysis walks the same state machine:
//!
//! ```text
//! Started → Parsing → Classifying → SummarizingPages(0..N) → SummarizingGlobal → Completed
//!                                                                 any stage ──▶ Failed
//! ```
//!
//! Each stage maps onto a fixed slice of the 0–100 scale. Pages complete out
//! of order, but the page phase reports the *count* of finished pages, so the
//! overall percentage only ever moves forward.
//!
//! Inject an [`Arc<dyn AnalysisProgressCallback>`] via
//! [`crate::config::AnalysisConfigBuilder::progress_callback`] to observe stage
//! transitions from the eager API; the streaming API turns the same
//! transitions into [`ProgressEvent`]s.

use crate::output::AnalysisResponse;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Start of the page phase on the 0–100 scale.
pub const PAGE_PHASE_START: u8 = 35;
/// End of the page phase on the 0–100 scale.
pub const PAGE_PHASE_END: u8 = 90;

/// One state of the per-request pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Started,
    Parsing,
    Classifying,
    SummarizingPages { done: usize, total: usize },
    SummarizingGlobal,
    Completed,
    Failed,
}

impl Stage {
    /// Overall progress this stage represents.
    pub fn percent(&self) -> u8 {
        match *self {
            Stage::Started => 0,
            Stage::Parsing => 5,
            Stage::Classifying => 25,
            Stage::SummarizingPages { done, total } => page_phase_percent(done, total),
            Stage::SummarizingGlobal => 92,
            Stage::Completed | Stage::Failed => 100,
        }
    }

    /// Human-readable status line.
    pub fn message(&self) -> String {
        match *self {
            Stage::Started => "Upload received".to_string(),
            Stage::Parsing => "Parsing document".to_string(),
            Stage::Classifying => "Classifying pages".to_string(),
            Stage::SummarizingPages { done, total } => {
                format!("Summarized {done}/{total} pages")
            }
            Stage::SummarizingGlobal => "Building global summary".to_string(),
            Stage::Completed => "Analysis complete".to_string(),
            Stage::Failed => "Analysis failed".to_string(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }
}

/// Map `done / total` pages into the page phase slice.
pub fn page_phase_percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return PAGE_PHASE_END;
    }
    let span = (PAGE_PHASE_END - PAGE_PHASE_START) as usize;
    let done = done.min(total);
    PAGE_PHASE_START + (span * done / total) as u8
}

/// Called by the pipeline at every stage transition.
///
/// Implementations must be `Send + Sync`; the pipeline may run on any tokio
/// worker. The default implementation ignores every call.
pub trait AnalysisProgressCallback: Send + Sync {
    fn on_stage(&self, stage: &Stage) {
        let _ = stage;
    }
}

/// A no-op implementation for callers that don't need progress.
pub struct NoopProgressCallback;

impl AnalysisProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AnalysisConfig`].
pub type ProgressCallback = Arc<dyn AnalysisProgressCallback>;

/// One event of the progress stream.
///
/// Serialized as one JSON object per line:
///
/// ```json
/// {"type":"progress","progress":35,"message":"Summarized 0/3 pages"}
/// {"type":"result","progress":100,"message":"Analysis complete","data":{…}}
/// {"type":"error","progress":100,"message":"LLM API error: …"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProgressEvent {
    Progress {
        progress: u8,
        message: String,
    },
    Result {
        progress: u8,
        message: String,
        data: Box<AnalysisResponse>,
    },
    Error {
        progress: u8,
        message: String,
    },
}

impl ProgressEvent {
    pub fn progress(percent: u8, message: impl Into<String>) -> Self {
        ProgressEvent::Progress {
            progress: percent.min(100),
            message: message.into(),
        }
    }

    pub fn result(data: AnalysisResponse) -> Self {
        ProgressEvent::Result {
            progress: 100,
            message: Stage::Completed.message(),
            data: Box::new(data),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ProgressEvent::Error {
            progress: 100,
            message: message.into(),
        }
    }

    pub fn percent(&self) -> u8 {
        match self {
            ProgressEvent::Progress { progress, .. }
            | ProgressEvent::Result { progress, .. }
            | ProgressEvent::Error { progress, .. } => *progress,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ProgressEvent::Progress { message, .. }
            | ProgressEvent::Result { message, .. }
            | ProgressEvent::Error { message, .. } => message,
        }
    }

    /// `result` and `error` end the stream.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProgressEvent::Progress { .. })
    }

    /// Serialize as one NDJSON line, newline included.
    pub fn to_ndjson(&self) -> String {
        match serde_json::to_string(self) {
            Ok(mut line) => {
                line.push('\n');
                line
            }
            // Only reachable if the payload holds a non-serializable value,
            // which the response types rule out. Keep the stream well-formed.
            Err(e) => format!(
                "{{\"type\":\"error\",\"progress\":100,\"message\":{}}}\n",
                serde_json::Value::String(format!("Failed to serialize event: {e}"))
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn stage_percentages_are_monotonic() {
        let total = 7;
        let mut stages = vec![Stage::Started, Stage::Parsing, Stage::Classifying];
        stages.extend((0..=total).map(|done| Stage::SummarizingPages { done, total }));
        stages.push(Stage::SummarizingGlobal);
        stages.push(Stage::Completed);

        let percents: Vec<u8> = stages.iter().map(Stage::percent).collect();
        assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{percents:?}");
        assert_eq!(*percents.last().unwrap(), 100);
    }

    #[test]
    fn page_phase_bounds() {
        assert_eq!(page_phase_percent(0, 10), PAGE_PHASE_START);
        assert_eq!(page_phase_percent(10, 10), PAGE_PHASE_END);
        assert_eq!(page_phase_percent(0, 0), PAGE_PHASE_END);
        assert_eq!(page_phase_percent(99, 3), PAGE_PHASE_END);
    }

    #[test]
    fn progress_event_wire_shape() {
        let line = ProgressEvent::progress(40, "Summarized 1/3 pages").to_ndjson();
        assert!(line.ends_with('\n'));
        let v: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(v["type"], "progress");
        assert_eq!(v["progress"], 40);
        assert_eq!(v["message"], "Summarized 1/3 pages");
    }

    #[test]
    fn error_event_is_terminal_at_100() {
        let e = ProgressEvent::error("boom");
        assert!(e.is_terminal());
        assert_eq!(e.percent(), 100);
        let v: serde_json::Value = serde_json::from_str(e.to_ndjson().trim_end()).unwrap();
        assert_eq!(v["type"], "error");
        assert_eq!(v["progress"], 100);
    }

    #[test]
    fn progress_percent_is_capped() {
        assert_eq!(ProgressEvent::progress(250, "x").percent(), 100);
    }

    struct CountingCallback {
        calls: AtomicUsize,
    }

    impl AnalysisProgressCallback for CountingCallback {
        fn on_stage(&self, _stage: &Stage) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn arc_dyn_callback_receives_stages() {
        let counter = Arc::new(CountingCallback {
            calls: AtomicUsize::new(0),
        });
        let cb: ProgressCallback = counter.clone();
        cb.on_stage(&Stage::Parsing);
        cb.on_stage(&Stage::SummarizingPages { done: 1, total: 2 });
        assert_eq!(counter.calls.load(Ordering::SeqCst), 2);

        NoopProgressCallback.on_stage(&Stage::Completed);
    }
}
