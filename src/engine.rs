//! The summary engine: page-level and document-level summarization.
//!
//! ## Guarantees
//!
//! * Skip-classified pages never reach the LLM.
//! * Every page result comes back in input order, whatever order the calls
//!   finish in.
//! * Model output of the wrong shape never fails a request. It degrades to
//!   text-derived bullets or placeholders. Transport and provider errors do
//!   fail it, and so does content that is not a JSON object.

use crate::classify::ClassifiedPage;
use crate::config::{AnalysisConfig, LlmSettings};
use crate::error::{DigestError, ShapeError};
use crate::output::{GlobalSummary, GlobalSummaryExpansions, PageSummaryResult};
use crate::pipeline::llm::{resolve_backend, ChatBackend};
use crate::pipeline::postprocess::{
    fallback_bullets, shape_expansion, shape_model_bullets, shape_overview, skip_bullet,
    DEFAULT_SKIP_REASON, MIN_PAGE_BULLETS,
};
use crate::prompts::{self, DEFAULT_SYSTEM_PROMPT, EMPTY_PAGE_POINTS};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Summarizes classified pages and synthesizes the global summary.
///
/// One engine serves one request. It owns nothing but the backend handle
/// and the configuration, so it can be dropped at any point.
pub struct SummaryEngine {
    backend: Arc<dyn ChatBackend>,
    config: AnalysisConfig,
}

impl SummaryEngine {
    pub fn new(backend: Arc<dyn ChatBackend>, config: AnalysisConfig) -> Self {
        Self { backend, config }
    }

    /// Build an engine with a backend resolved from per-request settings.
    pub fn from_settings(settings: &LlmSettings, config: AnalysisConfig) -> Result<Self, DigestError> {
        let backend = resolve_backend(settings, &config)?;
        Ok(Self::new(backend, config))
    }

    /// The system prompt sent with every call.
    pub fn system_prompt(&self) -> &str {
        self.config
            .system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Summarize one page into citation-prefixed bullets.
    ///
    /// Makes zero LLM calls for a skip page and exactly one otherwise.
    pub async fn summarize_page(
        &self,
        page: &ClassifiedPage,
    ) -> Result<PageSummaryResult, DigestError> {
        let band = self.config.page_bullet;

        if page.should_skip() {
            debug!(
                "Page {} skipped as {}",
                page.page_number, page.classification
            );
            return Ok(PageSummaryResult {
                page_number: page.page_number,
                classification: page.classification,
                bullets: vec![skip_bullet(
                    page.page_number,
                    page.skip_reason.as_deref(),
                    band,
                )],
                skipped: true,
                skip_reason: Some(
                    page.skip_reason
                        .clone()
                        .unwrap_or_else(|| DEFAULT_SKIP_REASON.to_string()),
                ),
            });
        }

        let text: String = page.text.chars().take(self.config.page_char_budget).collect();
        let prompt = prompts::page_prompt(page.page_number, page.classification, &text);

        let start = Instant::now();
        let reply = self
            .backend
            .complete_json(self.system_prompt(), &prompt)
            .await?;

        let bullets = match parse_page_reply(&reply) {
            Ok(raw) => {
                let shaped = shape_model_bullets(page.page_number, &raw, band);
                if shaped.len() >= MIN_PAGE_BULLETS {
                    shaped
                } else {
                    warn!(
                        "Page {}: model returned {} usable bullets, using text fallback",
                        page.page_number,
                        shaped.len()
                    );
                    fallback_bullets(page.page_number, &text, band)
                }
            }
            Err(e) => {
                warn!(
                    "Page {}: unexpected reply shape ({}), using text fallback",
                    page.page_number, e
                );
                fallback_bullets(page.page_number, &text, band)
            }
        };

        debug!(
            "Page {} summarized: {} bullets in {:?}",
            page.page_number,
            bullets.len(),
            start.elapsed()
        );

        Ok(PageSummaryResult {
            page_number: page.page_number,
            classification: page.classification,
            bullets,
            skipped: false,
            skip_reason: None,
        })
    }

    /// Summarize every page with bounded concurrency.
    ///
    /// `on_page_done` receives the running count of finished pages: 1, 2, …,
    /// `pages.len()`. The first page error aborts the batch and drops every
    /// call still in flight.
    pub async fn summarize_pages<F>(
        &self,
        pages: &[ClassifiedPage],
        on_page_done: F,
    ) -> Result<Vec<PageSummaryResult>, DigestError>
    where
        F: Fn(usize) + Send + Sync,
    {
        let total = pages.len();
        let concurrency = self.config.concurrency.max(1);
        info!("Summarizing {} pages, concurrency {}", total, concurrency);

        let mut slots: Vec<Option<PageSummaryResult>> = vec![None; total];
        // Collect first: a lazily mapped stream keeps its borrowing closure
        // alive across awaits and the spawned pipeline stops being `Send`.
        let calls: Vec<_> = pages
            .iter()
            .enumerate()
            .map(|(idx, page)| async move { (idx, self.summarize_page(page).await) })
            .collect();
        let mut results = stream::iter(calls).buffer_unordered(concurrency);

        let mut done = 0;
        while let Some((idx, result)) = results.next().await {
            let summary = result.map_err(|e| {
                warn!("Page {} failed: {}", pages[idx].page_number, e);
                e
            })?;
            slots[idx] = Some(summary);
            done += 1;
            on_page_done(done);
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(idx, slot)| {
                slot.ok_or_else(|| {
                    DigestError::Internal(format!("page slot {idx} was never filled"))
                })
            })
            .collect()
    }

    /// Build the document-level summary from all page bullets.
    pub async fn summarize_global(
        &self,
        results: &[PageSummaryResult],
    ) -> Result<GlobalSummary, DigestError> {
        let points: Vec<&str> = results
            .iter()
            .flat_map(|r| r.bullets.iter().map(String::as_str))
            .take(self.config.max_global_input_bullets)
            .collect();
        let joined = if points.is_empty() {
            EMPTY_PAGE_POINTS.to_string()
        } else {
            points.join("\n")
        };
        info!("Building global summary from {} bullets", points.len());

        let reply = self
            .backend
            .complete_json(self.system_prompt(), &prompts::global_prompt(&joined))
            .await?;

        let parsed = parse_global_reply(&reply).unwrap_or_else(|e| {
            warn!("Global summary: unexpected reply shape ({}), using placeholders", e);
            GlobalReply::default()
        });

        let band = self.config.expansion;
        Ok(GlobalSummary {
            bullets: shape_overview(&parsed.overview, self.config.overview_bullet),
            expansions: GlobalSummaryExpansions {
                key_conclusions: shape_expansion(parsed.key_conclusions.as_deref(), band),
                core_data: shape_expansion(parsed.core_data.as_deref(), band),
                risks_and_actions: shape_expansion(parsed.risks_and_actions.as_deref(), band),
            },
        })
    }
}

// ── Reply shapes ─────────────────────────────────────────────────────────

/// `{"overview": [...], "expansions": {...}}` after shape checking.
#[derive(Debug, Default, PartialEq)]
pub struct GlobalReply {
    pub overview: Vec<String>,
    pub key_conclusions: Option<String>,
    pub core_data: Option<String>,
    pub risks_and_actions: Option<String>,
}

/// Extract `bullets` from a page reply.
///
/// Non-string entries are ignored rather than rejected.
pub fn parse_page_reply(reply: &Value) -> Result<Vec<String>, ShapeError> {
    string_array(reply, "bullets")
}

/// Extract overview and expansions from a global reply.
///
/// `overview` is required. A missing `expansions` object, or a missing or
/// non-string field inside it, leaves that field empty.
pub fn parse_global_reply(reply: &Value) -> Result<GlobalReply, ShapeError> {
    let overview = string_array(reply, "overview")?;
    let expansions = match reply.get("expansions") {
        None | Some(Value::Null) => None,
        Some(v @ Value::Object(_)) => Some(v),
        Some(_) => {
            return Err(ShapeError::WrongType {
                field: "expansions",
                expected: "an object",
            })
        }
    };
    let field = |name: &str| {
        expansions
            .and_then(|e| e.get(name))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    Ok(GlobalReply {
        overview,
        key_conclusions: field("key_conclusions"),
        core_data: field("core_data"),
        risks_and_actions: field("risks_and_actions"),
    })
}

fn string_array(reply: &Value, field: &'static str) -> Result<Vec<String>, ShapeError> {
    match reply.get(field) {
        None | Some(Value::Null) => Err(ShapeError::MissingField(field)),
        Some(Value::Array(items)) => Ok(items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()),
        Some(_) => Err(ShapeError::WrongType {
            field,
            expected: "an array of strings",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{classify_page, Classification};
    use crate::pipeline::postprocess::{EXPANSION_PLACEHOLDER, OVERVIEW_PLACEHOLDER};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    type Reply = Box<dyn Fn(&str) -> Result<Value, DigestError> + Send + Sync>;

    /// Backend that answers from a closure and records what it saw.
    struct ScriptedBackend {
        reply: Reply,
        delay: fn(&str) -> Duration,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                delay: |_| Duration::from_millis(1),
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn with_delay(reply: Reply, delay: fn(&str) -> Duration) -> Arc<Self> {
            let mut backend = Self::new(reply);
            Arc::get_mut(&mut backend).unwrap().delay = delay;
            backend
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn complete_json(&self, _system: &str, user: &str) -> Result<Value, DigestError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(user.to_string());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep((self.delay)(user)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            (self.reply)(user)
        }
    }

    fn four_bullets() -> Reply {
        Box::new(|_| {
            Ok(json!({"bullets": [
                "營收年增百分之十二",
                "毛利率下滑兩個百分點",
                "海外市場占比提升",
                "下季需控管庫存水位"
            ]}))
        })
    }

    fn engine(backend: Arc<ScriptedBackend>) -> SummaryEngine {
        SummaryEngine::new(backend, AnalysisConfig::default())
    }

    fn normal_page(n: usize) -> ClassifiedPage {
        classify_page(n, &format!("第{n}頁的營運內容說明\n本季營收與去年同期相比成長"))
    }

    #[tokio::test]
    async fn skip_page_makes_no_call() {
        let backend = ScriptedBackend::new(four_bullets());
        let engine = engine(backend.clone());
        let page = classify_page(2, "---");
        assert_eq!(page.classification, Classification::Blank);

        let result = engine.summarize_page(&page).await.unwrap();
        assert!(result.skipped);
        assert_eq!(result.bullets, vec!["〔p.2〕• 〈本頁跳過（空白/水印）〉"]);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn skip_class_without_reason_still_skips() {
        let backend = ScriptedBackend::new(four_bullets());
        let page = ClassifiedPage {
            page_number: 2,
            text: "甲乙丙丁戊己".into(),
            classification: Classification::Toc,
            skip_reason: None,
        };

        let result = engine(backend.clone()).summarize_page(&page).await.unwrap();
        assert!(result.skipped);
        assert_eq!(result.bullets, vec!["〔p.2〕• 〈本頁跳過〉"]);
        assert_eq!(result.skip_reason.as_deref(), Some(DEFAULT_SKIP_REASON));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn normal_page_gets_cited_model_bullets() {
        let backend = ScriptedBackend::new(four_bullets());
        let result = engine(backend.clone())
            .summarize_page(&normal_page(3))
            .await
            .unwrap();
        assert!(!result.skipped);
        assert_eq!(result.bullets.len(), 4);
        assert_eq!(result.bullets[0], "〔p.3〕• 營收年增百分之十二");
        assert!(result.bullets.iter().all(|b| b.starts_with("〔p.3〕• ")));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn too_few_bullets_fall_back_to_text() {
        let backend = ScriptedBackend::new(Box::new(|_| Ok(json!({"bullets": ["只有一條要點內容"]}))));
        let result = engine(backend).summarize_page(&normal_page(4)).await.unwrap();
        assert!(result.bullets[0].contains("第4頁的營運內容說明"), "{:?}", result.bullets);
    }

    #[tokio::test]
    async fn wrong_shape_falls_back_without_error() {
        let backend = ScriptedBackend::new(Box::new(|_| Ok(json!({"points": 3}))));
        let result = engine(backend).summarize_page(&normal_page(5)).await.unwrap();
        assert!(!result.bullets.is_empty());
        assert!(result.bullets.iter().all(|b| b.starts_with("〔p.5〕• ")));
    }

    #[tokio::test]
    async fn provider_error_propagates() {
        let backend = ScriptedBackend::new(Box::new(|_| {
            Err(DigestError::LlmApiError {
                message: "HTTP 500".into(),
            })
        }));
        let err = engine(backend).summarize_page(&normal_page(1)).await.unwrap_err();
        assert!(matches!(err, DigestError::LlmApiError { .. }));
    }

    #[tokio::test]
    async fn page_text_is_cut_to_budget() {
        let backend = ScriptedBackend::new(four_bullets());
        let config = AnalysisConfig::builder().page_char_budget(10).build().unwrap();
        let engine = SummaryEngine::new(backend.clone(), config);
        let page = classify_page(2, &"營".repeat(50));
        engine.summarize_page(&page).await.unwrap();
        let prompt = backend.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains(&"營".repeat(10)));
        assert!(!prompt.contains(&"營".repeat(11)));
    }

    #[tokio::test]
    async fn pages_keep_input_order_and_counts_increase() {
        // Earlier pages answer slower so completion order is reversed.
        let backend = ScriptedBackend::with_delay(four_bullets(), |prompt| {
            if prompt.contains("第 1 頁") {
                Duration::from_millis(40)
            } else if prompt.contains("第 2 頁") {
                Duration::from_millis(20)
            } else {
                Duration::from_millis(1)
            }
        });
        let engine = engine(backend);
        let pages: Vec<_> = (1..=4).map(normal_page).collect();

        let counts = Mutex::new(Vec::new());
        let results = engine
            .summarize_pages(&pages, |n| counts.lock().unwrap().push(n))
            .await
            .unwrap();

        let numbers: Vec<usize> = results.iter().map(|r| r.page_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        assert_eq!(*counts.lock().unwrap(), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let backend =
            ScriptedBackend::with_delay(four_bullets(), |_| Duration::from_millis(15));
        let config = AnalysisConfig::builder().concurrency(2).build().unwrap();
        let engine = SummaryEngine::new(backend.clone(), config);
        let pages: Vec<_> = (2..=7).map(normal_page).collect();

        engine.summarize_pages(&pages, |_| {}).await.unwrap();
        assert_eq!(backend.calls.load(Ordering::SeqCst), 6);
        assert!(backend.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn first_page_error_aborts_batch() {
        let backend = ScriptedBackend::new(Box::new(|prompt| {
            if prompt.contains("第 3 頁") {
                Err(DigestError::ApiTimeout { elapsed_ms: 5 })
            } else {
                Ok(json!({"bullets": ["甲乙丙丁戊己", "庚辛壬癸子丑", "寅卯辰巳午未"]}))
            }
        }));
        let pages: Vec<_> = (2..=5).map(normal_page).collect();
        let err = engine(backend).summarize_pages(&pages, |_| {}).await.unwrap_err();
        assert!(matches!(err, DigestError::ApiTimeout { .. }));
    }

    #[tokio::test]
    async fn global_overview_is_capped_and_expansions_fitted() {
        let long = "結".repeat(200);
        let backend = ScriptedBackend::new(Box::new(move |_| {
            Ok(json!({
                "overview": (0..10).map(|i| format!("第{i}項全文結論")).collect::<Vec<_>>(),
                "expansions": {
                    "key_conclusions": long,
                    "core_data": "營收成長百分之十二，主要來自海外市場的擴張（p.2-p.4）",
                }
            }))
        }));
        let summary = engine(backend).summarize_global(&[]).await.unwrap();
        assert_eq!(summary.bullets.len(), 7);
        assert_eq!(summary.expansions.key_conclusions.chars().count(), 120);
        assert!(summary.expansions.key_conclusions.ends_with('。'));
        assert!(summary.expansions.core_data.starts_with("營收成長"));
        assert!(summary
            .expansions
            .risks_and_actions
            .starts_with(EXPANSION_PLACEHOLDER));
    }

    #[tokio::test]
    async fn global_overview_is_padded() {
        let backend = ScriptedBackend::new(Box::new(|_| {
            Ok(json!({"overview": ["營收創下歷史新高", "成本結構持續改善"]}))
        }));
        let summary = engine(backend).summarize_global(&[]).await.unwrap();
        assert_eq!(summary.bullets.len(), 5);
        assert_eq!(summary.bullets[4], OVERVIEW_PLACEHOLDER);
    }

    #[tokio::test]
    async fn global_wrong_shape_uses_placeholders() {
        let backend = ScriptedBackend::new(Box::new(|_| Ok(json!({"summary": "x"}))));
        let summary = engine(backend).summarize_global(&[]).await.unwrap();
        assert!(summary.bullets.iter().all(|b| b == OVERVIEW_PLACEHOLDER));
    }

    #[tokio::test]
    async fn global_input_is_capped() {
        let backend = ScriptedBackend::new(Box::new(|_| Ok(json!({"overview": []}))));
        let config = AnalysisConfig::builder()
            .max_global_input_bullets(160)
            .build()
            .unwrap();
        let engine = SummaryEngine::new(backend.clone(), config);
        let results: Vec<PageSummaryResult> = (1..=50)
            .map(|n| PageSummaryResult {
                page_number: n,
                classification: Classification::Normal,
                bullets: (0..4).map(|i| format!("〔p.{n}〕• 要點{i}")).collect(),
                skipped: false,
                skip_reason: None,
            })
            .collect();

        engine.summarize_global(&results).await.unwrap();
        let prompt = backend.prompts.lock().unwrap()[0].clone();
        assert_eq!(prompt.matches("〔p.").count(), 160);
        assert!(prompt.contains("〔p.40〕• 要點3"));
        assert!(!prompt.contains("〔p.41〕"));
    }

    #[tokio::test]
    async fn global_with_no_bullets_uses_placeholder_points() {
        let backend = ScriptedBackend::new(Box::new(|_| Ok(json!({"overview": []}))));
        engine(backend.clone()).summarize_global(&[]).await.unwrap();
        assert!(backend.prompts.lock().unwrap()[0].contains(EMPTY_PAGE_POINTS));
    }

    #[test]
    fn page_reply_shapes() {
        assert_eq!(
            parse_page_reply(&json!({"bullets": ["a", 1, "b"]})).unwrap(),
            vec!["a", "b"]
        );
        assert_eq!(
            parse_page_reply(&json!({})).unwrap_err(),
            ShapeError::MissingField("bullets")
        );
        assert!(matches!(
            parse_page_reply(&json!({"bullets": "a"})).unwrap_err(),
            ShapeError::WrongType { .. }
        ));
    }

    #[test]
    fn global_reply_tolerates_missing_expansions() {
        let reply = parse_global_reply(&json!({"overview": ["x"]})).unwrap();
        assert_eq!(reply.overview, vec!["x"]);
        assert!(reply.core_data.is_none());
    }
}
