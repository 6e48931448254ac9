//! Configuration types for document analysis.
//!
//! Engine behaviour is controlled through [`AnalysisConfig`], built via
//! [`AnalysisConfigBuilder`]. Credentials live apart in [`LlmSettings`]:
//! they are request-scoped, never stored in the config and never logged.

use crate::error::DigestError;
use crate::pipeline::keywords;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Default chat model when the caller does not pick one.
pub const DEFAULT_MODEL: &str = "gpt-5-mini-2025-08-07";

/// Default OpenAI-compatible endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Per-request LLM credentials.
///
/// Constructed for one analysis and dropped with it. The `Debug` impl
/// redacts the key so the struct can sit inside traced spans safely.
#[derive(Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

impl LlmSettings {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
            model: default_model(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let url = base_url.into();
        self.base_url = if url.trim().is_empty() { None } else { Some(url) };
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// The chat-completions endpoint derived from `base_url`.
    pub fn chat_endpoint(&self) -> String {
        let base = self
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/');
        format!("{base}/chat/completions")
    }
}

impl fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmSettings")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

/// Inclusive character-count band a piece of generated text must fit.
///
/// Counts are Unicode scalar values, so one CJK character counts as one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthBand {
    pub min: usize,
    pub max: usize,
}

impl LengthBand {
    pub const fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }
}

/// Configuration for one analysis request.
///
/// # Example
/// ```rust
/// use edgequake_docsum::AnalysisConfig;
///
/// let config = AnalysisConfig::builder()
///     .concurrency(8)
///     .page_char_budget(3000)
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 8);
/// ```
#[derive(Clone)]
pub struct AnalysisConfig {
    /// Maximum number of page summarization calls in flight. Default: 4.
    ///
    /// Upstream rate limits are per key; four parallel calls keep a typical
    /// 30-page deck well under them.
    pub concurrency: usize,

    /// Page text is cut to this many characters before prompting. Default: 4000.
    pub page_char_budget: usize,

    /// Band for each per-page bullet (text after the citation). Default: 6–40.
    pub page_bullet: LengthBand,

    /// Band for each global overview bullet. Default: 6–35.
    pub overview_bullet: LengthBand,

    /// Band for each global expansion paragraph. Default: 20–120.
    pub expansion: LengthBand,

    /// Only the first N page bullets feed the global prompt. Default: 160.
    pub max_global_input_bullets: usize,

    /// Keywords extracted per summarized page; 0 disables. Default: 8.
    pub keywords_per_page: usize,

    /// Sampling temperature. Default: None (provider default).
    ///
    /// Left unset because several reasoning models reject any explicit value.
    pub temperature: Option<f32>,

    /// Maximum completion tokens per call. Default: None (provider default).
    pub max_tokens: Option<usize>,

    /// Per-LLM-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Largest accepted upload for the `*_bytes` entry points. Default: 50 MiB.
    pub max_upload_bytes: u64,

    /// Custom system prompt. If None, uses the built-in default.
    pub system_prompt: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over [`LlmSettings`].
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Named edgequake-llm provider used when no API key is supplied.
    pub provider_name: Option<String>,

    /// Receives a call for every pipeline stage transition.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            page_char_budget: 4000,
            page_bullet: LengthBand::new(6, 40),
            overview_bullet: LengthBand::new(6, 35),
            expansion: LengthBand::new(20, 120),
            max_global_input_bullets: 160,
            keywords_per_page: keywords::DEFAULT_TOP_K,
            temperature: None,
            max_tokens: None,
            api_timeout_secs: 120,
            max_upload_bytes: 50 * 1024 * 1024,
            system_prompt: None,
            provider: None,
            provider_name: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("concurrency", &self.concurrency)
            .field("page_char_budget", &self.page_char_budget)
            .field("page_bullet", &self.page_bullet)
            .field("overview_bullet", &self.overview_bullet)
            .field("expansion", &self.expansion)
            .field("max_global_input_bullets", &self.max_global_input_bullets)
            .field("keywords_per_page", &self.keywords_per_page)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("provider_name", &self.provider_name)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`AnalysisConfig`].
#[derive(Debug)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn page_char_budget(mut self, chars: usize) -> Self {
        self.config.page_char_budget = chars;
        self
    }

    pub fn page_bullet(mut self, band: LengthBand) -> Self {
        self.config.page_bullet = band;
        self
    }

    pub fn overview_bullet(mut self, band: LengthBand) -> Self {
        self.config.overview_bullet = band;
        self
    }

    pub fn expansion(mut self, band: LengthBand) -> Self {
        self.config.expansion = band;
        self
    }

    pub fn max_global_input_bullets(mut self, n: usize) -> Self {
        self.config.max_global_input_bullets = n;
        self
    }

    pub fn keywords_per_page(mut self, n: usize) -> Self {
        self.config.keywords_per_page = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = Some(t.clamp(0.0, 2.0));
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = Some(n);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn max_upload_bytes(mut self, bytes: u64) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, DigestError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(DigestError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.page_char_budget == 0 {
            return Err(DigestError::InvalidConfig(
                "Page character budget must be ≥ 1".into(),
            ));
        }
        for (name, band) in [
            ("page bullet", c.page_bullet),
            ("overview bullet", c.overview_bullet),
            ("expansion", c.expansion),
        ] {
            // Truncation keeps max - 1 chars plus a closing mark.
            if band.max < 2 || band.min > band.max {
                return Err(DigestError::InvalidConfig(format!(
                    "{name} band must satisfy 2 ≤ max and min ≤ max, got {}–{}",
                    band.min, band.max
                )));
            }
        }
        if c.max_global_input_bullets == 0 {
            return Err(DigestError::InvalidConfig(
                "Global input bullet cap must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}
