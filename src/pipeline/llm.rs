//! LLM interaction: the JSON chat seam and its two implementations.
//!
//! The engine only ever needs one operation: send a system and a user
//! prompt, get a JSON object back. That is all [`ChatBackend`] exposes.
//! Prompt wording lives in [`crate::prompts`]; shape checking of the returned
//! object lives in [`crate::engine`].
//!
//! * [`OpenAiCompatClient`] talks to any OpenAI-compatible
//!   `/chat/completions` endpoint with the caller's own key and base URL.
//!   One client is built per request and dropped with it.
//! * [`ProviderBackend`] adapts a pre-built `edgequake_llm` provider.
//!
//! There is no retry here. A failed call propagates and the request fails.

use crate::config::{AnalysisConfig, LlmSettings};
use crate::error::DigestError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Sends one chat exchange and returns the reply parsed as a JSON object.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Fails on transport or provider errors and on content that is not a
    /// JSON object. An empty reply is treated as `{}`.
    async fn complete_json(&self, system_prompt: &str, user_prompt: &str)
        -> Result<Value, DigestError>;
}

// ── OpenAI-compatible HTTP client ────────────────────────────────────────

const PROVIDER_LABEL: &str = "openai-compatible";
/// Error bodies are cut to this many chars before landing in messages.
const ERROR_BODY_LIMIT: usize = 300;

/// Chat-completions client bound to one request's credentials.
pub struct OpenAiCompatClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [WireMessage<'a>; 2],
    response_format: ResponseFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    // o-series and gpt-5 models reject `max_tokens`.
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<usize>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiCompatClient {
    /// Build a client for one request.
    pub fn new(settings: &LlmSettings, config: &AnalysisConfig) -> Result<Self, DigestError> {
        if settings.api_key.trim().is_empty() {
            return Err(DigestError::ProviderNotConfigured {
                provider: PROVIDER_LABEL.to_string(),
                hint: "An API key is required.".to_string(),
            });
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .build()
            .map_err(|e| DigestError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: settings.chat_endpoint(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl ChatBackend for OpenAiCompatClient {
    async fn complete_json(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<Value, DigestError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                WireMessage {
                    role: "system",
                    content: system_prompt,
                },
                WireMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
            temperature: self.temperature,
            max_completion_tokens: self.max_tokens,
        };

        let start = Instant::now();
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&e, start))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), retry_after, &text));
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| transport_error(&e, start))?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        debug!(
            "LLM call to {} ({}) finished in {:?}, {} chars",
            self.endpoint,
            self.model,
            start.elapsed(),
            content.len()
        );
        parse_json_object(&content)
    }
}

fn transport_error(e: &reqwest::Error, start: Instant) -> DigestError {
    if e.is_timeout() {
        DigestError::ApiTimeout {
            elapsed_ms: start.elapsed().as_millis() as u64,
        }
    } else if e.is_decode() {
        DigestError::MalformedResponse {
            detail: format!("unreadable completion body: {e}"),
        }
    } else {
        DigestError::LlmApiError {
            message: format!("request failed: {e}"),
        }
    }
}

/// Map a non-success HTTP status to the matching error.
pub fn status_error(status: u16, retry_after_secs: Option<u64>, body: &str) -> DigestError {
    let detail: String = body.trim().chars().take(ERROR_BODY_LIMIT).collect();
    match status {
        401 | 403 => DigestError::AuthError {
            provider: PROVIDER_LABEL.to_string(),
            detail,
        },
        429 => DigestError::RateLimitExceeded {
            provider: PROVIDER_LABEL.to_string(),
            retry_after_secs,
        },
        _ => DigestError::LlmApiError {
            message: format!("HTTP {status}: {detail}"),
        },
    }
}

// ── edgequake-llm adapter ────────────────────────────────────────────────

/// Wraps an `edgequake_llm` provider as a [`ChatBackend`].
pub struct ProviderBackend {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl ProviderBackend {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &AnalysisConfig) -> Self {
        Self {
            provider,
            options: CompletionOptions {
                temperature: config.temperature,
                max_tokens: config.max_tokens,
                ..CompletionOptions::json_mode()
            },
        }
    }
}

#[async_trait]
impl ChatBackend for ProviderBackend {
    async fn complete_json(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<Value, DigestError> {
        let messages = vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user(user_prompt),
        ];
        let start = Instant::now();
        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| DigestError::LlmApiError {
                message: format!("{e}"),
            })?;
        debug!(
            "Provider call: {} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        parse_json_object(&response.content)
    }
}

// ── Backend resolution ───────────────────────────────────────────────────

/// Pick the backend for one request, from most to least specific:
///
/// 1. `config.provider` — a pre-built provider, used as-is.
/// 2. `settings.api_key` — a fresh [`OpenAiCompatClient`] for this request.
/// 3. `config.provider_name` — an edgequake-llm provider from the factory,
///    which reads its key from the environment.
pub fn resolve_backend(
    settings: &LlmSettings,
    config: &AnalysisConfig,
) -> Result<Arc<dyn ChatBackend>, DigestError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::new(ProviderBackend::new(Arc::clone(provider), config)));
    }

    if !settings.api_key.trim().is_empty() {
        return Ok(Arc::new(OpenAiCompatClient::new(settings, config)?));
    }

    if let Some(ref name) = config.provider_name {
        let provider = ProviderFactory::create_llm_provider(name, &settings.model).map_err(|e| {
            DigestError::ProviderNotConfigured {
                provider: name.clone(),
                hint: format!("{e}"),
            }
        })?;
        return Ok(Arc::new(ProviderBackend::new(provider, config)));
    }

    Err(DigestError::ProviderNotConfigured {
        provider: PROVIDER_LABEL.to_string(),
        hint: "Supply an API key (--api-key / OPENAI_API_KEY) or a provider name.".to_string(),
    })
}

// ── Reply decoding ───────────────────────────────────────────────────────

static RE_JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json|JSON)?\s*\n(.*?)\n?```$").unwrap());

/// Decode model content into a JSON object.
///
/// Tolerates an outer code fence. Empty content decodes to `{}` so the
/// engine's shape fallback handles it.
pub fn parse_json_object(content: &str) -> Result<Value, DigestError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    let body = RE_JSON_FENCE
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or(trimmed);

    let value: Value = serde_json::from_str(body).map_err(|e| DigestError::MalformedResponse {
        detail: e.to_string(),
    })?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(DigestError::MalformedResponse {
            detail: format!("expected a JSON object, got {}", json_kind(&value)),
        })
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
