use std::time::{Duration, Instant};

use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::ProviderConfig;

const GEMINI_MODELS: &[&str] = &["gemini-3-flash-preview", "gemini-2.5-flash"];
const HF_ROUTER_URL: &str = "https://router.huggingface.co/v1/chat/completions";
const HF_MODEL: &str = "moonshotai/Kimi-K2-Instruct-0905";
const HF_TIMEOUT: Duration = Duration::from_secs(60);

/// Error text embedded in reports is capped so a provider cannot flood the
/// session log with a megabyte of HTML.
const MAX_ERROR_CHARS: usize = 2000;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider returned status {status}: {message}")]
    Http { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider misconfigured: {0}")]
    Misconfigured(String),
    #[error("empty response from provider")]
    EmptyResponse,
}

impl ProviderError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        if self.status() == Some(429) {
            return true;
        }
        let message = match self {
            ProviderError::Http { message, .. } => message.to_lowercase(),
            _ => return false,
        };
        (message.contains("429") && message.contains("rate"))
            || message.contains("resource exhausted")
            || message.contains("resource_exhausted")
            || message.contains("too many requests")
            || message.contains("rate limit")
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ProviderError::Transport(m) if m.to_lowercase().contains("timed out"))
    }

    /// Pulls a human-readable retry delay out of rate-limit error bodies.
    /// Gemini reports both a prose form ("Please retry in 37.5s") and a
    /// structured `retryDelay` field.
    pub fn retry_hint(&self) -> Option<String> {
        let message = match self {
            ProviderError::Http { message, .. } => message,
            _ => return None,
        };
        let lower = message.to_lowercase();
        if let Some(pos) = lower.find("please retry in") {
            let rest = &lower[pos + "please retry in".len()..];
            let hint: String = rest
                .trim_start()
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == 's')
                .collect();
            if !hint.is_empty() {
                return Some(hint);
            }
        }
        if let Some(pos) = lower.find("retrydelay") {
            let rest = &lower[pos..];
            let hint: String = rest
                .chars()
                .skip_while(|c| !c.is_ascii_digit())
                .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == 's')
                .collect();
            if !hint.is_empty() {
                return Some(hint);
            }
        }
        None
    }
}

/// Seam between the pipeline and concrete LLM backends. Implementations are
/// synchronous; the orchestrator runs one generation at a time.
pub trait TextProvider: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String, ProviderError>;
    fn name(&self) -> &'static str;
}

/// What the manager hands back on success, including enough provenance for
/// the stored record: which backend answered, whether it was the fallback,
/// and the wall-clock latency of the whole call chain.
#[derive(Debug, Clone)]
pub struct ProviderOutcome {
    pub text: String,
    pub provider_name: &'static str,
    pub fallback_used: bool,
    pub primary_error: Option<String>,
    pub latency_ms: u64,
}

/// Report produced when both backends fail. Rendered for the user as a
/// diagnosis plus suggested actions rather than a raw error chain.
#[derive(Debug)]
pub struct DualFailure {
    pub primary_name: &'static str,
    pub primary_error: String,
    pub fallback_name: &'static str,
    pub fallback_error: String,
    pub primary_rate_limited: bool,
    pub retry_hint: Option<String>,
}

impl DualFailure {
    fn render(&self) -> String {
        format!(
            "all providers failed\n\n\
             Primary provider ({})\n  error: {}\n  diagnosis: {}\n  what you can do: {}\n\n\
             Fallback provider ({})\n  error: {}\n  diagnosis: {}\n  what you can do: {}",
            self.primary_name,
            self.primary_error,
            self.primary_diagnosis(),
            self.primary_actions(),
            self.fallback_name,
            self.fallback_error,
            self.fallback_diagnosis(),
            self.fallback_actions(),
        )
    }

    fn primary_diagnosis(&self) -> &'static str {
        if self.primary_rate_limited {
            return "rate limit / quota exhaustion (HTTP 429 / RESOURCE_EXHAUSTED)";
        }
        let m = self.primary_error.to_lowercase();
        if m.contains("quota") && m.contains("exceed") {
            return "quota exceeded";
        }
        if m.contains("unauthorized") || m.contains("permission") || m.contains("api key") {
            return "authentication/authorization issue (API key missing, invalid or lacking project permission)";
        }
        "primary provider failed"
    }

    fn primary_actions(&self) -> String {
        if self.primary_rate_limited {
            return match &self.retry_hint {
                Some(hint) => format!(
                    "wait {hint} and retry; if it keeps happening, check the quota and billing behind GEMINI_API_KEY or switch to another key or model"
                ),
                None => "wait briefly and retry; if it keeps happening, check the quota and billing behind GEMINI_API_KEY or switch to another key or model".into(),
            };
        }
        "check GEMINI_API_KEY in your .env, confirm billing and quota, then retry".into()
    }

    fn fallback_diagnosis(&self) -> &'static str {
        let m = self.fallback_error.to_lowercase();
        if m.contains("hf_token is not set") {
            return "fallback is configured but HF_TOKEN is missing";
        }
        if m.contains("status 503") || m.contains("service unavailable") {
            return "fallback endpoint temporarily unavailable (HTTP 503)";
        }
        if m.contains("status 401") || m.contains("status 403") {
            return "fallback authentication/authorization failure (token invalid or lacking access)";
        }
        "fallback provider failed"
    }

    fn fallback_actions(&self) -> &'static str {
        let m = self.fallback_error.to_lowercase();
        if m.contains("hf_token is not set") {
            return "set HF_TOKEN in your .env, then retry";
        }
        if m.contains("status 503") || m.contains("service unavailable") {
            return "retry after a short delay; if persistent, verify the endpoint is up and HF_TOKEN is valid";
        }
        if m.contains("status 401") || m.contains("status 403") {
            return "verify HF_TOKEN is correct and has access, then retry";
        }
        "retry; if it persists, check HF_TOKEN and network connectivity"
    }
}

impl std::fmt::Display for DualFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

impl std::error::Error for DualFailure {}

fn sanitize_error(err: &ProviderError) -> String {
    let mut text = err.to_string().replace(['\n', '\r'], " ");
    if text.len() > MAX_ERROR_CHARS {
        let mut cut = MAX_ERROR_CHARS;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("…");
    }
    text
}

/// Primary/fallback pair. Any primary error triggers the fallback; the
/// fallback never triggers a third backend.
pub struct ProviderManager {
    primary: Box<dyn TextProvider>,
    fallback: Box<dyn TextProvider>,
}

impl ProviderManager {
    pub fn new(primary: Box<dyn TextProvider>, fallback: Box<dyn TextProvider>) -> Self {
        Self { primary, fallback }
    }

    pub fn from_config(cfg: &ProviderConfig) -> Self {
        let primary: Box<dyn TextProvider> = match &cfg.gemini_api_key {
            Some(key) => Box::new(GeminiProvider::new(key.clone())),
            None => Box::new(StaticErrorProvider::new(
                "gemini",
                "GEMINI_API_KEY is not set",
            )),
        };
        let fallback: Box<dyn TextProvider> = match &cfg.hf_token {
            Some(token) => Box::new(HuggingFaceProvider::new(token.clone())),
            None => Box::new(StaticErrorProvider::new(
                "huggingface",
                "HF_TOKEN is not set",
            )),
        };
        Self::new(primary, fallback)
    }

    pub fn generate(&self, prompt: &str) -> Result<ProviderOutcome, DualFailure> {
        let started = Instant::now();
        match self.primary.generate(prompt) {
            Ok(text) => Ok(ProviderOutcome {
                text,
                provider_name: self.primary.name(),
                fallback_used: false,
                primary_error: None,
                latency_ms: started.elapsed().as_millis() as u64,
            }),
            Err(primary_err) => {
                let sanitized = sanitize_error(&primary_err);
                warn!(
                    provider = self.primary.name(),
                    error = %sanitized,
                    rate_limited = primary_err.is_rate_limited(),
                    "primary provider failed, trying fallback"
                );
                match self.fallback.generate(prompt) {
                    Ok(text) => {
                        info!(provider = self.fallback.name(), "fallback provider succeeded");
                        Ok(ProviderOutcome {
                            text,
                            provider_name: self.fallback.name(),
                            fallback_used: true,
                            primary_error: Some(sanitized),
                            latency_ms: started.elapsed().as_millis() as u64,
                        })
                    }
                    Err(fallback_err) => Err(DualFailure {
                        primary_name: self.primary.name(),
                        primary_error: sanitized,
                        fallback_name: self.fallback.name(),
                        fallback_error: sanitize_error(&fallback_err),
                        primary_rate_limited: primary_err.is_rate_limited(),
                        retry_hint: primary_err.retry_hint(),
                    }),
                }
            }
        }
    }
}

/// Gemini REST backend. Walks the model candidate list so a model that is
/// overloaded (503 / UNAVAILABLE) does not take the whole provider down.
pub struct GeminiProvider {
    api_key: String,
    client: reqwest::blocking::Client,
}

impl GeminiProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: reqwest::blocking::Client::new(),
        }
    }

    fn call_model(&self, model: &str, prompt: &str) -> Result<String, ProviderError> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{model}:generateContent"
        );
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        if status != 200 {
            return Err(ProviderError::Http {
                status,
                message: text,
            });
        }

        let value: Value = serde_json::from_str(&text)
            .map_err(|e| ProviderError::Transport(format!("bad response body: {e}")))?;
        value["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(strip_code_fences)
            .filter(|t| !t.is_empty())
            .ok_or(ProviderError::EmptyResponse)
    }
}

fn is_model_unavailable(err: &ProviderError) -> bool {
    match err {
        ProviderError::Http { status, message } => {
            *status == 503 || message.contains("UNAVAILABLE")
        }
        _ => false,
    }
}

impl TextProvider for GeminiProvider {
    fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let mut last_err = ProviderError::EmptyResponse;
        for model in GEMINI_MODELS {
            match self.call_model(model, prompt) {
                Ok(text) => return Ok(text),
                Err(err) if is_model_unavailable(&err) => {
                    warn!(model, "gemini model unavailable, trying next candidate");
                    last_err = err;
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

/// Hugging Face router backend, OpenAI-compatible chat completions.
pub struct HuggingFaceProvider {
    token: String,
    client: reqwest::blocking::Client,
}

impl HuggingFaceProvider {
    pub fn new(token: String) -> Self {
        Self {
            token,
            client: reqwest::blocking::Client::builder()
                .timeout(HF_TIMEOUT)
                .build()
                .unwrap_or_else(|_| reqwest::blocking::Client::new()),
        }
    }
}

impl TextProvider for HuggingFaceProvider {
    fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let body = json!({
            "model": HF_MODEL,
            "messages": [{ "role": "user", "content": prompt }],
        });
        let response = self
            .client
            .post(HF_ROUTER_URL)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        if status != 200 {
            return Err(ProviderError::Http {
                status,
                message: text,
            });
        }

        let value: Value = serde_json::from_str(&text)
            .map_err(|e| ProviderError::Transport(format!("bad response body: {e}")))?;
        value["choices"][0]["message"]["content"]
            .as_str()
            .map(strip_code_fences)
            .filter(|t| !t.is_empty())
            .ok_or(ProviderError::EmptyResponse)
    }

    fn name(&self) -> &'static str {
        "huggingface"
    }
}

/// Stands in for a backend whose credentials are missing, so the manager's
/// fallback chain still runs and the final report names the real problem.
pub struct StaticErrorProvider {
    name: &'static str,
    message: &'static str,
}

impl StaticErrorProvider {
    pub fn new(name: &'static str, message: &'static str) -> Self {
        Self { name, message }
    }
}

impl TextProvider for StaticErrorProvider {
    fn generate(&self, _prompt: &str) -> Result<String, ProviderError> {
        Err(ProviderError::Misconfigured(self.message.to_string()))
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Models wrap JSON in markdown fences often enough that stripping them here
/// keeps the decode layer strict about everything else.
fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim().to_string()
}
