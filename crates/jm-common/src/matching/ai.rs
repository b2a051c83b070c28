#![allow(async_fn_in_trait)]

//! AI relevance scoring with an explicit rule-based fallback.
//!
//! The model is reached through an OpenAI-compatible chat-completions
//! endpoint in JSON mode and must answer with
//! `{"matches":[{"id":"<posting hash>","score":<number>,"reason":"<text>"}]}`.
//!
//! Scores may come back on a 0-100 or a 0-1 scale. Anything above 1 is
//! read as a percentage. A literal `1` therefore means 1.0, never 1%.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::scoring::{ScoredCandidate, score_by_rules, sort_scored};
use crate::{Posting, UserProfile};

const SYSTEM_PROMPT: &str = "You rank early-career job postings for one candidate. \
Score every posting from 0 to 100 for how well it fits the candidate's target cities, \
career paths, work environment and visa situation. Reply with JSON only: \
{\"matches\":[{\"id\":\"<posting id>\",\"score\":<0-100>,\"reason\":\"<one sentence>\"}]}.";

const DESCRIPTION_PROMPT_CHARS: usize = 600;

#[derive(Debug, Clone)]
pub struct LlmRuntimeConfig {
    pub enabled: bool,
    pub provider: String,
    pub model: String,
    pub endpoint: String,
    pub api_key: String,
    pub timeout_secs: u64,
    pub max_output_tokens: u32,
}

impl Default for LlmRuntimeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            endpoint: "https://api.openai.com/v1/chat/completions".into(),
            api_key: String::new(),
            timeout_secs: 30,
            max_output_tokens: 2000,
        }
    }
}

impl LlmRuntimeConfig {
    pub fn from_env() -> Self {
        fn provider_defaults(provider: &str) -> (String, String) {
            match provider.to_ascii_lowercase().as_str() {
                "deepseek" => (
                    "deepseek-chat".into(),
                    "https://api.deepseek.com/chat/completions".into(),
                ),
                "mistral" => (
                    "mistral-large-latest".into(),
                    "https://api.mistral.ai/v1/chat/completions".into(),
                ),
                "xai" => (
                    "grok-2-latest".into(),
                    "https://api.x.ai/v1/chat/completions".into(),
                ),
                "groq" => (
                    "llama-3.1-70b-versatile".into(),
                    "https://api.groq.com/openai/v1/chat/completions".into(),
                ),
                _ => (
                    "gpt-4o-mini".into(),
                    "https://api.openai.com/v1/chat/completions".into(),
                ),
            }
        }

        fn provider_api_key(provider: &str) -> Option<String> {
            match provider.to_ascii_lowercase().as_str() {
                "openai" => std::env::var("OPENAI_API_KEY").ok(),
                "deepseek" => std::env::var("DEEPSEEK_API_KEY").ok(),
                "mistral" => std::env::var("MISTRAL_API_KEY").ok(),
                "xai" => std::env::var("XAI_API_KEY").ok(),
                "groq" => std::env::var("GROQ_API_KEY").ok(),
                _ => None,
            }
        }

        fn parse_bool(key: &str, default: bool) -> bool {
            match std::env::var(key) {
                Ok(val) => matches!(val.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
                Err(_) => default,
            }
        }

        fn parse_u64(key: &str, default: u64) -> u64 {
            std::env::var(key)
                .ok()
                .and_then(|raw| raw.parse::<u64>().ok())
                .unwrap_or(default)
        }

        fn parse_u32(key: &str, default: u32) -> u32 {
            std::env::var(key)
                .ok()
                .and_then(|raw| raw.parse::<u32>().ok())
                .unwrap_or(default)
        }

        let provider = std::env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".into());
        let (default_model, default_endpoint) = provider_defaults(&provider);
        let api_key = std::env::var("LLM_API_KEY")
            .ok()
            .or_else(|| provider_api_key(&provider))
            .unwrap_or_default();

        Self {
            enabled: parse_bool("LLM_ENABLED", true),
            provider,
            model: std::env::var("LLM_MODEL").unwrap_or(default_model),
            endpoint: std::env::var("LLM_ENDPOINT").unwrap_or(default_endpoint),
            api_key,
            timeout_secs: parse_u64("LLM_TIMEOUT_SECONDS", 30),
            max_output_tokens: parse_u32("LLM_MAX_OUTPUT_TOKENS", 2000),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringErrorKind {
    Timeout,
    MalformedResponse,
    CapabilityUnavailable,
    UpstreamError,
}

impl ScoringErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoringErrorKind::Timeout => "timeout",
            ScoringErrorKind::MalformedResponse => "malformed_response",
            ScoringErrorKind::CapabilityUnavailable => "capability_unavailable",
            ScoringErrorKind::UpstreamError => "upstream_error",
        }
    }
}

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("scoring call timed out after {0:?}")]
    Timeout(Duration),
    #[error("malformed scoring response: {0}")]
    Malformed(String),
    #[error("scoring capability unavailable: {0}")]
    Unavailable(String),
    #[error("scoring endpoint returned {status}: {body}")]
    Upstream { status: u16, body: String },
}

impl ScoringError {
    pub fn kind(&self) -> ScoringErrorKind {
        match self {
            ScoringError::Timeout(_) => ScoringErrorKind::Timeout,
            ScoringError::Malformed(_) => ScoringErrorKind::MalformedResponse,
            ScoringError::Unavailable(_) => ScoringErrorKind::CapabilityUnavailable,
            ScoringError::Upstream { .. } => ScoringErrorKind::UpstreamError,
        }
    }
}

/// One batched relevance call per user. Returns the model's raw message
/// content; [`parse_reply`] turns it into scored candidates.
pub trait ScoringBackend {
    async fn score_batch(
        &self,
        profile: &UserProfile,
        candidates: &[Posting],
    ) -> Result<String, ScoringError>;
}

#[derive(Debug, Deserialize)]
struct ChatResponseRaw {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

pub struct HttpScoringBackend {
    http_client: Client,
    config: LlmRuntimeConfig,
}

impl HttpScoringBackend {
    pub fn new(config: LlmRuntimeConfig) -> Self {
        Self {
            http_client: Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &LlmRuntimeConfig {
        &self.config
    }
}

/// Request body sent to the chat-completions endpoint.
pub fn build_request(
    config: &LlmRuntimeConfig,
    profile: &UserProfile,
    candidates: &[Posting],
) -> Value {
    let postings: Vec<Value> = candidates
        .iter()
        .map(|p| {
            let description: String = p.description.chars().take(DESCRIPTION_PROMPT_CHARS).collect();
            json!({
                "id": p.hash,
                "title": p.title,
                "employer": p.employer_name(),
                "location": p.location,
                "categories": p.categories,
                "workMode": p.work_mode,
                "visaFriendly": p.visa_friendly,
                "internship": p.is_internship,
                "graduateProgram": p.is_graduate_program,
                "postedAt": p.recency_anchor(),
                "description": description,
            })
        })
        .collect();

    let user_prompt = json!({
        "candidate": {
            "targetCities": profile.target_cities(),
            "careerPaths": profile.career_paths,
            "languages": profile.languages,
            "entryLevelPreferences": profile.entry_level_preferences,
            "workEnvironments": profile.work_environments,
            "visaStatus": profile.visa_status,
            "roles": profile.roles,
        },
        "postings": postings,
    });

    json!({
        "model": config.model,
        "messages": [
            { "role": "system", "content": SYSTEM_PROMPT },
            { "role": "user", "content": user_prompt.to_string() },
        ],
        "response_format": { "type": "json_object" },
        "max_tokens": config.max_output_tokens,
        "temperature": 0,
    })
}

impl ScoringBackend for HttpScoringBackend {
    async fn score_batch(
        &self,
        profile: &UserProfile,
        candidates: &[Posting],
    ) -> Result<String, ScoringError> {
        if !self.config.enabled {
            return Err(ScoringError::Unavailable("LLM_ENABLED is off".into()));
        }
        if self.config.api_key.is_empty() {
            return Err(ScoringError::Unavailable(format!(
                "no API key configured for provider {}",
                self.config.provider
            )));
        }

        let start = std::time::Instant::now();
        let response = self
            .http_client
            .post(&self.config.endpoint)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .timeout(self.config.timeout())
            .json(&build_request(&self.config, profile, candidates))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ScoringError::Timeout(self.config.timeout())
                } else {
                    ScoringError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ScoringError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let raw: ChatResponseRaw = response
            .json()
            .await
            .map_err(|e| ScoringError::Malformed(e.to_string()))?;

        debug!(
            user_key = %profile.user_key,
            model = %self.config.model,
            candidates = candidates.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "scoring completion received"
        );

        raw.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ScoringError::Malformed("completion has no message content".into()))
    }
}

/// Map an upstream score onto `[0, 1]`. Values above 1 are percentages.
/// Non-finite values are rejected.
pub fn normalize_score(raw: f64) -> Option<f64> {
    if !raw.is_finite() {
        return None;
    }
    let scaled = if raw > 1.0 { raw / 100.0 } else { raw };
    Some(scaled.clamp(0.0, 1.0))
}

#[derive(Debug, Deserialize)]
struct ReplyBody {
    matches: Vec<ReplyEntry>,
}

#[derive(Debug, Deserialize)]
struct ReplyEntry {
    id: String,
    #[serde(default)]
    score: Value,
    #[serde(default)]
    reason: String,
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// Parse the model reply against the candidates that were sent.
///
/// Only entries the model actually scored are returned; unknown ids,
/// repeats and unusable scores are skipped. A reply with no usable entry is
/// malformed.
pub fn parse_reply(
    content: &str,
    candidates: &[Posting],
) -> Result<Vec<ScoredCandidate>, ScoringError> {
    let body: ReplyBody = serde_json::from_str(strip_code_fence(content))
        .map_err(|e| ScoringError::Malformed(e.to_string()))?;

    let mut by_hash: HashMap<&str, &Posting> =
        candidates.iter().map(|p| (p.hash.as_str(), p)).collect();

    let mut scored = Vec::with_capacity(body.matches.len());
    for entry in body.matches {
        let raw = match &entry.score {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        let Some(score) = raw.and_then(normalize_score) else {
            debug!(id = %entry.id, score = %entry.score, "unusable score in reply");
            continue;
        };
        // remove() also drops repeated ids after the first
        let Some(posting) = by_hash.remove(entry.id.as_str()) else {
            continue;
        };
        let reason = entry.reason.trim();
        scored.push(ScoredCandidate {
            posting: posting.clone(),
            score,
            rationale: if reason.is_empty() {
                "Ranked by relevance to your preferences".to_string()
            } else {
                reason.to_string()
            },
        });
    }

    if scored.is_empty() {
        return Err(ScoringError::Malformed("reply contains no usable match entry".into()));
    }
    sort_scored(&mut scored);
    Ok(scored)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMethod {
    Ai,
    RuleBased,
}

impl ScoringMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoringMethod::Ai => "ai",
            ScoringMethod::RuleBased => "rule_based",
        }
    }
}

/// Result of scoring one user's candidates. The rule-based scorer cannot
/// fail, so there is no fatal variant.
#[derive(Debug, Clone)]
pub enum ScoringOutcome {
    Primary {
        scored: Vec<ScoredCandidate>,
        /// Hashes the reply left out, scored by rules instead.
        rule_filled: BTreeSet<String>,
    },
    Fallback {
        scored: Vec<ScoredCandidate>,
        error_kind: ScoringErrorKind,
        message: String,
    },
}

impl ScoringOutcome {
    pub fn scored(&self) -> &[ScoredCandidate] {
        match self {
            ScoringOutcome::Primary { scored, .. } | ScoringOutcome::Fallback { scored, .. } => {
                scored
            }
        }
    }

    pub fn into_scored(self) -> Vec<ScoredCandidate> {
        match self {
            ScoringOutcome::Primary { scored, .. } | ScoringOutcome::Fallback { scored, .. } => {
                scored
            }
        }
    }

    /// Candidates scored by rules although the AI call succeeded.
    pub fn rule_filled(&self) -> BTreeSet<String> {
        match self {
            ScoringOutcome::Primary { rule_filled, .. } => rule_filled.clone(),
            ScoringOutcome::Fallback { .. } => BTreeSet::new(),
        }
    }

    pub fn method(&self) -> ScoringMethod {
        match self {
            ScoringOutcome::Primary { .. } => ScoringMethod::Ai,
            ScoringOutcome::Fallback { .. } => ScoringMethod::RuleBased,
        }
    }

    pub fn error_kind(&self) -> Option<ScoringErrorKind> {
        match self {
            ScoringOutcome::Primary { .. } => None,
            ScoringOutcome::Fallback { error_kind, .. } => Some(*error_kind),
        }
    }

    pub fn fallback_used(&self) -> bool {
        matches!(self, ScoringOutcome::Fallback { .. })
    }
}

/// Score candidates with the AI backend, falling back to the rule-based
/// scorer on timeout, malformed reply, unavailability or upstream error.
/// Every fallback is logged and counted with its error type.
///
/// Every candidate comes back scored: those a successful reply omits get
/// their rule-based score and are listed in `rule_filled`.
pub async fn score_with_fallback<B: ScoringBackend>(
    backend: &B,
    call_timeout: Duration,
    profile: &UserProfile,
    candidates: &[Posting],
    now: DateTime<Utc>,
) -> ScoringOutcome {
    let reply = match timeout(call_timeout, backend.score_batch(profile, candidates)).await {
        Ok(reply) => reply,
        Err(_) => Err(ScoringError::Timeout(call_timeout)),
    };

    match reply.and_then(|content| parse_reply(&content, candidates)) {
        Ok(mut scored) => {
            let omitted: Vec<Posting> = {
                let answered: BTreeSet<&str> =
                    scored.iter().map(|s| s.posting.hash.as_str()).collect();
                candidates
                    .iter()
                    .filter(|p| !answered.contains(p.hash.as_str()))
                    .cloned()
                    .collect()
            };
            let rule_filled: BTreeSet<String> = omitted.iter().map(|p| p.hash.clone()).collect();

            if !omitted.is_empty() {
                info!(
                    user_key = %profile.user_key,
                    answered = scored.len(),
                    rule_filled = omitted.len(),
                    "AI reply was partial, scoring the rest by rules"
                );
                counter!("jm_scoring_rule_filled_total").increment(omitted.len() as u64);
                scored.extend(score_by_rules(profile, &omitted, now));
                sort_scored(&mut scored);
            }
            ScoringOutcome::Primary { scored, rule_filled }
        }
        Err(err) => {
            let error_kind = err.kind();
            warn!(
                user_key = %profile.user_key,
                error_type = error_kind.as_str(),
                fallback_used = true,
                error = %err,
                "AI scoring failed, using rule-based scorer"
            );
            counter!("jm_scoring_fallback_total", "error_type" => error_kind.as_str()).increment(1);
            ScoringOutcome::Fallback {
                scored: score_by_rules(profile, candidates, now),
                error_kind,
                message: err.to_string(),
            }
        }
    }
}
