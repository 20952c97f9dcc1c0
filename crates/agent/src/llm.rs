//! LLM-backed intent extraction.
//!
//! The model is only a translator: it proposes an intent tag, raw slot values and a
//! confidence. Everything it returns is re-validated by the orchestrator before it can
//! touch a session.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use flightdesk_core::config::{LlmConfig, LlmProvider};
use flightdesk_core::domain::booking::BookingTarget;
use flightdesk_core::domain::search::{OfferRef, SortKey};
use flightdesk_core::domain::session::Actor;
use flightdesk_core::domain::slots::SlotName;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::extractor::{Extraction, ExtractionRequest, ExtractorError, IntentExtractor, IntentTag};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

const SYSTEM_PROMPT: &str = "You convert travel requests into JSON for a flight booking assistant. \
Never invent prices, flights or booking outcomes. Return exactly one JSON object and nothing else.";

/// Shape the model is asked to produce.
#[derive(Debug, Deserialize)]
struct ModelReply {
    intent: String,
    #[serde(default)]
    slots: BTreeMap<String, Value>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    offer_ref: Option<String>,
    #[serde(default)]
    position: Option<usize>,
    #[serde(default)]
    sort_key: Option<SortKey>,
}

pub struct LlmIntentExtractor<C: LlmClient> {
    client: C,
}

impl<C: LlmClient> LlmIntentExtractor<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    fn build_prompt(&self, request: &ExtractionRequest<'_>) -> String {
        let mut prompt = String::new();
        let _ = writeln!(prompt, "{SYSTEM_PROMPT}\n");
        let _ = writeln!(prompt, "Today is {}.", request.today);

        let slots = serde_json::to_string(request.slots).unwrap_or_else(|_| "{}".to_string());
        let _ = writeln!(prompt, "Current trip slots: {slots}");

        if !request.turn_window.is_empty() {
            prompt.push_str("Recent conversation:\n");
            for turn in request.turn_window {
                let actor = match turn.actor {
                    Actor::User => "user",
                    Actor::Agent => "agent",
                    Actor::Tool => "tool",
                };
                let _ = writeln!(prompt, "- {actor}: {}", turn.text);
            }
        }

        let _ = writeln!(prompt, "\nUser message: {}\n", request.utterance);
        prompt.push_str(
            "Intents: search, refine, new_search, clarify, book, confirm, decline, sort, end.\n",
        );
        let names: Vec<&str> = SlotName::ALL.iter().map(SlotName::as_str).collect();
        let _ = writeln!(
            prompt,
            "Slot keys (include only values the user stated): {}.",
            names.join(", ")
        );
        prompt.push_str(
            "Locations are 3-letter IATA codes, dates are YYYY-MM-DD, budget is a number, \
cabin_class is economy|premium_economy|business|first, flexibility is 0-7 days.\n",
        );
        prompt.push_str("Return JSON with shape:\n");
        prompt.push_str(
            r#"{"intent":"search","slots":{"origin":"BOS"},"confidence":0.0,"offer_ref":null,"position":null,"sort_key":null}"#,
        );
        prompt.push('\n');
        prompt
    }
}

#[async_trait]
impl<C: LlmClient> IntentExtractor for LlmIntentExtractor<C> {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn extract(&self, request: &ExtractionRequest<'_>) -> Result<Extraction, ExtractorError> {
        let prompt = self.build_prompt(request);
        let output = self
            .client
            .complete(&prompt)
            .await
            .map_err(|error| ExtractorError::Transport(format!("{error:#}")))?;
        debug!(event_name = "extractor.llm.output", chars = output.len(), "llm replied");

        parse_model_output(&output)
    }
}

pub(crate) fn parse_model_output(output: &str) -> Result<Extraction, ExtractorError> {
    let json = extract_json(output)
        .ok_or_else(|| ExtractorError::Malformed("model output did not contain JSON".to_string()))?;
    let reply: ModelReply = serde_json::from_str(json)
        .map_err(|error| ExtractorError::Malformed(format!("invalid extraction JSON: {error}")))?;

    let intent = match reply.intent.trim().to_ascii_lowercase().as_str() {
        "search" => IntentTag::Search,
        "refine" => IntentTag::Refine,
        "new_search" => IntentTag::NewSearch,
        "clarify" => IntentTag::Clarify,
        "confirm" => IntentTag::Confirm,
        "decline" => IntentTag::Decline,
        "end" => IntentTag::End,
        "book" => IntentTag::Book {
            target: BookingTarget {
                offer_ref: reply.offer_ref.as_deref().and_then(|raw| OfferRef::from_str(raw).ok()),
                position: reply.position.filter(|position| *position > 0),
            },
        },
        "sort" => {
            let key = reply.sort_key.ok_or_else(|| {
                ExtractorError::Malformed("sort intent without a sort_key".to_string())
            })?;
            IntentTag::Sort { key }
        }
        other => return Err(ExtractorError::Malformed(format!("unknown intent `{other}`"))),
    };

    Ok(Extraction { intent, slots: reply.slots, confidence: scale_confidence(reply.confidence) })
}

/// Models report 0.0-1.0; some report percentages. Missing means no confidence.
fn scale_confidence(raw: Option<f64>) -> u8 {
    let Some(raw) = raw.filter(|value| value.is_finite() && *value > 0.0) else {
        return 0;
    };
    let percent = if raw <= 1.0 { raw * 100.0 } else { raw };
    percent.round().min(100.0) as u8
}

fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&text[start..=end])
}

/// OpenAI-compatible chat-completions client. Ollama exposes the same API.
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<SecretString>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: String,
}

impl ChatCompletionsClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let base_url = match (&config.base_url, &config.provider) {
            (Some(url), _) => url.clone(),
            (None, LlmProvider::Ollama) => OLLAMA_BASE_URL.to_string(),
            (None, _) => OPENAI_BASE_URL.to_string(),
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build LLM http client")?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl LlmClient for ChatCompletionsClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            temperature: 0.0,
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await.context("LLM request failed")?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("LLM returned HTTP {status}: {text}"));
        }

        let parsed: ChatResponse = response.json().await.context("LLM response was not JSON")?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("LLM response had no choices"))
    }
}

/// Spaces calls to the wrapped client at least `min_interval` apart.
pub struct RateLimitedLlm<C> {
    inner: C,
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl<C: LlmClient> RateLimitedLlm<C> {
    pub fn new(inner: C, min_interval: Duration) -> Self {
        Self { inner, min_interval, last_call: Mutex::new(None) }
    }
}

#[async_trait]
impl<C: LlmClient> LlmClient for RateLimitedLlm<C> {
    async fn complete(&self, prompt: &str) -> Result<String> {
        {
            let mut last_call = self.last_call.lock().await;
            if let Some(previous) = *last_call {
                let ready_at = previous + self.min_interval;
                if ready_at > Instant::now() {
                    debug!(event_name = "extractor.llm.rate_limited", "delaying llm call");
                    tokio::time::sleep_until(ready_at).await;
                }
            }
            *last_call = Some(Instant::now());
        }
        self.inner.complete(prompt).await
    }
}
