// ============================================
// Card Narration Client
// ============================================
//
// Turns a finished watch-history analysis into a deck of recap cards
// via an OpenAI-compatible chat completions API. Narration is strictly
// optional: any failure here logs a warning and the recap ships
// without cards.

use crate::config::LlmConfig;
use crate::error::{RecapError, Result};
use crate::models::{MediaUser, RecapCard, UserAnalysisResult};
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

// ============================================
// Provider
// ============================================

/// Chat-completion backend used for card narration.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Run one system + user exchange and return the raw reply text.
    async fn generate(&self, system: &str, user: &str) -> Result<String>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Provider speaking the OpenAI `/chat/completions` dialect. Works
/// against api.openai.com and self-hosted compatible servers.
pub struct OpenAiProvider {
    client: HttpClient,
    api_url: String,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(api_url: &str, api_key: &str, model: &str, timeout_secs: u64) -> Result<Self> {
        let client = HttpClient::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }
}

#[derive(Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format: String,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: String,
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn generate(&self, system: &str, user: &str) -> Result<String> {
        let request = CompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            temperature: 0.7,
            response_format: ResponseFormat {
                format: "json_object".to_string(),
            },
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RecapError::Upstream(format!(
                "llm returned {status}: {body}"
            )));
        }

        let result: CompletionResponse = response.json().await?;
        Ok(result
            .choices
            .first()
            .map(|choice| choice.message.content.clone())
            .unwrap_or_default())
    }

    fn name(&self) -> &str {
        "openai-compatible"
    }
}

// ============================================
// Card Generator
// ============================================

/// Builds the narrated card deck for one user's analysis.
pub struct CardGenerator {
    provider: Arc<dyn LlmProvider>,
    prompt_context: Option<String>,
}

impl CardGenerator {
    /// Create a card generator from config. Returns `None` when
    /// narration is disabled or no API key is set.
    pub fn from_config(config: &LlmConfig) -> Option<Self> {
        if !config.is_configured() {
            info!("card narration disabled");
            return None;
        }

        let api_key = config.api_key.as_deref()?;
        let provider = match OpenAiProvider::new(
            &config.api_url,
            api_key,
            &config.model,
            config.timeout_secs,
        ) {
            Ok(provider) => provider,
            Err(err) => {
                warn!(error = %err, "failed to build llm http client");
                return None;
            }
        };

        info!(
            provider = provider.name(),
            model = %config.model,
            "card narration enabled"
        );

        Some(Self {
            provider: Arc::new(provider),
            prompt_context: config.prompt_context.clone(),
        })
    }

    /// Swap in an arbitrary provider (tests, local models).
    pub fn with_provider(provider: Arc<dyn LlmProvider>, prompt_context: Option<String>) -> Self {
        Self {
            provider,
            prompt_context,
        }
    }

    /// Generate the card deck for one user. Failures are logged and
    /// yield an empty deck; callers never see an error from here.
    pub async fn generate_cards(
        &self,
        user: &MediaUser,
        analysis: &UserAnalysisResult,
    ) -> Vec<RecapCard> {
        let user_prompt = match build_user_prompt(user, analysis) {
            Ok(prompt) => prompt,
            Err(err) => {
                warn!(
                    username = %user.username,
                    error = %err,
                    "could not serialize analysis for narration"
                );
                return Vec::new();
            }
        };

        let system_prompt = self.build_system_prompt();
        match self.provider.generate(&system_prompt, &user_prompt).await {
            Ok(reply) => {
                let cards = extract_cards(&reply);
                if cards.is_empty() {
                    warn!(username = %user.username, "narration reply contained no cards");
                } else {
                    debug!(
                        username = %user.username,
                        cards = cards.len(),
                        "generated card deck"
                    );
                }
                cards
            }
            Err(err) => {
                warn!(username = %user.username, error = %err, "card generation failed");
                Vec::new()
            }
        }
    }

    fn build_system_prompt(&self) -> String {
        let mut context_lines = vec!["- This is a shared media server with multiple users."];
        if let Some(extra) = self.prompt_context.as_deref() {
            context_lines.push(extra);
        }
        let context_section = context_lines
            .iter()
            .map(|line| {
                if line.starts_with('-') {
                    (*line).to_string()
                } else {
                    format!("- {line}")
                }
            })
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"Create a year-in-review recap card deck from a user's watch statistics. Be fun, insightful, playful, and great overall.

Context:
{context_section}

Card creation instructions:
- don't make more than 10 cards
- don't use full device IDs, just use TV, laptop etc
- don't use the user's raw user ID, use the provided name
- don't produce raw timestamps
- in the comparison card, use only a few key metrics
- start with overall stats, end with a summary card
- the first card needs to be the most fun as it sets the first impression
- for cards mentioning specific shows/movies, include the exact title(s) in metrics using keys like "featured_titles": ["Title 1", "Title 2"] or "featured_title": "Title"
- if the user repeated one title heavily, tease them about it (skip if barely any repeats)
- must include a card on taste and personality based on the watch history
- must include a watch-age card: how old (single number, no range) do they watch like?

Return JSON with a "cards" array. Each card must follow this structure:
{{
  "id": "unique string identifier",
  "kind": "summary | stat | record | pattern | comparison | fun",
  "visual_hint": {{
    "icon": "emoji string or null",
    "color": "hex color string or null"
  }},
  "content": {{
    "title": "main title string",
    "subtitle": "subtitle string or null",
    "metrics": {{}},
    "text": {{
      "headline": "headline string",
      "description": "main description text",
      "aside": "small aside text or null"
    }}
  }}
}}

Remember to make it fun and playful, not creepy."#
        )
    }
}

fn build_user_prompt(user: &MediaUser, analysis: &UserAnalysisResult) -> Result<String> {
    let analysis_json = serde_json::to_string_pretty(analysis)?;
    Ok(format!(
        "Create a recap for {}. It should be fun, insightful, playful, and great overall.\n\n{}",
        user.display_name(),
        analysis_json
    ))
}

// ============================================
// Reply Parsing
// ============================================

/// Pulls a card array out of an LLM reply. Accepts an object with a
/// `cards` key, a bare array, or either wrapped in a markdown fence.
pub fn extract_cards(reply: &str) -> Vec<RecapCard> {
    if let Some(cards) = parse_cards(reply.trim()) {
        return cards;
    }

    if let Some(inner) = fenced_block(reply) {
        if let Some(cards) = parse_cards(inner.trim()) {
            return cards;
        }
    }

    // Last resort: the widest [...] span in the reply.
    if let (Some(open), Some(close)) = (reply.find('['), reply.rfind(']')) {
        if open < close {
            if let Some(cards) = parse_cards(&reply[open..=close]) {
                return cards;
            }
        }
    }

    Vec::new()
}

fn parse_cards(text: &str) -> Option<Vec<RecapCard>> {
    let value: Value = serde_json::from_str(text).ok()?;
    let cards = match value {
        Value::Object(mut map) => map.remove("cards")?,
        array @ Value::Array(_) => array,
        _ => return None,
    };
    serde_json::from_value(cards).ok()
}

/// Contents of the first ```json (or plain ```) fence, if any.
fn fenced_block(reply: &str) -> Option<&str> {
    let inner = if reply.contains("```json") {
        reply.split("```json").nth(1)?
    } else {
        reply.split("```").nth(1)?
    };
    inner.split("```").next()
}
