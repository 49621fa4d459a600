//! **ResponseGenerator** — text in, reply text out, via a hosted
//! OpenAI-compatible chat-completions endpoint.
//!
//! Degrade-gracefully policy: `generate` never fails. Any transport error
//! or non-2xx response is absorbed into a locally constructed fallback
//! reply that echoes the transcript, so a turn always completes even with
//! no network connectivity.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{VoiceError, VoiceResult};

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

const SYSTEM_PROMPT: &str = "You are a friendly and helpful voice assistant. \
    Respond naturally and conversationally. Keep responses concise (1-2 sentences) \
    and engaging. Be helpful, informative, and sometimes humorous. Always respond \
    as if you're having a natural conversation.";

/// Token accounting reported by the completion endpoint.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One generated reply. `usage` is absent when the reply came from the
/// local fallback.
#[derive(Debug, Clone)]
pub struct GeneratedReply {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

// OpenAI-compatible request/response shapes.
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: String,
}

/// Client for the remote completion service, one request per turn.
pub struct ResponseGenerator {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl ResponseGenerator {
    /// Create a generator with explicit configuration.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.into(),
            api_key: api_key.into().trim().to_string(),
            model: model.into(),
            client,
        }
    }

    /// Build from environment: `MURMUR_API_BASE`, `MURMUR_API_KEY` (or
    /// `OPENAI_API_KEY` / `OPENROUTER_API_KEY`), `MURMUR_MODEL`.
    pub fn from_env() -> VoiceResult<Self> {
        let base_url = std::env::var("MURMUR_API_BASE")
            .unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        let api_key = std::env::var("MURMUR_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .or_else(|_| std::env::var("OPENROUTER_API_KEY"))
            .map_err(|_| {
                VoiceError::Config(
                    "response generation requires MURMUR_API_KEY, OPENAI_API_KEY, or OPENROUTER_API_KEY"
                        .to_string(),
                )
            })?;
        let model = std::env::var("MURMUR_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Ok(Self::new(base_url, api_key, model))
    }

    /// An intentionally unconfigured generator: every call takes the
    /// fallback path. Lets the demo run with no credentials at all.
    pub fn offline() -> Self {
        Self::new(DEFAULT_API_BASE, "", DEFAULT_MODEL)
    }

    /// Generate a reply for the transcript. Never fails: on any remote
    /// error the fallback echo reply is returned instead.
    pub async fn generate(&self, prompt: &str) -> GeneratedReply {
        if self.api_key.is_empty() {
            debug!("no API key configured, using local fallback reply");
            return GeneratedReply {
                text: fallback_reply(prompt),
                usage: None,
            };
        }
        match self.request(prompt).await {
            Ok(reply) => reply,
            Err(reason) => {
                warn!(%reason, "completion request failed, using local fallback reply");
                GeneratedReply {
                    text: fallback_reply(prompt),
                    usage: None,
                }
            }
        }
    }

    async fn request(&self, prompt: &str) -> Result<GeneratedReply, String> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: Some(0.8),
            max_tokens: Some(100),
        };

        let res = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("completion request failed: {e}"))?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("completion API error {status}: {body}"));
        }

        let parsed: ChatResponse = res
            .json()
            .await
            .map_err(|e| format!("completion response parse failed: {e}"))?;

        let text = parsed
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .unwrap_or_else(|| "Sorry, I could not generate a response.".to_string());

        Ok(GeneratedReply {
            text,
            usage: parsed.usage,
        })
    }
}

/// Locally constructed reply that echoes the transcript. Used whenever the
/// remote endpoint cannot be reached or rejects the request.
fn fallback_reply(prompt: &str) -> String {
    format!(
        "I received your message: \"{prompt}\". This is a demo response since the \
         completion API is not configured. In a production environment, this would \
         be a real AI-generated response based on your input. The system is designed \
         to process speech locally and only use the network for the AI response \
         generation."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_endpoint_falls_back_to_echo() {
        // Nothing listens on this port; the request fails at transport level.
        let generator = ResponseGenerator::new("http://127.0.0.1:9", "test-key", DEFAULT_MODEL);
        let reply = generator.generate("How are you?").await;
        assert!(!reply.text.is_empty());
        assert!(reply.text.contains("How are you?"));
        assert!(reply.usage.is_none());
    }

    #[tokio::test]
    async fn missing_key_short_circuits_to_fallback() {
        let generator = ResponseGenerator::offline();
        let reply = generator.generate("Tell me a joke").await;
        assert!(reply.text.contains("Tell me a joke"));
        assert!(reply.usage.is_none());
    }

    #[test]
    fn request_body_omits_unset_options() {
        let body = ChatRequest {
            model: DEFAULT_MODEL.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: "hi".to_string(),
            }],
            temperature: None,
            max_tokens: Some(100),
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(!json.contains("temperature"));
        assert!(json.contains("\"max_tokens\":100"));
    }
}
