use crate::embeddings::endpoint_url;
use crate::error::ProviderError;
use crate::traits::LanguageModel;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error};
use url::Url;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
    pub stop_sequences: Vec<String>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.5,
            max_tokens: 4_096,
            stop_sequences: vec!["\n\nHuman".to_string()],
        }
    }
}

/// What a provider handed back: plain text, or a structured payload that
/// still has to be coerced into an answer.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Text(String),
    Structured(Value),
}

impl Completion {
    pub fn into_text(self) -> Option<String> {
        match self {
            Self::Text(text) => Some(text),
            Self::Structured(value) => ["result", "output", "text", "completion"]
                .iter()
                .find_map(|field| value.get(*field).and_then(Value::as_str))
                .map(str::to_string),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpChatModelConfig {
    /// Base URL of an OpenAI-compatible API, e.g. `https://api.openai.com/v1/`.
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct HttpChatModel {
    client: Client,
    endpoint: Url,
    config: HttpChatModelConfig,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "no_stop_sequences")]
    stop: &'a [String],
}

fn no_stop_sequences(stop: &&[String]) -> bool {
    stop.is_empty()
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

impl HttpChatModel {
    const PROVIDER: &'static str = "chat";

    pub fn new(config: HttpChatModelConfig) -> Result<Self, ProviderError> {
        let endpoint = endpoint_url(&config.base_url, "chat/completions")?;
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            config,
        })
    }
}

fn parse_chat_response(payload: Value) -> Completion {
    match payload
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
    {
        Some(content) => Completion::Text(content.to_string()),
        None => Completion::Structured(payload),
    }
}

#[async_trait]
impl LanguageModel for HttpChatModel {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn complete(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<Completion, ProviderError> {
        debug!(
            provider = Self::PROVIDER,
            model = %self.config.model,
            prompt_len = prompt.len(),
            "requesting completion"
        );

        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            stop: &params.stop_sequences,
        };

        let mut request = self.client.post(self.endpoint.clone()).json(&body);
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|error| {
            error!(provider = Self::PROVIDER, %error, "request failed");
            ProviderError::Request {
                provider: Self::PROVIDER.to_string(),
                details: error.to_string(),
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            let details = serde_json::from_str::<Value>(&details)
                .ok()
                .and_then(|value| {
                    value
                        .pointer("/error/message")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .unwrap_or(details);
            error!(provider = Self::PROVIDER, %status, "completion endpoint rejected request");
            return Err(ProviderError::Status {
                provider: Self::PROVIDER.to_string(),
                status: status.as_u16(),
                details,
            });
        }

        let payload: Value = response.json().await?;
        Ok(parse_chat_response(payload))
    }
}

/// Stand-in model for wiring checks: echoes the tail of the prompt.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoModel;

#[async_trait]
impl LanguageModel for EchoModel {
    fn model_name(&self) -> &str {
        "echo"
    }

    async fn complete(
        &self,
        prompt: &str,
        _params: &GenerationParams,
    ) -> Result<Completion, ProviderError> {
        Ok(Completion::Structured(json!({
            "result": prompt.lines().rev().find(|line| !line.trim().is_empty()).unwrap_or_default(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_content_is_returned_verbatim() {
        let payload = json!({"choices": [{"message": {"role": "assistant", "content": "  thirty days\n"}}]});
        assert_eq!(
            parse_chat_response(payload),
            Completion::Text("  thirty days\n".to_string())
        );
    }

    #[test]
    fn structured_completions_are_coerced() {
        let payload = json!({"choices": []});
        let completion = parse_chat_response(payload);
        assert!(matches!(completion, Completion::Structured(_)));
        assert_eq!(completion.into_text(), None);

        let completion = Completion::Structured(json!({"output": "from output"}));
        assert_eq!(completion.into_text().as_deref(), Some("from output"));
    }

    #[test]
    fn chat_request_omits_empty_stop_list() {
        let stop: Vec<String> = Vec::new();
        let body = ChatRequest {
            model: "m",
            messages: vec![ChatMessage {
                role: "user",
                content: "hi",
            }],
            temperature: 0.5,
            max_tokens: 10,
            stop: &stop,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert!(value.get("stop").is_none());
    }

    #[tokio::test]
    async fn echo_model_returns_last_prompt_line() {
        let completion = EchoModel
            .complete("context\nQuestion = why?\n\n", &GenerationParams::default())
            .await
            .unwrap();
        assert_eq!(completion.into_text().as_deref(), Some("Question = why?"));
    }
}
