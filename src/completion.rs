//! Completion providers.
//!
//! The answer orchestrator only sees [`CompletionProvider`]; the concrete
//! backend is picked once by [`create_provider`] from `completion.provider`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::CompletionConfig;
use crate::error::{Error, Result};

const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

/// One single-turn generation request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub model: String,
    pub max_output_tokens: u32,
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Return the generated text. Empty output is an error.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {}", e)))
}

fn api_key(var: &str) -> Result<String> {
    std::env::var(var)
        .ok()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .ok_or_else(|| Error::Provider(format!("{} environment variable not set", var)))
}

async fn send_json<B: Serialize + ?Sized>(
    client: &reqwest::Client,
    url: &str,
    headers: HeaderMap,
    body: &B,
    backend: &str,
) -> Result<String> {
    let resp = client
        .post(url)
        .headers(headers)
        .json(body)
        .send()
        .await
        .map_err(|e| Error::Provider(format!("failed to call {}: {}", backend, e)))?;

    let status = resp.status();
    let text = resp
        .text()
        .await
        .unwrap_or_else(|_| "<body unavailable>".to_string());
    if !status.is_success() {
        return Err(Error::Provider(format!(
            "{} returned {}: {}",
            backend, status, text
        )));
    }
    Ok(text)
}

// ============ Anthropic ============

pub struct AnthropicProvider {
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Requires `ANTHROPIC_API_KEY`.
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        Ok(Self {
            api_key: api_key("ANTHROPIC_API_KEY")?,
            client: http_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl CompletionProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|_| Error::Provider("invalid Anthropic API key".to_string()))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let body = AnthropicRequest {
            model: &request.model,
            max_tokens: request.max_output_tokens,
            system: &request.system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: vec![AnthropicContentBlock {
                    kind: "text",
                    text: &request.user,
                }],
            }],
        };

        debug!(model = %request.model, system_chars = request.system.len(), "calling Anthropic");
        let text = send_json(&self.client, ANTHROPIC_URL, headers, &body, "Anthropic").await?;
        parse_anthropic_response(&text)
    }
}

/// Join every text block of a Messages API response.
pub fn parse_anthropic_response(body: &str) -> Result<String> {
    let parsed: AnthropicResponse = serde_json::from_str(body)
        .map_err(|e| Error::Provider(format!("failed to parse Anthropic response: {}", e)))?;
    let answer = parsed
        .content
        .into_iter()
        .filter_map(|block| match block {
            AnthropicResponseBlock::Text { text } => Some(text),
            AnthropicResponseBlock::Other => None,
        })
        .collect::<Vec<_>>()
        .join("\n");
    if answer.trim().is_empty() {
        return Err(Error::Provider(
            "Anthropic response missing text content".to_string(),
        ));
    }
    Ok(answer)
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: Vec<AnthropicContentBlock<'a>>,
}

#[derive(Serialize)]
struct AnthropicContentBlock<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicResponseBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicResponseBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

// ============ OpenAI ============

pub struct OpenAIProvider {
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIProvider {
    /// Requires `OPENAI_API_KEY`.
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        Ok(Self {
            api_key: api_key("OPENAI_API_KEY")?,
            client: http_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|_| Error::Provider("invalid OpenAI API key".to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let body = ChatRequest {
            model: &request.model,
            max_tokens: request.max_output_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
        };

        debug!(model = %request.model, system_chars = request.system.len(), "calling OpenAI");
        let text = send_json(&self.client, OPENAI_CHAT_URL, headers, &body, "OpenAI").await?;
        parse_chat_response(&text)
    }
}

/// First choice's message content of a chat completions response.
pub fn parse_chat_response(body: &str) -> Result<String> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| Error::Provider(format!("failed to parse OpenAI response: {}", e)))?;
    parsed
        .choices
        .into_iter()
        .find_map(|choice| choice.message.content)
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| Error::Provider("OpenAI response missing message content".to_string()))
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Build the backend named by `completion.provider`.
pub fn create_provider(config: &CompletionConfig) -> Result<Arc<dyn CompletionProvider>> {
    match config.provider.as_str() {
        "anthropic" => Ok(Arc::new(AnthropicProvider::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIProvider::new(config)?)),
        other => Err(Error::Configuration(format!(
            "Unknown completion provider: '{}'. Must be anthropic or openai.",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anthropic_text_blocks_are_joined() {
        let body = r#"{
            "id": "msg_1",
            "content": [
                {"type": "text", "text": "Look, focus wins."},
                {"type": "tool_use", "id": "t1", "name": "x", "input": {}},
                {"type": "text", "text": "Cut the rest."}
            ]
        }"#;
        assert_eq!(
            parse_anthropic_response(body).unwrap(),
            "Look, focus wins.\nCut the rest."
        );
    }

    #[test]
    fn test_anthropic_empty_content_is_error() {
        let err = parse_anthropic_response(r#"{"content": []}"#).unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
    }

    #[test]
    fn test_chat_response_first_choice() {
        let body = r#"{"choices": [
            {"message": {"role": "assistant", "content": "Ship it."}},
            {"message": {"role": "assistant", "content": "Other."}}
        ]}"#;
        assert_eq!(parse_chat_response(body).unwrap(), "Ship it.");
    }

    #[test]
    fn test_chat_response_null_content_is_error() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": null}}]}"#;
        assert!(matches!(
            parse_chat_response(body).unwrap_err(),
            Error::Provider(_)
        ));
    }

    #[test]
    fn test_malformed_body_is_provider_error() {
        assert!(matches!(
            parse_chat_response("not json").unwrap_err(),
            Error::Provider(_)
        ));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let config = CompletionConfig {
            provider: "cohere".to_string(),
            ..CompletionConfig::default()
        };
        let err = create_provider(&config).err().unwrap();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
