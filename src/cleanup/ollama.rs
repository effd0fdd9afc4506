//! Ollama chat API cleanup adapter

use crate::cleanup::{build_prompt, strip_wrapping_quotes, TextCleaner};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

// Request types for the Ollama chat API

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

// Response types for the Ollama chat API

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Network-backed cleaner talking to an Ollama-compatible chat endpoint.
pub struct OllamaCleaner {
    endpoint: String,
    model: String,
    default_api_key: String,
    client: reqwest::Client,
}

impl OllamaCleaner {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, default_api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            default_api_key: default_api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.endpoint.trim_end_matches('/'))
    }

    /// The fallible half of the cleanup call; `cleanup` absorbs its errors.
    async fn request_cleanup(&self, raw_text: &str, credential: Option<&str>) -> Result<String> {
        let prompt = build_prompt(raw_text);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
            stream: false,
        };

        let mut request = self.client.post(self.chat_url()).json(&body);

        // Per-request credential wins; empty values fall through to the
        // configured default, and no credential at all sends no auth header.
        let key = credential
            .filter(|k| !k.is_empty())
            .unwrap_or(&self.default_api_key);
        if !key.is_empty() {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| anyhow!("request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("cleanup service returned HTTP {}", status));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("malformed response: {}", e))?;

        let content = parsed
            .message
            .and_then(|m| m.content)
            .unwrap_or_default();
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(anyhow!("cleanup service returned an empty completion"));
        }

        Ok(strip_wrapping_quotes(trimmed).to_string())
    }
}

#[async_trait]
impl TextCleaner for OllamaCleaner {
    /// Best-effort cleanup: empty input is a pure pass-through with no
    /// network call, and every failure returns the raw text unchanged.
    async fn cleanup(&self, raw_text: &str, credential: Option<&str>) -> String {
        if raw_text.trim().is_empty() {
            return raw_text.to_string();
        }

        match self.request_cleanup(raw_text, credential).await {
            Ok(cleaned) => {
                debug!("LLM cleanup succeeded ({} -> {} chars)", raw_text.len(), cleaned.len());
                cleaned
            }
            Err(e) => {
                warn!("LLM cleanup failed, keeping raw transcription: {}", e);
                raw_text.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn chat_reply(content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "model": "gpt-oss:120b",
            "message": { "role": "assistant", "content": content },
            "done": true
        }))
    }

    #[tokio::test]
    async fn test_successful_cleanup_strips_wrapping_quotes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({ "stream": false })))
            .respond_with(chat_reply("\"Hello there.\""))
            .expect(1)
            .mount(&server)
            .await;

        let cleaner = OllamaCleaner::new(server.uri(), "gpt-oss:120b", "");
        let cleaned = cleaner.cleanup("um hello there", None).await;
        assert_eq!(cleaned, "Hello there.");
    }

    #[tokio::test]
    async fn test_per_request_credential_wins_over_default() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(header("authorization", "Bearer request-key"))
            .respond_with(chat_reply("cleaned"))
            .expect(1)
            .mount(&server)
            .await;

        let cleaner = OllamaCleaner::new(server.uri(), "gpt-oss:120b", "default-key");
        let cleaned = cleaner.cleanup("some words", Some("request-key")).await;
        assert_eq!(cleaned, "cleaned");
    }

    #[tokio::test]
    async fn test_default_credential_used_when_none_supplied() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(header("authorization", "Bearer default-key"))
            .respond_with(chat_reply("cleaned"))
            .expect(1)
            .mount(&server)
            .await;

        let cleaner = OllamaCleaner::new(server.uri(), "gpt-oss:120b", "default-key");
        let cleaned = cleaner.cleanup("some words", None).await;
        assert_eq!(cleaned, "cleaned");
    }

    #[tokio::test]
    async fn test_server_error_degrades_to_raw_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let cleaner = OllamaCleaner::new(server.uri(), "gpt-oss:120b", "");
        let raw = "raw transcription text";
        assert_eq!(cleaner.cleanup(raw, None).await, raw);
    }

    #[tokio::test]
    async fn test_empty_completion_degrades_to_raw_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(chat_reply("   "))
            .mount(&server)
            .await;

        let cleaner = OllamaCleaner::new(server.uri(), "gpt-oss:120b", "");
        let raw = "raw transcription text";
        assert_eq!(cleaner.cleanup(raw, None).await, raw);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_degrades_to_raw_text() {
        // Nothing listens here; the connection error must be absorbed.
        let cleaner = OllamaCleaner::new("http://127.0.0.1:1", "gpt-oss:120b", "");
        let raw = "raw transcription text";
        assert_eq!(cleaner.cleanup(raw, None).await, raw);
    }

    #[tokio::test]
    async fn test_blank_input_skips_the_network_entirely() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(chat_reply("should never be called"))
            .expect(0)
            .mount(&server)
            .await;

        let cleaner = OllamaCleaner::new(server.uri(), "gpt-oss:120b", "");
        assert_eq!(cleaner.cleanup("   ", None).await, "   ");
    }
}
