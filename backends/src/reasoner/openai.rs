//! OpenAI-compatible multimodal decision client.
//!
//! One chat-completions request per decision: the rendered prompt plus the
//! current screenshot as a data-URL image part. The request carries a hard
//! timeout; expiry surfaces as `DecisionTimeout` so the orchestrator never
//! waits on the model indefinitely.

use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::{json, Value};

use spector_core::api::{DecisionRequest, ModelConfig, ModelReply, Reasoner, Usage, VerifyError};

pub struct HttpReasoner {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    api_key: Option<String>,
}

impl HttpReasoner {
    pub fn new(cfg: &ModelConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.request_timeout_ms))
            .build()?;
        Ok(Self {
            client,
            endpoint: cfg.endpoint.clone(),
            model: cfg.model.clone(),
            max_tokens: cfg.max_tokens,
            temperature: cfg.temperature,
            api_key: cfg.api_key.clone(),
        })
    }

    fn request_body(&self, request: &DecisionRequest) -> Value {
        json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "image_url",
                        "image_url": {
                            "url": format!("data:image/png;base64,{}", request.screenshot_b64)
                        }
                    },
                    {
                        "type": "text",
                        "text": request.prompt
                    }
                ]
            }],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature
        })
    }
}

#[async_trait]
impl Reasoner for HttpReasoner {
    fn name(&self) -> &str {
        "openai-http"
    }

    async fn decide(&self, request: DecisionRequest) -> Result<ModelReply, VerifyError> {
        let mut http = self.client.post(&self.endpoint).json(&self.request_body(&request));
        if let Some(key) = self.api_key.as_deref() {
            http = http.bearer_auth(key);
        }

        let response = http.send().await.map_err(|e| {
            if e.is_timeout() {
                VerifyError::DecisionTimeout
            } else {
                VerifyError::Backend(anyhow!("model endpoint unreachable: {e}"))
            }
        })?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| VerifyError::Backend(anyhow!("model reply was not JSON: {e}")))?;

        if !status.is_success() {
            return Err(VerifyError::Backend(anyhow!(
                "model endpoint returned {status}: {}",
                body["error"]["message"].as_str().unwrap_or("unknown error")
            )));
        }

        let message = &body["choices"][0]["message"];
        // Thinking models put their text under reasoning_content instead.
        let text = message["content"]
            .as_str()
            .filter(|s| !s.is_empty())
            .or_else(|| message["reasoning_content"].as_str())
            .ok_or_else(|| VerifyError::Backend(anyhow!("model reply had no content")))?
            .to_string();

        let usage = Usage {
            tokens_in: body["usage"]["prompt_tokens"].as_u64().unwrap_or(0),
            tokens_out: body["usage"]["completion_tokens"].as_u64().unwrap_or(0),
            tokens_total: body["usage"]["total_tokens"].as_u64().unwrap_or(0),
        };

        tracing::debug!(
            model = %self.model,
            tokens = usage.tokens_total,
            "decision received"
        );
        Ok(ModelReply { text, usage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(endpoint: String) -> ModelConfig {
        ModelConfig {
            endpoint,
            model: "test-model".to_string(),
            max_tokens: 256,
            temperature: 0.0,
            request_timeout_ms: 2_000,
            api_key: None,
        }
    }

    fn request() -> DecisionRequest {
        DecisionRequest {
            prompt: "what next?".to_string(),
            screenshot_b64: "aGk=".to_string(),
        }
    }

    #[tokio::test]
    async fn parses_content_and_usage() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("content-type", "application/json")
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "choices": [{"message": {"content": "{\"action\": {\"type\": \"wait\", \"ms\": 10}}"}}],
                    "usage": {"prompt_tokens": 900, "completion_tokens": 30, "total_tokens": 930}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let reasoner =
            HttpReasoner::new(&cfg(format!("{}/v1/chat/completions", server.url()))).unwrap();
        let reply = reasoner.decide(request()).await.unwrap();

        mock.assert_async().await;
        assert!(reply.text.contains("wait"));
        assert_eq!(reply.usage.tokens_in, 900);
        assert_eq!(reply.usage.tokens_total, 930);
    }

    #[tokio::test]
    async fn falls_back_to_reasoning_content() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "choices": [{"message": {"content": "", "reasoning_content": "thinking text"}}]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let reasoner =
            HttpReasoner::new(&cfg(format!("{}/v1/chat/completions", server.url()))).unwrap();
        let reply = reasoner.decide(request()).await.unwrap();
        assert_eq!(reply.text, "thinking text");
        assert_eq!(reply.usage.tokens_total, 0);
    }

    #[tokio::test]
    async fn server_error_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(500)
            .with_body(r#"{"error": {"message": "model is loading"}}"#)
            .create_async()
            .await;

        let reasoner =
            HttpReasoner::new(&cfg(format!("{}/v1/chat/completions", server.url()))).unwrap();
        let err = reasoner.decide(request()).await.unwrap_err();
        assert!(err.to_string().contains("model is loading"));
    }

    #[tokio::test]
    async fn missing_content_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices": []}"#)
            .create_async()
            .await;

        let reasoner =
            HttpReasoner::new(&cfg(format!("{}/v1/chat/completions", server.url()))).unwrap();
        let err = reasoner.decide(request()).await.unwrap_err();
        assert!(err.to_string().contains("no content"));
    }
}
