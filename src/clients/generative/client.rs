use std::fmt;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use tracing::{debug, warn};

use crate::util::redact::redact;

use super::models::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, JsonSchemaFormat, ResponseFormat,
    truncate_error_message,
};
use super::{LlmError, StructuredGenerator, StructuredRequest};

/// OpenAI互換の chat completions エンドポイントに対するクライアント。
///
/// `response_format` に JSON Schema を渡して構造化出力を要求する。
#[derive(Clone)]
pub struct GenerativeClient {
    client: Client,
    base_url: Url,
    api_key: String,
    model: String,
}

impl fmt::Debug for GenerativeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerativeClient")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl GenerativeClient {
    /// # Errors
    /// ベースURLが不正、またはHTTPクライアントの構築に失敗した場合。
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build generative client")?;

        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let base_url = Url::parse(&base_url).context("invalid generative base URL")?;

        Ok(Self {
            client,
            base_url,
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    fn completions_url(&self) -> Result<Url, LlmError> {
        self.base_url
            .join("chat/completions")
            .map_err(|e| LlmError::Connection(format!("failed to build completions URL: {e}")))
    }
}

fn classify_transport_error(error: &reqwest::Error) -> LlmError {
    if error.is_timeout() {
        LlmError::Timeout
    } else {
        LlmError::Connection(error.to_string())
    }
}

#[async_trait]
impl StructuredGenerator for GenerativeClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &StructuredRequest<'_>) -> Result<String, LlmError> {
        let url = self.completions_url()?;
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: request.system,
                },
                ChatMessage {
                    role: "user",
                    content: request.user,
                },
            ],
            response_format: ResponseFormat {
                kind: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: request.schema_name,
                    schema: request.schema,
                },
            },
        };

        debug!(
            model = %self.model,
            schema = request.schema_name,
            user_chars = request.user.chars().count(),
            "sending structured generation request"
        );

        let started = Instant::now();
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!(model = %self.model, "generative service rate limited the request");
            return Err(LlmError::RateLimited);
        }
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: truncate_error_message(&message),
            });
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        if let Some(usage) = &parsed.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                elapsed_ms = started.elapsed().as_millis(),
                "structured generation completed"
            );
        }

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("response contained no choices".into()))?;

        if choice.finish_reason.as_deref() == Some("length") {
            warn!(model = %self.model, "generation stopped at the token limit");
        }

        choice
            .message
            .content
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| LlmError::InvalidResponse("choice carried no content".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> GenerativeClient {
        GenerativeClient::new(
            format!("{}/openai/v1", server.uri()),
            "gsk_test_key",
            "test-model",
            Duration::from_secs(5),
        )
        .expect("client builds")
    }

    fn request(schema: &serde_json::Value) -> StructuredRequest<'_> {
        StructuredRequest {
            system: "system prompt",
            user: "rainy day",
            schema_name: "candidate_tracks",
            schema,
        }
    }

    #[tokio::test]
    async fn returns_first_choice_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/v1/chat/completions"))
            .and(header("authorization", "Bearer gsk_test_key"))
            .and(body_partial_json(json!({
                "model": "test-model",
                "response_format": {
                    "type": "json_schema",
                    "json_schema": { "name": "candidate_tracks" }
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [
                    { "message": { "content": "{\"tracks\":[]}" }, "finish_reason": "stop" }
                ],
                "usage": { "prompt_tokens": 10, "completion_tokens": 4 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let schema = json!({ "type": "object" });
        let content = client_for(&server)
            .generate(&request(&schema))
            .await
            .expect("generation succeeds");

        assert_eq!(content, "{\"tracks\":[]}");
    }

    #[tokio::test]
    async fn maps_rate_limit_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let schema = json!({ "type": "object" });
        let error = client_for(&server)
            .generate(&request(&schema))
            .await
            .expect_err("rate limit surfaces");

        assert!(matches!(error, LlmError::RateLimited));
    }

    #[tokio::test]
    async fn maps_server_errors_with_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let schema = json!({ "type": "object" });
        let error = client_for(&server)
            .generate(&request(&schema))
            .await
            .expect_err("server error surfaces");

        match error {
            LlmError::Api { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "overloaded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_choices_are_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let schema = json!({ "type": "object" });
        let error = client_for(&server)
            .generate(&request(&schema))
            .await
            .expect_err("no choices");

        assert!(matches!(error, LlmError::InvalidResponse(_)));
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let client = GenerativeClient::new(
            "http://localhost",
            "gsk_secret_value",
            "m",
            Duration::from_secs(1),
        )
        .expect("client builds");
        let rendered = format!("{client:?}");
        assert!(!rendered.contains("gsk_secret_value"));
        assert!(rendered.contains("gsk_***"));
    }
}
