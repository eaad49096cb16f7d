use crate::domain::errors::AiError;
use crate::domain::ports::{ChatTurn, CompletionClient};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const MAX_REPLY_TOKENS: u32 = 800;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

// Thin reqwest client for an OpenAI-compatible chat completions endpoint.
#[derive(Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl LlmClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl CompletionClient for LlmClient {
    async fn complete(&self, messages: Vec<ChatTurn>) -> Result<String, AiError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = CompletionRequest {
            model: &self.model,
            messages: messages
                .iter()
                .map(|turn| ChatMessage {
                    role: turn.role.as_str(),
                    content: &turn.content,
                })
                .collect(),
            max_tokens: MAX_REPLY_TOKENS,
            temperature: 0.2,
        };

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(AiError::Upstream(format!("status {}", status.as_u16())));
        }

        let parsed = response
            .json::<CompletionResponse>()
            .await
            .map_err(map_transport_error)?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(AiError::EmptyReply);
        }
        Ok(content)
    }
}

fn map_transport_error(err: reqwest::Error) -> AiError {
    if err.is_timeout() {
        AiError::Timeout
    } else {
        AiError::Upstream(err.to_string())
    }
}

/// Used when no LLM endpoint is configured; every request fails fast.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledAssistant;

#[async_trait]
impl CompletionClient for DisabledAssistant {
    async fn complete(&self, _messages: Vec<ChatTurn>) -> Result<String, AiError> {
        Err(AiError::Disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::ChatRole;
    use axum::{Json, Router, http::StatusCode, routing::post};
    use serde_json::{Value, json};

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub");
        let addr = listener.local_addr().expect("stub addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}/v1")
    }

    fn client(base_url: String) -> LlmClient {
        LlmClient::new(base_url, "test-key", "test-model", Duration::from_secs(2))
            .expect("client")
    }

    #[tokio::test]
    async fn returns_first_choice_content() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["model"], "test-model");
                assert_eq!(body["messages"][0]["role"], "system");
                Json(json!({"choices": [{"message": {"content": "On it."}}]}))
            }),
        );
        let client = client(serve(app).await);

        let reply = client
            .complete(vec![
                ChatTurn::new(ChatRole::System, "rules"),
                ChatTurn::new(ChatRole::User, "build a wall"),
            ])
            .await;
        assert_eq!(reply, Ok("On it.".to_string()));
    }

    #[tokio::test]
    async fn blank_content_is_an_empty_reply() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async { Json(json!({"choices": [{"message": {"content": "  "}}]})) }),
        );
        let reply = client(serve(app).await).complete(Vec::new()).await;
        assert_eq!(reply, Err(AiError::EmptyReply));
    }

    #[tokio::test]
    async fn error_status_is_upstream_failure() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async { StatusCode::TOO_MANY_REQUESTS }),
        );
        let reply = client(serve(app).await).complete(Vec::new()).await;
        assert_eq!(reply, Err(AiError::Upstream("status 429".to_string())));
    }
}
