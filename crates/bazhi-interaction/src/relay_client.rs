//! RelayClient - REST client for the hosted chat-completions relay.
//!
//! The relay proxies an OpenAI-style chat-completions endpoint and holds the
//! provider credentials server-side, so no API key ever leaves this client.

use async_trait::async_trait;
use bazhi_core::completion::{ChatCompletion, CompletionRequest};
use bazhi_core::session::TurnRole;
use bazhi_core::{GuruError, Result};
use bazhi_infrastructure::AppConfig;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

/// Client for the chat-completions relay.
#[derive(Clone)]
pub struct RelayClient {
    client: Client,
    relay_url: String,
    model: String,
}

impl RelayClient {
    /// Creates a client from the application configuration.
    ///
    /// # Returns
    /// * `Ok(RelayClient)` - Ready-to-use client with the configured timeout
    /// * `Err(GuruError::Internal)` - If the underlying HTTP client cannot be built
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|err| GuruError::internal(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            relay_url: config.relay_url.clone(),
            model: config.model_name.clone(),
        })
    }

    fn build_messages(&self, request: &CompletionRequest) -> Vec<WireMessage> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);

        if !request.system_prompt.trim().is_empty() {
            messages.push(WireMessage {
                role: "system",
                content: request.system_prompt.clone(),
            });
        }

        for turn in &request.messages {
            messages.push(WireMessage {
                role: role_name(&turn.role),
                content: turn.content.clone(),
            });
        }

        messages
    }

    async fn send_request(&self, body: &WireRequest) -> Result<String> {
        tracing::debug!(
            model = %body.model,
            messages = body.messages.len(),
            "sending relay request"
        );

        let response = self
            .client
            .post(&self.relay_url)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    GuruError::internal("relay request timed out")
                } else {
                    GuruError::internal(format!("relay request failed: {err}"))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read relay error body".to_string());
            return Err(map_http_error(status, body_text));
        }

        let parsed: WireResponse = response
            .json()
            .await
            .map_err(|err| GuruError::internal(format!("failed to parse relay response: {err}")))?;

        extract_text_response(parsed)
    }
}

#[async_trait]
impl ChatCompletion for RelayClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let messages = self.build_messages(&request);

        let body = WireRequest {
            model: self.model.clone(),
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        self.send_request(&body).await
    }
}

fn role_name(role: &TurnRole) -> &'static str {
    match role {
        TurnRole::System => "system",
        TurnRole::User => "user",
        TurnRole::Assistant => "assistant",
    }
}

#[derive(Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
}

#[derive(Deserialize)]
struct WireResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct WireErrorResponse {
    error: WireErrorBody,
}

#[derive(Deserialize)]
struct WireErrorBody {
    message: String,
}

fn extract_text_response(response: WireResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| GuruError::internal("relay returned no content in the response"))
}

fn map_http_error(status: StatusCode, body: String) -> GuruError {
    let message = serde_json::from_str::<WireErrorResponse>(&body)
        .map(|wrapper| wrapper.error.message)
        .unwrap_or(body);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GuruError::internal(format!(
            "relay rejected the request ({status}): {message}"
        )),
        StatusCode::TOO_MANY_REQUESTS => {
            GuruError::internal(format!("relay rate limited the request: {message}"))
        }
        _ if status.is_server_error() => {
            GuruError::internal(format!("relay upstream failure ({status}): {message}"))
        }
        _ => GuruError::internal(format!("relay returned {status}: {message}")),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use bazhi_core::session::ChatTurn;

    fn client() -> RelayClient {
        RelayClient::new(&AppConfig::default()).unwrap()
    }

    #[test]
    fn wire_request_matches_relay_shape() {
        let request = CompletionRequest::new(
            "You are a translator.",
            vec![ChatTurn::user("Hello")],
            0.3,
            2000,
        );
        let client = client();
        let body = WireRequest {
            model: client.model.clone(),
            messages: client.build_messages(&request),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["model"], "deepseek-chat");
        assert_eq!(value["temperature"], 0.3);
        assert_eq!(value["max_tokens"], 2000);
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][0]["content"], "You are a translator.");
        assert_eq!(value["messages"][1]["role"], "user");
        assert_eq!(value["messages"][1]["content"], "Hello");
    }

    #[test]
    fn empty_system_prompt_is_omitted_from_messages() {
        let request = CompletionRequest::new("  ", vec![ChatTurn::user("ping")], 0.7, 100);
        let messages = client().build_messages(&request);

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "user");
    }

    #[test]
    fn extract_text_returns_first_choice_content() {
        let response = WireResponse {
            choices: vec![WireChoice {
                message: WireResponseMessage {
                    content: Some("你好".to_string()),
                },
            }],
        };

        assert_eq!(extract_text_response(response).unwrap(), "你好");
    }

    #[test]
    fn empty_or_missing_content_is_an_error() {
        let missing = WireResponse {
            choices: vec![WireChoice {
                message: WireResponseMessage { content: None },
            }],
        };
        assert!(extract_text_response(missing).is_err());

        let blank = WireResponse {
            choices: vec![WireChoice {
                message: WireResponseMessage {
                    content: Some("   ".to_string()),
                },
            }],
        };
        assert!(extract_text_response(blank).is_err());
    }

    #[test]
    fn http_error_prefers_structured_message() {
        let body = r#"{"error": {"message": "quota exhausted"}}"#.to_string();
        let err = map_http_error(StatusCode::TOO_MANY_REQUESTS, body);
        assert!(err.to_string().contains("quota exhausted"));
        assert!(err.to_string().contains("rate limited"));

        let err = map_http_error(StatusCode::BAD_GATEWAY, "plain text".to_string());
        assert!(err.to_string().contains("upstream failure"));
        assert!(err.to_string().contains("plain text"));
    }
}
