//! Anthropic Messages API client

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::{CompletionRequest, CompletionResponse, LlmClient, LlmError, StopReason, TokenUsage, ToolCall};
use crate::config::LlmConfig;

const API_VERSION: &str = "2023-06-01";

/// Retries after the first attempt for transient failures
const MAX_RETRIES: u32 = 3;

/// Delay before the first retry; doubles on each further retry
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Seconds to wait on a 429 that carries no usable `retry-after`
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Overload, rate-limit, timeout and gateway statuses are worth retrying
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504 | 529)
}

fn backoff(retry: u32) -> Duration {
    Duration::from_millis(INITIAL_BACKOFF_MS << retry.saturating_sub(1).min(10))
}

/// Result of one HTTP round trip
enum Attempt {
    Done(CompletionResponse),
    /// Transient; try again if retries remain
    Retry(LlmError),
    Fail(LlmError),
}

/// Client for Claude models over the Messages API
pub struct AnthropicClient {
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
    max_tokens: u32,
}

impl AnthropicClient {
    /// Create a client from configuration; the key comes from `api-key-env`
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        debug!(model = %config.model, base_url = %config.base_url, "AnthropicClient::from_config: called");
        let api_key = config.get_api_key().map_err(|e| LlmError::Config(e.to_string()))?;
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(LlmError::Network)?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            max_tokens: config.max_tokens,
        })
    }

    /// JSON body for `POST /v1/messages`
    fn request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let messages: Vec<_> = request
            .messages
            .iter()
            .map(|m| serde_json::json!({ "role": m.role, "content": m.content }))
            .collect();

        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": request.max_tokens.min(self.max_tokens),
            "system": request.system_prompt,
            "messages": messages,
        });

        if !request.tools.is_empty() {
            let tools: Vec<_> = request.tools.iter().map(|t| t.to_anthropic_schema()).collect();
            body["tools"] = serde_json::Value::Array(tools);
        }
        if let Some(name) = &request.tool_choice {
            body["tool_choice"] = serde_json::json!({ "type": "tool", "name": name });
        }
        body
    }

    async fn attempt(&self, url: &str, body: &serde_json::Value, last: bool) -> Attempt {
        let response = match self
            .http
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return Attempt::Retry(LlmError::Timeout),
            Err(e) => return Attempt::Retry(LlmError::Network(e)),
        };

        let status = response.status().as_u16();
        if response.status().is_success() {
            return match response.json::<MessagesResponse>().await {
                Ok(parsed) => Attempt::Done(parsed.into()),
                Err(e) => Attempt::Fail(LlmError::InvalidResponse(format!("unreadable response body: {}", e))),
            };
        }

        if status == 429 && last {
            return Attempt::Fail(LlmError::RateLimited {
                retry_after: retry_after(&response),
            });
        }

        let message = response.text().await.unwrap_or_default();
        let error = LlmError::ApiError { status, message };
        if is_retryable_status(status) {
            Attempt::Retry(error)
        } else {
            Attempt::Fail(error)
        }
    }
}

fn retry_after(response: &Response) -> Duration {
    let secs = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
    Duration::from_secs(secs)
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        debug!(model = %self.model, max_tokens = request.max_tokens, "AnthropicClient::complete: called");
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.request_body(&request);

        let mut retry = 0;
        loop {
            match self.attempt(&url, &body, retry == MAX_RETRIES).await {
                Attempt::Done(response) => return Ok(response),
                Attempt::Fail(error) => return Err(error),
                Attempt::Retry(error) if retry == MAX_RETRIES => return Err(error),
                Attempt::Retry(error) => {
                    retry += 1;
                    let delay = backoff(retry);
                    warn!(retry, ?delay, %error, "Transient API failure, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

// Wire types for the Messages API response

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    /// Thinking and any block kinds added later
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

impl From<MessagesResponse> for CompletionResponse {
    fn from(response: MessagesResponse) -> Self {
        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for block in response.content {
            match block {
                ContentBlock::Text { text: part } => text.push_str(&part),
                ContentBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall { id, name, input }),
                ContentBlock::Other => {}
            }
        }

        CompletionResponse {
            content: (!text.is_empty()).then_some(text),
            tool_calls,
            stop_reason: StopReason::from_anthropic(response.stop_reason.as_deref().unwrap_or("end_turn")),
            usage: TokenUsage {
                input_tokens: response.usage.input_tokens,
                output_tokens: response.usage.output_tokens,
            },
        }
    }
}
