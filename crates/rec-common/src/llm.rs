use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Clone, Debug)]
pub struct LlmClientConfig {
    pub base_url: String,
    /// API keys rotated round-robin across requests. Empty means
    /// unauthenticated (e.g. a local OpenAI-compatible host).
    pub api_keys: Vec<String>,
    pub model: String,
    pub default_timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_error_body_bytes: usize,
}

impl LlmClientConfig {
    pub fn from_env() -> Self {
        let base_url = std::env::var("LLM_BASE_URL")
            .unwrap_or_else(|_| "https://api.groq.com/openai/v1".to_string());

        let api_keys = std::env::var("LLM_API_KEYS")
            .map(|raw| {
                raw.split(',')
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let model = std::env::var("LLM_MODEL")
            .unwrap_or_else(|_| "meta-llama/llama-4-scout-17b-16e-instruct".to_string());

        let default_timeout = std::env::var("LLM_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(30));

        let max_retries = std::env::var("LLM_MAX_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(2);

        let initial_backoff = std::env::var("LLM_RETRY_INITIAL_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or_else(|| Duration::from_millis(200));

        let max_backoff = std::env::var("LLM_RETRY_MAX_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or_else(|| Duration::from_millis(5_000));

        let max_error_body_bytes = std::env::var("LLM_MAX_ERROR_BODY_BYTES")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(8 * 1024);

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_keys,
            model,
            default_timeout,
            max_retries,
            initial_backoff,
            max_backoff,
            max_error_body_bytes,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmClientError {
    /// Transport failure (`status: None`) or non-success status from the
    /// model endpoint.
    #[error("language model unavailable: {message}")]
    UpstreamUnavailable {
        status: Option<StatusCode>,
        message: String,
    },

    /// Transport succeeded but the response body lacks
    /// `choices[0].message.content`.
    #[error("language model response is missing message content")]
    MalformedUpstreamShape,

    /// The message content was returned but is not valid JSON.
    #[error("language model returned malformed JSON: {0}")]
    MalformedUpstreamPayload(#[source] serde_json::Error),
}

impl From<reqwest::Error> for LlmClientError {
    fn from(e: reqwest::Error) -> Self {
        LlmClientError::UpstreamUnavailable {
            status: None,
            message: e.to_string(),
        }
    }
}

/// One-shot prompt/response client for an OpenAI-compatible chat endpoint.
///
/// `invoke` sends a single user message with JSON response formatting and
/// strictly decodes the assistant's text as a JSON object. The client is
/// stateless apart from the key-rotation cursor and safe to share across
/// tasks.
pub struct LlmClient {
    config: LlmClientConfig,
    http: reqwest::Client,
    key_cursor: AtomicUsize,
}

impl LlmClient {
    pub fn new(config: LlmClientConfig) -> Result<Self, LlmClientError> {
        let http = reqwest::Client::builder()
            .user_agent("book-recommender/llm")
            .build()?;
        Ok(Self {
            config,
            http,
            key_cursor: AtomicUsize::new(0),
        })
    }

    pub fn config(&self) -> &LlmClientConfig {
        &self.config
    }

    fn next_api_key(&self) -> Option<&str> {
        if self.config.api_keys.is_empty() {
            return None;
        }
        let i = self.key_cursor.fetch_add(1, Ordering::Relaxed);
        Some(self.config.api_keys[i % self.config.api_keys.len()].as_str())
    }

    /// Send one fully-composed instruction and decode the reply as JSON.
    ///
    /// Retry/backoff applies only to transport failures, 429s, and 5xx
    /// statuses; malformed replies are terminal immediately. On exhaustion
    /// the last error is surfaced unchanged.
    pub async fn invoke(
        &self,
        instruction: &str,
    ) -> Result<serde_json::Value, LlmClientError> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: instruction.to_string(),
            }],
            temperature: Some(0.3),
            max_tokens: Some(1024),
            top_p: Some(1.0),
            stream: Some(false),
            response_format: Some(ResponseFormat {
                r#type: "json_object".to_string(),
            }),
        };

        self.request_with_retry(|| {
            let req = request.clone();
            let url = url.clone();
            async move {
                let mut builder = self
                    .http
                    .post(&url)
                    .timeout(self.config.default_timeout)
                    .json(&req);
                if let Some(key) = self.next_api_key() {
                    builder = builder.bearer_auth(key);
                }
                let resp = builder.send().await?;

                if !resp.status().is_success() {
                    return Err(Self::to_upstream_error(
                        resp,
                        self.config.max_error_body_bytes,
                    )
                    .await);
                }

                let body = resp.json::<ChatCompletionResponse>().await.map_err(|_| {
                    LlmClientError::MalformedUpstreamShape
                })?;
                let content = body
                    .choices
                    .first()
                    .and_then(|c| c.message.content.as_deref())
                    .ok_or(LlmClientError::MalformedUpstreamShape)?;

                serde_json::from_str::<serde_json::Value>(content.trim())
                    .map_err(LlmClientError::MalformedUpstreamPayload)
            }
        })
        .await
    }

    async fn to_upstream_error(
        resp: reqwest::Response,
        max_error_body_bytes: usize,
    ) -> LlmClientError {
        let status = resp.status();
        let body = read_limited_text(resp, max_error_body_bytes).await;
        let message = match serde_json::from_str::<UpstreamErrorEnvelope>(&body) {
            Ok(parsed) => parsed
                .error
                .message
                .unwrap_or_else(|| "unknown upstream error".to_string()),
            Err(_) => body,
        };
        LlmClientError::UpstreamUnavailable {
            status: Some(status),
            message,
        }
    }

    async fn request_with_retry<T, Fut, F>(&self, mut f: F) -> Result<T, LlmClientError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, LlmClientError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match f().await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    if attempt > self.config.max_retries || !should_retry(&e) {
                        return Err(e);
                    }
                    let delay = backoff_delay(
                        self.config.initial_backoff,
                        self.config.max_backoff,
                        attempt - 1,
                    );
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "llm request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

fn should_retry(err: &LlmClientError) -> bool {
    match err {
        LlmClientError::UpstreamUnavailable { status, .. } => match status {
            None => true,
            Some(status) => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
        },
        LlmClientError::MalformedUpstreamShape
        | LlmClientError::MalformedUpstreamPayload(_) => false,
    }
}

fn backoff_delay(initial: Duration, max: Duration, exponent: u32) -> Duration {
    let mult = 1u128.checked_shl(exponent).unwrap_or(u128::MAX);
    let base_ms = initial.as_millis().saturating_mul(mult);
    let capped_ms = std::cmp::min(base_ms, max.as_millis()) as u64;
    let jitter_cap = std::cmp::max(1, capped_ms / 4);
    let jitter_ms = pseudo_jitter_ms(jitter_cap);
    Duration::from_millis(capped_ms.saturating_add(jitter_ms))
}

fn pseudo_jitter_ms(max_inclusive: u64) -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0));
    let nanos = now.subsec_nanos() as u64;
    nanos % (max_inclusive + 1)
}

async fn read_limited_text(resp: reqwest::Response, max_bytes: usize) -> String {
    match resp.bytes().await {
        Ok(mut b) => {
            if b.len() > max_bytes {
                b.truncate(max_bytes);
            }
            String::from_utf8_lossy(&b).to_string()
        }
        Err(e) => {
            warn!(error = %e, "failed to read upstream error body");
            "<failed to read error body>".to_string()
        }
    }
}

#[derive(Debug, Deserialize)]
struct UpstreamErrorEnvelope {
    error: UpstreamErrorObject,
}

#[derive(Debug, Deserialize)]
struct UpstreamErrorObject {
    message: Option<String>,
    #[allow(dead_code)]
    r#type: Option<String>,
    #[allow(dead_code)]
    code: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ResponseFormat {
    r#type: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_rotation_cycles_round_robin() {
        let mut config = LlmClientConfig::from_env();
        config.api_keys = vec!["a".to_string(), "b".to_string()];
        let client = LlmClient::new(config).unwrap();
        assert_eq!(client.next_api_key(), Some("a"));
        assert_eq!(client.next_api_key(), Some("b"));
        assert_eq!(client.next_api_key(), Some("a"));
    }

    #[test]
    fn no_keys_means_unauthenticated() {
        let mut config = LlmClientConfig::from_env();
        config.api_keys = Vec::new();
        let client = LlmClient::new(config).unwrap();
        assert_eq!(client.next_api_key(), None);
    }

    #[test]
    fn malformed_errors_are_not_retried() {
        assert!(!should_retry(&LlmClientError::MalformedUpstreamShape));
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        assert!(!should_retry(&LlmClientError::MalformedUpstreamPayload(
            json_err
        )));
    }

    #[test]
    fn transport_and_server_errors_are_retried() {
        assert!(should_retry(&LlmClientError::UpstreamUnavailable {
            status: None,
            message: "connection refused".to_string(),
        }));
        assert!(should_retry(&LlmClientError::UpstreamUnavailable {
            status: Some(StatusCode::TOO_MANY_REQUESTS),
            message: "rate limited".to_string(),
        }));
        assert!(should_retry(&LlmClientError::UpstreamUnavailable {
            status: Some(StatusCode::BAD_GATEWAY),
            message: "bad gateway".to_string(),
        }));
        assert!(!should_retry(&LlmClientError::UpstreamUnavailable {
            status: Some(StatusCode::BAD_REQUEST),
            message: "bad request".to_string(),
        }));
    }

    #[test]
    fn backoff_delay_is_capped() {
        let d = backoff_delay(
            Duration::from_millis(200),
            Duration::from_millis(1_000),
            10,
        );
        // cap + max 25% jitter
        assert!(d <= Duration::from_millis(1_250));
    }
}
