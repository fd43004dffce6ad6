//! OpenAI-compatible completion client with retry, timeout and circuit breaker

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use super::client::{CompletionClient, CompletionRequest, CompletionResponse, LlmError, ModelTier};
use super::config::LlmConfig;
use crate::context::Message;
use crate::metrics::METRICS;
use async_trait::async_trait;
use rand::Rng;
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

const MAX_BACKOFF: Duration = Duration::from_secs(60);
const MAX_BACKOFF_EXPONENT: usize = 16;

/// Chat-completions client for any OpenAI-compatible endpoint
pub struct OpenAiCompatClient {
    http: Client,
    config: LlmConfig,
    semaphore: Arc<Semaphore>,
    breaker: Arc<CircuitBreaker>,
}

impl OpenAiCompatClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_requests.max(1)));

        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: config.circuit_breaker_failures,
            reset_timeout: config.breaker_reset_timeout(),
        }));

        Ok(Self {
            http,
            config,
            semaphore,
            breaker,
        })
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Exponential backoff with up to 25% jitter, capped at `MAX_BACKOFF`
    fn calculate_backoff(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT) as u32;
        let base = self
            .config
            .retry_backoff()
            .saturating_mul(2u32.pow(exponent))
            .min(MAX_BACKOFF);
        let jitter_ms = rand::thread_rng().gen_range(0..=base.as_millis() as u64 / 4);
        base + Duration::from_millis(jitter_ms)
    }

    async fn call_api(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = ChatCompletionRequest {
            model: self.config.model_for(request.tier),
            messages: &request.messages,
            max_tokens: request.max_output_tokens,
            temperature: request.temperature,
        };

        let mut req = self.http.post(&self.config.api_url).json(&body);
        if let Some(api_key) = &self.config.api_key {
            req = req.bearer_auth(api_key.expose_secret());
        }

        // The reqwest timeout covers the transfer; this bounds the whole call.
        let response = tokio::time::timeout(self.config.timeout(), req.send())
            .await
            .map_err(|_| LlmError::Timeout(format!("no response after {}ms", self.config.timeout_ms)))?
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(e.to_string())
                } else {
                    LlmError::RequestFailed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let message = format!("Status {}: {}", status, error_text);
            let transient = status.is_server_error()
                || status == StatusCode::REQUEST_TIMEOUT
                || status == StatusCode::TOO_MANY_REQUESTS;
            return Err(if transient {
                LlmError::UpstreamError(message)
            } else {
                LlmError::Rejected(message)
            });
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("No choices in response".to_string()))?;

        Ok(CompletionResponse::text(content))
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompatClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let start = Instant::now();
        let tier = request.tier;

        if self.breaker.is_open(tier) {
            METRICS.record_circuit_open(tier);
            error!("Circuit breaker is open for {} tier", tier);
            return Err(LlmError::CircuitOpen(tier));
        }

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let mut attempt = 0;
        let result = loop {
            attempt += 1;
            match self.call_api(&request).await {
                Ok(response) => {
                    self.breaker.mark_success(tier);
                    METRICS.record_llm_request(tier, true);
                    break Ok(response);
                }
                Err(e) if !e.is_retryable() => {
                    METRICS.record_llm_request(tier, false);
                    error!(
                        "Completion for {} failed and will not be retried: {}",
                        request.task_type, e
                    );
                    break Err(e);
                }
                Err(e) => {
                    self.breaker.mark_failure(tier);
                    METRICS.record_llm_request(tier, false);

                    if attempt > self.config.retry_attempts || self.breaker.is_open(tier) {
                        error!(
                            "Completion for {} failed after {} attempts: {}",
                            request.task_type, attempt, e
                        );
                        break Err(e);
                    }

                    let backoff = self.calculate_backoff(attempt);
                    warn!(
                        "Completion attempt {} for {} failed: {}, retrying in {:?}",
                        attempt, request.task_type, e, backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        };

        METRICS.observe_llm_duration(tier, start.elapsed());
        debug!(
            "Completion for {} on {} tier took {:?}",
            request.task_type,
            tier,
            start.elapsed()
        );
        result
    }
}

// OpenAI-compatible wire types
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    max_tokens: usize,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}
