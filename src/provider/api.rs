use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{info, warn};

use super::{EditRequest, Provider, ProviderError};
use crate::config::{LlmProvider, LlmProviderConfig};
use crate::llm::{self, ImagePart, ResolvedProvider};
use crate::model::Response;
use crate::parser;
use crate::prompt::{self, PromptContext, SYSTEM_PROMPT};
use crate::util;

/// Exponential backoff for transient API failures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub base: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            base: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Statuses worth another attempt: rate limiting and server hiccups.
    pub fn is_retryable(status: StatusCode) -> bool {
        matches!(status.as_u16(), 429 | 500 | 503)
    }

    /// Delay before retry number `retry` (0-based).
    pub fn delay(&self, retry: u32) -> Duration {
        let exp = i32::try_from(retry).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.base.powi(exp);
        if secs.is_finite() && secs < self.max_delay.as_secs_f64() {
            Duration::from_secs_f64(secs)
        } else {
            self.max_delay
        }
    }
}

/// Remote vision API: the image travels base64-encoded inside the request.
pub struct ApiProvider {
    client: reqwest::Client,
    resolved: ResolvedProvider,
    retry: RetryPolicy,
}

impl ApiProvider {
    pub fn from_config(config: &LlmProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(120))
                .build()?,
            resolved: ResolvedProvider::from_config(config)?,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn model(&self) -> &str {
        &self.resolved.model
    }

    async fn run(&self, request: &EditRequest) -> Result<Response, ProviderError> {
        request.ensure_image()?;
        let bytes = tokio::fs::read(&request.image_path).await?;
        let encoded = util::base64_encode(&bytes);
        let existing = request.existing_xmp().await?;
        let prompt = prompt::build_prompt(&PromptContext {
            image_path: None,
            existing_xmp: existing.as_deref(),
        });
        let image = ImagePart {
            mime: util::image_mime(&request.image_path),
            base64: &encoded,
        };

        info!(
            provider = self.name(),
            model = self.model(),
            image = %request.image_path.display(),
            "invoking vision API"
        );
        let json = self.send(&prompt, image).await?;
        let text = llm::extract_text(self.resolved.provider, &json)?;
        Ok(parser::parse_response(&text)?)
    }

    async fn send(&self, prompt: &str, image: ImagePart<'_>) -> Result<Value, ProviderError> {
        let mut retry = 0;
        loop {
            let response = llm::build_request(&self.client, &self.resolved, SYSTEM_PROMPT, prompt, image)
                .send()
                .await?;
            let status = response.status();
            if status.is_success() {
                return Ok(response.json::<Value>().await?);
            }
            let body = response.text().await.unwrap_or_default();
            if RetryPolicy::is_retryable(status) && retry + 1 < self.retry.attempts {
                let delay = self.retry.delay(retry);
                warn!(status = status.as_u16(), ?delay, attempt = retry + 1, "API call failed, retrying");
                tokio::time::sleep(delay).await;
                retry += 1;
                continue;
            }
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }
    }
}

impl Provider for ApiProvider {
    fn name(&self) -> &str {
        match self.resolved.provider {
            LlmProvider::Anthropic => "anthropic",
            LlmProvider::OpenAiCompatible => "openai-compatible",
            LlmProvider::Gemini => "gemini-api",
        }
    }

    fn suggest<'a>(&'a self, request: &'a EditRequest) -> BoxFuture<'a, Result<Response, ProviderError>> {
        self.run(request).boxed()
    }
}
