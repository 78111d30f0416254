use crate::config::ProviderConfig;
use crate::error::AnalysisError;
use crate::model::{AnalysisRequest, AnalysisResult};
use crate::parser;
use crate::providers::VisionProvider;
use log::{debug, error, warn};
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Wraps a provider call with bounded retry and exponential backoff.
///
/// Only retryable outcomes (transport failures, 429, transient 5xx) are
/// retried; auth and client errors are surfaced immediately. Total attempts
/// = `max_retries + 1`.
#[derive(Debug, Clone)]
pub struct RetryingClient {
    max_retries: u32,
    base_delay: Duration,
    backoff_cap: Duration,
}

impl RetryingClient {
    pub fn new(max_retries: u32, base_delay: Duration, backoff_cap: Duration) -> Self {
        RetryingClient {
            max_retries,
            base_delay,
            backoff_cap,
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Self {
        RetryingClient {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_delay_ms),
            backoff_cap: Duration::from_secs(config.backoff_cap_secs),
        }
    }

    /// Run `provider.analyze` with retry, returning the raw text payload.
    pub async fn execute(
        &self,
        provider: &dyn VisionProvider,
        request: &AnalysisRequest,
    ) -> Result<String, AnalysisError> {
        let attempts = self.max_retries + 1;

        for attempt in 1..=attempts {
            debug!(
                "analyzing {} with {} (attempt {}/{})",
                request.file_name,
                provider.provider_name(),
                attempt,
                attempts
            );

            match provider.analyze(request).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() => {
                    if attempt == attempts {
                        error!(
                            "giving up on {} after {} attempts: {}",
                            request.file_name, attempts, e
                        );
                        return Err(AnalysisError::RetriesExhausted);
                    }
                    let delay = self
                        .base_delay
                        .saturating_mul(2u32.saturating_pow(attempt - 1))
                        .min(self.backoff_cap);
                    warn!(
                        "{} failed for {} (attempt {}/{}), retrying in {:?}: {}",
                        provider.provider_name(),
                        request.file_name,
                        attempt,
                        attempts,
                        delay,
                        e
                    );
                    sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(AnalysisError::RetriesExhausted)
    }

    /// Full unit of work for one photo: retrying HTTP exchange, then shared
    /// parsing, folded into an [`AnalysisResult`] with the elapsed duration.
    pub async fn analyze(
        &self,
        provider: &dyn VisionProvider,
        request: &AnalysisRequest,
    ) -> AnalysisResult {
        let start = Instant::now();
        match self.execute(provider, request).await {
            Ok(raw) => {
                let mut result = parser::parse(&raw);
                result.elapsed = start.elapsed();
                result
            }
            Err(e) => AnalysisResult::failure(e.to_string(), start.elapsed()),
        }
    }
}
