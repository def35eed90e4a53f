//! Embedding with bounded retry on throttling
//!
//! [`Embedder`] wraps an [`EmbeddingProvider`] and retries only rate-limit failures,
//! backing off exponentially with a random stretch factor. Any other failure gives up
//! immediately.

use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::providers::EmbeddingProvider;

/// Backoff schedule for throttled embedding calls
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    /// Each delay is scaled by a factor drawn from `[low, high)`
    pub jitter: (f64, f64),
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            jitter: (1.0, 1.5),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: config.initial_delay(),
            multiplier: config.delay_multiplier.max(1.0),
            ..Self::default()
        }
    }

    /// Undithered delay before retry number `retry` (0-based)
    pub fn base_delay(&self, retry: u32) -> Duration {
        let factor = self.multiplier.powi(retry.min(32) as i32);
        saturating_secs(self.initial_delay.as_secs_f64() * factor)
    }

    /// Delay before retry `retry`, never shorter than `previous`
    pub fn delay_for_retry<R: Rng>(&self, retry: u32, previous: Duration, rng: &mut R) -> Duration {
        let (low, high) = self.jitter;
        let stretch = if high > low { rng.gen_range(low..high) } else { low };
        let delay = saturating_secs(self.base_delay(retry).as_secs_f64() * stretch);
        delay.max(previous)
    }
}

/// Large multipliers overflow `Duration`; clamp instead of panicking
fn saturating_secs(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
}

/// Why an embedding could not be produced
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EmbedFailure {
    /// Every attempt was throttled
    RateLimitExhausted {
        attempts: u32,
        #[serde(skip)]
        delays: Vec<Duration>,
    },
    /// Non-retryable provider error
    Provider { message: String },
}

impl std::fmt::Display for EmbedFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbedFailure::RateLimitExhausted { attempts, .. } => {
                write!(f, "rate limited on all {} attempts", attempts)
            }
            EmbedFailure::Provider { message } => write!(f, "{}", message),
        }
    }
}

/// Embedding client with throttling retry
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    policy: RetryPolicy,
}

impl Embedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, policy: RetryPolicy) -> Self {
        Self { provider, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Embed `text`, reporting why when no vector could be produced
    pub async fn try_embed(&self, text: &str) -> Result<Vec<f32>, EmbedFailure> {
        let mut retries = 0u32;
        let mut delays = Vec::new();
        let mut previous = Duration::ZERO;

        loop {
            match self.provider.embed(text).await {
                Ok(vector) => return Ok(vector),
                Err(e) if e.is_rate_limited() => {
                    if retries >= self.policy.max_retries {
                        tracing::warn!(
                            "Embedding still throttled after {} attempts, giving up",
                            retries + 1
                        );
                        return Err(EmbedFailure::RateLimitExhausted {
                            attempts: retries + 1,
                            delays,
                        });
                    }
                    let delay =
                        self.policy
                            .delay_for_retry(retries, previous, &mut rand::thread_rng());
                    tracing::debug!(
                        "Embedding throttled ({}), retry {} in {:?}",
                        self.provider.name(),
                        retries + 1,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    delays.push(delay);
                    previous = delay;
                    retries += 1;
                }
                Err(e) => {
                    tracing::warn!("Embedding failed ({}): {}", self.provider.name(), e);
                    return Err(EmbedFailure::Provider {
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    /// Embed `text`; `None` when retries are exhausted or the provider failed
    pub async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        self.try_embed(text).await.ok()
    }
}
