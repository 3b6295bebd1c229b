//! Transport abstraction for talking to the chat server

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use flowchat_api::{AgentCreateRequest, AgentCreated, ChatClient, ChatRequest, ChunkStream, Result};

/// Retry configuration for opening a chat stream
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Calculate delay for a given attempt (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_secs =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// retry budget is spent.
pub async fn with_retries<T, F, Fut>(config: &RetryConfig, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < config.max_retries && e.is_retryable() => {
                let delay = config.delay_for_attempt(attempt);
                tracing::warn!(
                    "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                    what,
                    attempt + 1,
                    config.max_retries + 1,
                    e,
                    delay
                );
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Transport for chat and agent requests
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the response stream for one user turn
    async fn open_chat(&self, request: &ChatRequest) -> Result<ChunkStream>;

    /// Register an agent built from the conversation
    async fn create_agent(&self, request: &AgentCreateRequest) -> Result<AgentCreated>;
}

/// Transport backed by [`ChatClient`]
pub struct HttpTransport {
    client: ChatClient,
    retry_config: RetryConfig,
}

impl HttpTransport {
    pub fn new(client: ChatClient) -> Self {
        Self {
            client,
            retry_config: RetryConfig::default(),
        }
    }

    /// Set retry configuration
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open_chat(&self, request: &ChatRequest) -> Result<ChunkStream> {
        // Only the open is retried; a stream that fails midway has already
        // written into the history.
        with_retries(&self.retry_config, "Opening chat stream", || {
            self.client.open_chat(request)
        })
        .await
    }

    async fn create_agent(&self, request: &AgentCreateRequest) -> Result<AgentCreated> {
        self.client.create_agent(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowchat_api::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn instant(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 2.0,
        }
    }

    #[test]
    fn test_delay_for_attempt() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retries(&instant(3), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::api(Some(503), "busy"))
                } else {
                    Ok("open")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "open");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retries(&instant(2), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::api(Some(429), "slow down")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retries(&instant(5), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::api(None, "model not found")) }
        })
        .await;

        assert!(matches!(result, Err(Error::Api { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
