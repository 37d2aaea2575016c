//! ESI error limit handling.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Header telling how many seconds remain until the error window resets.
pub const ERROR_LIMIT_RESET_HEADER: &str = "X-ESI-Error-Limit-Reset";

/// HTTP status ESI answers with once the error limit is exceeded.
pub const STATUS_TOO_MANY_ERRORS: u16 = 420;

/// Configuration for error limit blocking.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use evebuddy_lib::rate_limit::ErrorLimitConfig;
///
/// let config = ErrorLimitConfig::default()
///     .max_retries(5)
///     .fallback_reset(Duration::from_secs(30));
/// assert_eq!(config.max_retries, 5);
/// ```
#[derive(Debug, Clone)]
pub struct ErrorLimitConfig {
    /// How often a request may be retried after a 420.
    pub max_retries: u32,
    /// Block duration when the reset header is missing or unreadable.
    pub fallback_reset: Duration,
    /// Upper bound of the random delay added to every block.
    pub max_jitter: Duration,
}

impl Default for ErrorLimitConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            fallback_reset: Duration::from_secs(60),
            max_jitter: Duration::from_secs(1),
        }
    }
}

impl ErrorLimitConfig {
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    pub fn fallback_reset(mut self, reset: Duration) -> Self {
        self.fallback_reset = reset;
        self
    }

    pub fn max_jitter(mut self, jitter: Duration) -> Self {
        self.max_jitter = jitter;
        self
    }
}

/// Longest block a reset header can request.
pub const MAX_RESET: Duration = Duration::from_secs(15 * 60);

/// A response the error limit can inspect.
pub trait ErrorLimited {
    fn status_code(&self) -> u16;

    /// Value of [`ERROR_LIMIT_RESET_HEADER`], if present.
    fn reset_header(&self) -> Option<&str>;
}

impl ErrorLimited for reqwest::Response {
    fn status_code(&self) -> u16 {
        self.status().as_u16()
    }

    fn reset_header(&self) -> Option<&str> {
        self.headers()
            .get(ERROR_LIMIT_RESET_HEADER)
            .and_then(|v| v.to_str().ok())
    }
}

/// Parses the error limit reset header, in (fractional) seconds.
pub fn parse_reset_header(value: Option<&str>) -> Option<Duration> {
    let seconds: f64 = value?.trim().parse().ok()?;
    Duration::try_from_secs_f64(seconds).ok()
}

/// Process-wide block after ESI reported an exceeded error limit.
///
/// While the block is active, requests without their own rate limit should
/// wait in [`wait`](Self::wait) before they are sent. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct ErrorLimitBlock {
    inner: Arc<ErrorLimitInner>,
    config: ErrorLimitConfig,
}

#[derive(Debug, Default)]
struct ErrorLimitInner {
    retry_at: RwLock<Option<Instant>>,
}

impl ErrorLimitBlock {
    pub fn new(config: ErrorLimitConfig) -> Self {
        Self {
            inner: Arc::default(),
            config,
        }
    }

    pub fn config(&self) -> &ErrorLimitConfig {
        &self.config
    }

    /// Records a 420 response and returns how long requests are blocked.
    ///
    /// `reset_header` is the value of [`ERROR_LIMIT_RESET_HEADER`].
    pub async fn record(&self, reset_header: Option<&str>) -> Duration {
        let reset = parse_reset_header(reset_header)
            .unwrap_or_else(|| {
                log::warn!("error limit: unreadable reset header, using fallback");
                self.config.fallback_reset
            })
            .min(MAX_RESET);
        *self.inner.retry_at.write().await = Some(Instant::now() + reset);
        log::warn!("error limit: exceeded, blocking requests for {:?}", reset);
        reset
    }

    /// Remaining block time, if a block is active.
    pub async fn retry_after(&self) -> Option<Duration> {
        let retry_at = (*self.inner.retry_at.read().await)?;
        let now = Instant::now();
        (retry_at > now).then(|| retry_at - now)
    }

    /// Waits until an active block has passed, plus jitter.
    pub async fn wait(&self) {
        if let Some(remaining) = self.retry_after().await {
            let delay = remaining + self.jitter();
            log::warn!("error limit: block active, waiting {:?}", delay);
            tokio::time::sleep(delay).await;
        }
    }

    /// Sends a request through the error limit.
    ///
    /// Waits out an active block first. Every 420 answer is recorded and
    /// the request is sent again, up to `max_retries` times. The last
    /// response is returned as is once retries are used up. Errors from
    /// `send` are returned immediately.
    pub async fn send_with_retries<F, Fut, R, E>(&self, mut send: F) -> Result<R, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, E>>,
        R: ErrorLimited,
    {
        let mut attempt = 0;
        loop {
            self.wait().await;
            let response = send().await?;
            if response.status_code() != STATUS_TOO_MANY_ERRORS {
                return Ok(response);
            }
            self.record(response.reset_header()).await;
            if attempt >= self.config.max_retries {
                log::warn!("error limit: giving up after {} retries", attempt);
                return Ok(response);
            }
            attempt += 1;
            log::warn!("error limit: retry {} of {}", attempt, self.config.max_retries);
        }
    }

    fn jitter(&self) -> Duration {
        if self.config.max_jitter.is_zero() {
            return Duration::ZERO;
        }
        self.config
            .max_jitter
            .mul_f64(rand::rng().random_range(0.0..1.0))
    }
}
