//! Steady-rate limiter per rate limit bucket.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use super::RateLimitTable;
use crate::error::RateLimitError;

/// Per-bucket steady rate limiter.
///
/// Each bucket allows a burst of one request and then one request per
/// [`request_interval`](super::RateLimitGroup::request_interval). Buckets
/// are created on first use.
///
/// This limiter is cheap to clone. Clones share their buckets, so all
/// clients making ESI requests for the same characters should share one.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use evebuddy_lib::rate_limit::{RateLimitGroup, RateLimitTable, RateLimiter};
///
/// # async fn example() -> Result<(), evebuddy_lib::error::RateLimitError> {
/// let table = RateLimitTable::from_static(
///     &[RateLimitGroup::new("char-location", 1200, Duration::from_secs(900))],
///     &[("GetCharactersCharacterIdLocation", "char-location")],
/// );
/// let limiter = RateLimiter::new(table);
///
/// limiter.acquire("GetCharactersCharacterIdLocation", Some(42), true).await?;
/// assert_eq!(limiter.buckets().await, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<RateLimiterInner>,
}

struct RateLimiterInner {
    table: RateLimitTable,
    buckets: Mutex<HashMap<String, Arc<SteadyBucket>>>,
}

/// Longest spacing a bucket enforces.
const MAX_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

struct SteadyBucket {
    interval: Duration,
    /// Earliest instant the next request may start.
    next: Mutex<Option<Instant>>,
}

impl SteadyBucket {
    fn new(interval: Duration) -> Self {
        Self {
            interval: interval.min(MAX_INTERVAL),
            next: Mutex::new(None),
        }
    }

    /// Reserves the next slot and waits for it.
    async fn wait(&self) {
        let slot = {
            let mut next = self.next.lock().await;
            let now = Instant::now();
            let slot = match *next {
                Some(at) if at > now => at,
                _ => now,
            };
            *next = Some(slot + self.interval);
            slot
        };

        // Wait outside the lock
        tokio::time::sleep_until(slot).await;
    }
}

impl RateLimiter {
    /// Creates a limiter for the operations in `table`.
    pub fn new(table: RateLimitTable) -> Self {
        Self {
            inner: Arc::new(RateLimiterInner {
                table,
                buckets: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn table(&self) -> &RateLimitTable {
        &self.inner.table
    }

    /// Waits until a request for `operation_id` may be made.
    ///
    /// Returns immediately for unlimited operations. Fails when the
    /// operation cannot be resolved.
    pub async fn acquire(
        &self,
        operation_id: &str,
        character_id: Option<i32>,
        authenticated: bool,
    ) -> Result<(), RateLimitError> {
        let Some(bucket) = self
            .inner
            .table
            .resolve(operation_id, character_id, authenticated)?
        else {
            return Ok(());
        };

        let steady = {
            let mut buckets = self.inner.buckets.lock().await;
            Arc::clone(buckets.entry(bucket.key).or_insert_with_key(|key| {
                let interval = bucket.group.request_interval();
                log::debug!(
                    "rate limit: new bucket {} with interval {:?}",
                    key,
                    interval
                );
                Arc::new(SteadyBucket::new(interval))
            }))
        };
        steady.wait().await;
        Ok(())
    }

    /// Returns the number of buckets created so far.
    pub async fn buckets(&self) -> usize {
        self.inner.buckets.lock().await.len()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("operations", &self.inner.table.len())
            .finish_non_exhaustive()
    }
}
