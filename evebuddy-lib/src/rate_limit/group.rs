//! Rate limit groups.

use std::borrow::Cow;
use std::time::Duration;

/// A rate limit group shared by one or more ESI operations.
///
/// Groups are usable in `static` tables, which is how generated code
/// declares them.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use evebuddy_lib::rate_limit::RateLimitGroup;
///
/// static GROUPS: &[RateLimitGroup] = &[
///     RateLimitGroup::new("char-location", 1200, Duration::from_secs(900)),
/// ];
///
/// // 900s / 600 requests, plus 10%
/// assert_eq!(GROUPS[0].request_interval(), Duration::from_millis(1650));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitGroup {
    pub name: Cow<'static, str>,
    /// Tokens available per window.
    pub max_tokens: u32,
    pub window: Duration,
}

impl RateLimitGroup {
    /// Creates a group with a static name.
    pub const fn new(name: &'static str, max_tokens: u32, window: Duration) -> Self {
        Self {
            name: Cow::Borrowed(name),
            max_tokens,
            window,
        }
    }

    /// Creates a group with a runtime name.
    pub fn owned(name: impl Into<String>, max_tokens: u32, window: Duration) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            max_tokens,
            window,
        }
    }

    /// Interval between requests for a steady rate within this group.
    ///
    /// Each request consumes 2 tokens. A 10% contingency covers server
    /// errors, which consume extra tokens.
    pub fn request_interval(&self) -> Duration {
        let requests = (self.max_tokens / 2).max(1);
        let interval = self.window / requests;
        interval.saturating_add(interval / 10)
    }
}
