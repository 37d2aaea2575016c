//! ESI rate limits.
//!
//! Rate limit groups are read from the ESI OpenAPI document, turned into
//! Rust tables by [`generate`] and enforced at runtime by [`RateLimiter`].

mod codegen;
mod error_limit;
mod group;
mod limiter;
mod spec;
mod table;

pub use codegen::GENERATED_HEADER;
pub use codegen::generate;
pub use error_limit::ERROR_LIMIT_RESET_HEADER;
pub use error_limit::ErrorLimitBlock;
pub use error_limit::ErrorLimitConfig;
pub use error_limit::ErrorLimited;
pub use error_limit::MAX_RESET;
pub use error_limit::STATUS_TOO_MANY_ERRORS;
pub use error_limit::parse_reset_header;
pub use group::RateLimitGroup;
pub use limiter::RateLimiter;
pub use spec::MAX_WINDOW;
pub use spec::RateLimitSpec;
pub use spec::parse_spec;
pub use spec::parse_window;
pub use table::Bucket;
pub use table::RateLimitTable;
