pub mod config;
pub mod logging;
pub mod error;
pub mod validation;
pub mod rate_limiter;
pub mod retry;

pub use config::*;
pub use logging::*;
pub use error::*;
pub use validation::*;
pub use rate_limiter::{
    Clock, ManualClock, QuotaStatus, RateLimiter, SystemClock, GENERAL_INSIGHTS, PDF_PROCESSING,
    PDF_PROCESSING_CHECK,
};
pub use retry::{with_retry, RetryPolicy};
