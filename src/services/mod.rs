pub mod extraction;
pub mod prompt;
pub mod rate_limit;
pub mod validation;
pub mod vision; // OpenAI-compatible vision backends

pub use rate_limit::RateLimiter;
pub use vision::VisionEstimator;
