pub mod auth;
pub mod injection;
pub mod rate_limit;

pub use rate_limit::{LimitedEndpoint, RateDecision, SlidingWindowLimiter};
