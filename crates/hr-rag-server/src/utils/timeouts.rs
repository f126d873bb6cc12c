use std::future::Future;
use std::time::Duration;

use crate::utils::error::ApiError;

/// Upper bounds for every outbound wait. A timeout surfaces as
/// `gateway_timeout` at the HTTP boundary, distinct from provider errors.
pub const DB_READ: Duration = Duration::from_secs(5);
pub const EMBEDDING: Duration = Duration::from_secs(10);
pub const LLM_COMPLETION: Duration = Duration::from_secs(30);
pub const LLM_STREAM_IDLE: Duration = Duration::from_secs(60);

/// Run `future` under `limit`, converting expiry into the timeout error
/// for `operation`.
pub async fn bounded<F, T>(limit: Duration, operation: &'static str, future: F) -> Result<T, ApiError>
where
    F: Future<Output = Result<T, ApiError>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(ApiError::GatewayTimeout(operation)),
    }
}
