use chrono::Utc;
use uuid::Uuid;

/// Milliseconds since the Unix epoch, used as the rate-limit and
/// metrics time base.
pub fn epoch_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Generate a fresh request identifier.
pub fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}
