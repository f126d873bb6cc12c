use parking_lot::Mutex;

use crate::utils::clock;

/// How long an embedder observation stays fresh for health reporting.
const EMBEDDER_PROBE_TTL_MS: u64 = 10 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    Ok,
    Failing,
    /// No recent observation; the health endpoint reports the check as
    /// skipped instead of spending an embedding call on it.
    Skipped,
}

impl ProbeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeStatus::Ok => "ok",
            ProbeStatus::Failing => "failing",
            ProbeStatus::Skipped => "skipped",
        }
    }
}

/// Passive embedder health cache. Retrieval records the outcome of its
/// real embedding calls; the health endpoint reads the cached verdict
/// rather than probing the provider itself.
pub struct ProbeCache {
    embedder: Mutex<Option<(bool, u64)>>,
}

impl ProbeCache {
    pub fn new() -> Self {
        Self {
            embedder: Mutex::new(None),
        }
    }

    pub fn record_embedder(&self, ok: bool) {
        *self.embedder.lock() = Some((ok, clock::epoch_millis()));
    }

    pub fn embedder_status(&self) -> ProbeStatus {
        self.embedder_status_at(clock::epoch_millis())
    }

    pub fn embedder_status_at(&self, now_ms: u64) -> ProbeStatus {
        match *self.embedder.lock() {
            Some((ok, observed_at)) if now_ms.saturating_sub(observed_at) <= EMBEDDER_PROBE_TTL_MS => {
                if ok {
                    ProbeStatus::Ok
                } else {
                    ProbeStatus::Failing
                }
            }
            _ => ProbeStatus::Skipped,
        }
    }
}

impl Default for ProbeCache {
    fn default() -> Self {
        Self::new()
    }
}
