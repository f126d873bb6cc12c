use std::collections::{BTreeMap, VecDeque};

use parking_lot::Mutex;
use serde::Serialize;

use crate::utils::clock;

/// Endpoints tracked by the registry. Buckets are pre-created so the
/// metrics report always lists all four, zeros included.
pub const TRACKED_ENDPOINTS: [&str; 4] = ["chat", "retrieve", "metrics", "health"];

const LATENCY_RING_CAPACITY: usize = 1000;
const BUCKET_PERIOD_MS: u64 = 60 * 60 * 1000;

#[derive(Debug)]
struct Bucket {
    count: u64,
    errors: u64,
    rate_limit_hits: u64,
    latencies: VecDeque<u64>,
    period_start_ms: u64,
}

impl Bucket {
    fn new(now_ms: u64) -> Self {
        Self {
            count: 0,
            errors: 0,
            rate_limit_hits: 0,
            latencies: VecDeque::with_capacity(LATENCY_RING_CAPACITY),
            period_start_ms: now_ms,
        }
    }

    fn observe(&mut self, latency_ms: u64, status: u16) {
        self.count += 1;
        if status >= 400 {
            self.errors += 1;
        }
        if status == 429 {
            self.rate_limit_hits += 1;
        }
        if self.latencies.len() == LATENCY_RING_CAPACITY {
            self.latencies.pop_front();
        }
        self.latencies.push_back(latency_ms);
    }

    fn snapshot(&self) -> BucketSnapshot {
        let mut sorted: Vec<u64> = self.latencies.iter().copied().collect();
        sorted.sort_unstable();

        let avg_ms = if sorted.is_empty() {
            0.0
        } else {
            sorted.iter().sum::<u64>() as f64 / sorted.len() as f64
        };

        BucketSnapshot {
            count: self.count,
            errors: self.errors,
            rate_limit_hits: self.rate_limit_hits,
            error_rate: self.errors as f64 / (self.count.max(1)) as f64,
            avg_ms,
            p50_ms: percentile(&sorted, 50),
            p95_ms: percentile(&sorted, 95),
            p99_ms: percentile(&sorted, 99),
            period_start_ms: self.period_start_ms,
        }
    }
}

/// Nearest-rank percentile over a pre-sorted slice:
/// `sorted[ceil((p/100) * n) - 1]`, clamped to the valid index range.
fn percentile(sorted: &[u64], p: u64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let n = sorted.len();
    let rank = ((p as f64 / 100.0) * n as f64).ceil() as usize;
    sorted[rank.saturating_sub(1).min(n - 1)]
}

/// Derived per-endpoint statistics as served by `GET /api/v1/metrics`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BucketSnapshot {
    pub count: u64,
    pub errors: u64,
    pub rate_limit_hits: u64,
    pub error_rate: f64,
    pub avg_ms: f64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
    pub period_start_ms: u64,
}

/// In-memory request metrics: counters plus a bounded latency ring per
/// endpoint. Buckets roll over lazily once they age past one hour, so
/// the report is an hourly window without background work.
pub struct MetricsRegistry {
    buckets: Mutex<BTreeMap<&'static str, Bucket>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let now_ms = clock::epoch_millis();
        let buckets = TRACKED_ENDPOINTS
            .iter()
            .map(|endpoint| (*endpoint, Bucket::new(now_ms)))
            .collect();
        Self {
            buckets: Mutex::new(buckets),
        }
    }

    pub fn record(&self, endpoint: &'static str, latency_ms: u64, status: u16) {
        self.record_at(endpoint, latency_ms, status, clock::epoch_millis());
    }

    pub fn record_at(&self, endpoint: &'static str, latency_ms: u64, status: u16, now_ms: u64) {
        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(endpoint).or_insert_with(|| Bucket::new(now_ms));
        if now_ms.saturating_sub(bucket.period_start_ms) > BUCKET_PERIOD_MS {
            *bucket = Bucket::new(now_ms);
        }
        bucket.observe(latency_ms, status);
    }

    pub fn report(&self) -> BTreeMap<&'static str, BucketSnapshot> {
        self.report_at(clock::epoch_millis())
    }

    pub fn report_at(&self, now_ms: u64) -> BTreeMap<&'static str, BucketSnapshot> {
        let mut buckets = self.buckets.lock();
        for bucket in buckets.values_mut() {
            if now_ms.saturating_sub(bucket.period_start_ms) > BUCKET_PERIOD_MS {
                *bucket = Bucket::new(now_ms);
            }
        }
        buckets
            .iter()
            .map(|(endpoint, bucket)| (*endpoint, bucket.snapshot()))
            .collect()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
