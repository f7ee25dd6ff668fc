use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Request/response counters maintained by the outermost pipeline stage.
#[derive(Clone)]
pub struct Metrics {
    pub total_requests_received: Arc<AtomicU64>,
    pub total_responses_sent: Arc<AtomicU64>,
    pub total_processing_time_us: Arc<AtomicU64>,
    responses_by_status: Arc<Mutex<BTreeMap<u16, u64>>>,
    pub start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            total_requests_received: Arc::new(AtomicU64::new(0)),
            total_responses_sent: Arc::new(AtomicU64::new(0)),
            total_processing_time_us: Arc::new(AtomicU64::new(0)),
            responses_by_status: Arc::new(Mutex::new(BTreeMap::new())),
            start_time: Instant::now(),
        }
    }

    pub fn request_received(&self) {
        self.total_requests_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn response_sent(&self, status: u16, elapsed: Duration) {
        self.total_responses_sent.fetch_add(1, Ordering::Relaxed);
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.total_processing_time_us.fetch_add(micros, Ordering::Relaxed);
        let mut by_status = self.responses_by_status.lock().unwrap_or_else(PoisonError::into_inner);
        *by_status.entry(status).or_insert(0) += 1;
    }

    pub fn get_snapshot(&self) -> MetricsSnapshot {
        let by_status = self
            .responses_by_status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(status, count)| (status.to_string(), *count))
            .collect();
        MetricsSnapshot {
            total_requests_received: self.total_requests_received.load(Ordering::Relaxed),
            total_responses_sent: self.total_responses_sent.load(Ordering::Relaxed),
            total_processing_time_us: self.total_processing_time_us.load(Ordering::Relaxed),
            total_responses_sent_by_status: by_status,
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
pub struct MetricsSnapshot {
    pub total_requests_received: u64,
    pub total_responses_sent: u64,
    pub total_processing_time_us: u64,
    pub total_responses_sent_by_status: BTreeMap<String, u64>,
    pub uptime_seconds: u64,
}
