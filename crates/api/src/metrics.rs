use index::IngestionRecord;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

#[derive(Default)]
pub struct Metrics {
    // Counters
    total_requests: AtomicUsize,
    successful_requests: AtomicUsize,
    failed_requests: AtomicUsize,
    ingest_requests: AtomicUsize,
    query_requests: AtomicUsize,

    // Timing (in microseconds)
    total_ingest_time_us: AtomicU64,
    total_query_time_us: AtomicU64,

    // Counts
    documents_ingested: AtomicUsize,
    total_chunks_processed: AtomicUsize,
    failed_chunks: AtomicUsize,
    total_entities_written: AtomicUsize,
    total_relationships_written: AtomicUsize,
    degraded_answers: AtomicUsize,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_request(&self, success: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Timing is recorded for every ingest, counts only for successful ones
    pub fn record_ingest(&self, duration: Duration, record: Option<&IngestionRecord>) {
        self.ingest_requests.fetch_add(1, Ordering::Relaxed);
        self.total_ingest_time_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.record_request(record.is_some());

        if let Some(record) = record {
            self.documents_ingested.fetch_add(1, Ordering::Relaxed);
            self.total_chunks_processed.fetch_add(record.chunk_count, Ordering::Relaxed);
            self.failed_chunks.fetch_add(record.failed_chunks, Ordering::Relaxed);
            self.total_entities_written.fetch_add(record.entity_count, Ordering::Relaxed);
            self.total_relationships_written
                .fetch_add(record.relationship_count, Ordering::Relaxed);
        }
    }

    /// `degraded` means at least one retrieval path failed but an answer was given
    pub fn record_query(&self, duration: Duration, success: bool, degraded: bool) {
        self.query_requests.fetch_add(1, Ordering::Relaxed);
        self.total_query_time_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.record_request(success);
        if degraded {
            self.degraded_answers.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            avg_ingest_time_ms: avg_time_ms(&self.total_ingest_time_us, &self.ingest_requests),
            avg_query_time_ms: avg_time_ms(&self.total_query_time_us, &self.query_requests),
            documents_ingested: self.documents_ingested.load(Ordering::Relaxed),
            total_chunks_processed: self.total_chunks_processed.load(Ordering::Relaxed),
            failed_chunks: self.failed_chunks.load(Ordering::Relaxed),
            total_entities_written: self.total_entities_written.load(Ordering::Relaxed),
            total_relationships_written: self.total_relationships_written.load(Ordering::Relaxed),
            degraded_answers: self.degraded_answers.load(Ordering::Relaxed),
        }
    }
}

fn avg_time_ms(total_us: &AtomicU64, count: &AtomicUsize) -> f64 {
    let total = total_us.load(Ordering::Relaxed) as f64;
    let cnt = count.load(Ordering::Relaxed) as f64;
    if cnt > 0.0 {
        total / cnt / 1000.0 // Convert to ms
    } else {
        0.0
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: usize,
    pub successful_requests: usize,
    pub failed_requests: usize,
    pub avg_ingest_time_ms: f64,
    pub avg_query_time_ms: f64,
    pub documents_ingested: usize,
    pub total_chunks_processed: usize,
    pub failed_chunks: usize,
    pub total_entities_written: usize,
    pub total_relationships_written: usize,
    pub degraded_answers: usize,
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record() -> IngestionRecord {
        IngestionRecord {
            document_id: "doc-1".to_string(),
            filename: "notes.txt".to_string(),
            timestamp: Utc::now(),
            chunk_count: 4,
            entity_count: 10,
            relationship_count: 6,
            failed_chunks: 1,
        }
    }

    #[test]
    fn test_ingest_and_query_counters() {
        let metrics = Metrics::new();
        metrics.record_ingest(Duration::from_millis(20), Some(&record()));
        metrics.record_ingest(Duration::from_millis(10), None);
        metrics.record_query(Duration::from_millis(4), true, true);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests, 3);
        assert_eq!(snapshot.successful_requests, 2);
        assert_eq!(snapshot.failed_requests, 1);
        assert_eq!(snapshot.documents_ingested, 1);
        assert_eq!(snapshot.total_chunks_processed, 4);
        assert_eq!(snapshot.failed_chunks, 1);
        assert_eq!(snapshot.degraded_answers, 1);
        assert!((snapshot.avg_ingest_time_ms - 15.0).abs() < 1e-9);
        assert!((snapshot.avg_query_time_ms - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_metrics_average_to_zero() {
        let snapshot = Metrics::new().snapshot();
        assert_eq!(snapshot.avg_query_time_ms, 0.0);
        assert_eq!(snapshot.total_requests, 0);
    }
}
