//! Counters for the upload and chunk-processing pipeline.
//!
//! Lock-free `AtomicU64` counters shared between the service and detached
//! processing tasks, exported as name/help/value triples.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// The type of metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Monotonically increasing.
    Counter,
    /// Point-in-time value.
    Gauge,
}

/// A single exported metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineMetric {
    /// Metric name.
    pub name: String,
    /// Help text.
    pub help: String,
    /// Kind of metric.
    pub kind: MetricKind,
    /// Current value.
    pub value: f64,
}

/// Pipeline counters.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    documents_uploaded: AtomicU64,
    bytes_uploaded: AtomicU64,
    runs_started: AtomicU64,
    runs_succeeded: AtomicU64,
    runs_failed: AtomicU64,
    chunks_written: AtomicU64,
    batches_written: AtomicU64,
    chunks_retrieved: AtomicU64,
    integrity_failures: AtomicU64,
    documents_deleted: AtomicU64,
}

/// Point-in-time copy of [`PipelineMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Documents accepted by upload
    pub documents_uploaded: u64,
    /// Plaintext bytes accepted by upload
    pub bytes_uploaded: u64,
    /// Processing runs started
    pub runs_started: u64,
    /// Processing runs that set `processed_at`
    pub runs_succeeded: u64,
    /// Processing runs that failed and were cleaned up
    pub runs_failed: u64,
    /// Chunks persisted by successful or partial runs
    pub chunks_written: u64,
    /// Batches persisted
    pub batches_written: u64,
    /// Chunks decrypted for callers
    pub chunks_retrieved: u64,
    /// Authentication tag failures seen on read
    pub integrity_failures: u64,
    /// Documents removed
    pub documents_deleted: u64,
}

impl PipelineMetrics {
    /// All counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted upload.
    #[inline]
    pub fn record_upload(&self, bytes: u64) {
        self.documents_uploaded.fetch_add(1, Ordering::Relaxed);
        self.bytes_uploaded.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record the start of a processing run.
    #[inline]
    pub fn record_run_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed run.
    #[inline]
    pub fn record_run_succeeded(&self) {
        self.runs_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed run.
    #[inline]
    pub fn record_run_failed(&self) {
        self.runs_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one persisted batch of `chunks` chunks.
    #[inline]
    pub fn record_batch(&self, chunks: u64) {
        self.batches_written.fetch_add(1, Ordering::Relaxed);
        self.chunks_written.fetch_add(chunks, Ordering::Relaxed);
    }

    /// Record a decrypted chunk read.
    #[inline]
    pub fn record_chunk_retrieved(&self) {
        self.chunks_retrieved.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an authentication failure.
    #[inline]
    pub fn record_integrity_failure(&self) {
        self.integrity_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a deleted document.
    #[inline]
    pub fn record_delete(&self) {
        self.documents_deleted.fetch_add(1, Ordering::Relaxed);
    }

    /// Fraction of finished runs that succeeded; 1.0 before any run finished.
    pub fn success_ratio(&self) -> f64 {
        let ok = self.runs_succeeded.load(Ordering::Relaxed);
        let failed = self.runs_failed.load(Ordering::Relaxed);
        if ok + failed == 0 {
            1.0
        } else {
            ok as f64 / (ok + failed) as f64
        }
    }

    /// Copy the counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_uploaded: self.documents_uploaded.load(Ordering::Relaxed),
            bytes_uploaded: self.bytes_uploaded.load(Ordering::Relaxed),
            runs_started: self.runs_started.load(Ordering::Relaxed),
            runs_succeeded: self.runs_succeeded.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            chunks_written: self.chunks_written.load(Ordering::Relaxed),
            batches_written: self.batches_written.load(Ordering::Relaxed),
            chunks_retrieved: self.chunks_retrieved.load(Ordering::Relaxed),
            integrity_failures: self.integrity_failures.load(Ordering::Relaxed),
            documents_deleted: self.documents_deleted.load(Ordering::Relaxed),
        }
    }

    /// Export every counter plus the success ratio gauge.
    pub fn collect(&self) -> Vec<PipelineMetric> {
        let s = self.snapshot();
        let counter = |name: &str, help: &str, value: u64| PipelineMetric {
            name: format!("docvault_{}", name),
            help: help.to_string(),
            kind: MetricKind::Counter,
            value: value as f64,
        };
        vec![
            counter(
                "documents_uploaded_total",
                "Documents accepted by upload",
                s.documents_uploaded,
            ),
            counter("bytes_uploaded_total", "Plaintext bytes accepted by upload", s.bytes_uploaded),
            counter("runs_started_total", "Processing runs started", s.runs_started),
            counter("runs_succeeded_total", "Processing runs completed", s.runs_succeeded),
            counter("runs_failed_total", "Processing runs failed and rolled back", s.runs_failed),
            counter("chunks_written_total", "Encrypted chunks persisted", s.chunks_written),
            counter("batches_written_total", "Chunk batches persisted", s.batches_written),
            counter("chunks_retrieved_total", "Chunks decrypted for callers", s.chunks_retrieved),
            counter(
                "integrity_failures_total",
                "Authentication tag failures",
                s.integrity_failures,
            ),
            counter("documents_deleted_total", "Documents deleted", s.documents_deleted),
            PipelineMetric {
                name: "docvault_run_success_ratio".to_string(),
                help: "Succeeded runs / finished runs".to_string(),
                kind: MetricKind::Gauge,
                value: self.success_ratio(),
            },
        ]
    }
}
