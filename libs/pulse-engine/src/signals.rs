use std::sync::atomic::{AtomicU64, Ordering};

use serde::Deserialize;

/// Which operational signal an alarm observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalName {
    /// Failed dispatcher batches per evaluation period.
    ConsumerErrors,
    /// Measure-store retries per evaluation period.
    StoreThrottles,
    /// Live writer/reader connections against the measure store.
    StoreConnections,
    /// Failed query-service requests per evaluation period.
    QueryErrors,
}

/// Shared operational counters. Bumped on the hot paths, sampled by the
/// alarm evaluator once per period.
#[derive(Debug, Default)]
pub struct PipelineSignals {
    records_processed: AtomicU64,
    batches_failed: AtomicU64,
    store_throttles: AtomicU64,
    store_connections: AtomicU64,
    query_errors: AtomicU64,
}

impl PipelineSignals {
    pub fn records_processed(&self, n: u64) {
        self.records_processed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn batch_failed(&self) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn store_throttled(&self) {
        self.store_throttles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_opened(&self) {
        self.store_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.store_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn query_failed(&self) {
        self.query_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_records_processed(&self) -> u64 {
        self.records_processed.load(Ordering::Relaxed)
    }

    pub fn total_batches_failed(&self) -> u64 {
        self.batches_failed.load(Ordering::Relaxed)
    }

    pub fn total_store_throttles(&self) -> u64 {
        self.store_throttles.load(Ordering::Relaxed)
    }

    pub fn connections(&self) -> u64 {
        self.store_connections.load(Ordering::Relaxed)
    }

    pub fn total_query_errors(&self) -> u64 {
        self.query_errors.load(Ordering::Relaxed)
    }
}

/// Samples counter deltas between evaluation periods.
///
/// Counters read as a per-period delta; the connection gauge reads as its
/// current value, and as missing when nothing reports a connection at all.
#[derive(Debug, Default)]
pub struct SignalSampler {
    prev_batches_failed: u64,
    prev_store_throttles: u64,
    prev_query_errors: u64,
}

impl SignalSampler {
    pub fn sample(&mut self, name: SignalName, signals: &PipelineSignals) -> Option<f64> {
        match name {
            SignalName::ConsumerErrors => {
                let now = signals.total_batches_failed();
                let delta = now - self.prev_batches_failed;
                self.prev_batches_failed = now;
                Some(delta as f64)
            }
            SignalName::StoreThrottles => {
                let now = signals.total_store_throttles();
                let delta = now - self.prev_store_throttles;
                self.prev_store_throttles = now;
                Some(delta as f64)
            }
            SignalName::StoreConnections => {
                let now = signals.connections();
                if now == 0 { None } else { Some(now as f64) }
            }
            SignalName::QueryErrors => {
                let now = signals.total_query_errors();
                let delta = now - self.prev_query_errors;
                self.prev_query_errors = now;
                Some(delta as f64)
            }
        }
    }
}
