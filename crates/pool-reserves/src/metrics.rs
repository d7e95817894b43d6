use prometheus::{Histogram, IntCounterVec};

#[derive(prometheus_metric_storage::MetricStorage)]
#[metric(subsystem = "pool_reserves")]
pub(crate) struct Metrics {
    /// Chain reads that failed without failing the snapshot, by read kind.
    #[metric(labels("read"))]
    call_misses: IntCounterVec,

    /// Finished snapshots by result.
    #[metric(labels("result"))]
    snapshots: IntCounterVec,

    /// Time it took to compute a snapshot.
    snapshot_seconds: Histogram,
}

impl Metrics {
    fn get() -> &'static Self {
        Metrics::instance(observe::metrics::get_storage_registry()).unwrap()
    }

    pub(crate) fn call_miss(read: &str) {
        Self::get().call_misses.with_label_values(&[read]).inc();
    }

    pub(crate) fn snapshot_timer() -> prometheus::HistogramTimer {
        Self::get().snapshot_seconds.start_timer()
    }

    pub(crate) fn snapshot_finished<T, E>(result: &Result<T, E>) {
        let label = match result {
            Ok(_) => "success",
            Err(_) => "transport_failure",
        };
        Self::get().snapshots.with_label_values(&[label]).inc();
    }
}
