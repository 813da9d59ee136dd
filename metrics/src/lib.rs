use std::time::{Duration, Instant};

use opentelemetry::{
    metrics::{Counter, Histogram},
    KeyValue,
};

pub fn low_latency_boundaries() -> Vec<f64> {
    vec![
        0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 25.0, 50.0, 75.0, 100.0, 250.0,
        500.0, 750.0, 1000.0, 2500.0, 5000.0, 7500.0, 10000.0,
    ]
}

pub trait TimerUpdate {
    fn add(&self, duration: Duration, labels: &[KeyValue]);
}

impl TimerUpdate for Histogram<f64> {
    fn add(&self, duration: Duration, labels: &[KeyValue]) {
        self.record(duration.as_secs_f64(), labels);
    }
}

/// Records the elapsed time into `metric` when dropped.
pub struct Timer<'a, T: TimerUpdate + Sync> {
    start: Instant,
    metric: &'a T,
    labels: &'a [KeyValue],
}

impl<'a, T: TimerUpdate + Sync> Timer<'a, T> {
    pub fn start_with_labels(metric: &'a T, labels: &'a [KeyValue]) -> Self {
        Self {
            start: Instant::now(),
            metric,
            labels,
        }
    }
}

impl<'a, T: TimerUpdate + Sync> Drop for Timer<'a, T> {
    fn drop(&mut self) {
        self.metric.add(self.start.elapsed(), self.labels);
    }
}

pub trait AutoIncrement {
    fn increment(&self, labels: &[KeyValue]);
}

impl AutoIncrement for Counter<u64> {
    fn increment(&self, labels: &[KeyValue]) {
        self.add(1, labels);
    }
}

pub mod api_io_stats {
    use opentelemetry::metrics::Counter;

    #[derive(Debug, Clone)]
    pub struct Metrics {
        pub files_created: Counter<u64>,
        pub chunks_accepted: Counter<u64>,
        pub chunk_bytes: Counter<u64>,
        pub downloads: Counter<u64>,
        pub files_deleted: Counter<u64>,
    }

    impl Default for Metrics {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Metrics {
        pub fn new() -> Metrics {
            let meter = opentelemetry::global::meter("service-api");
            let files_created = meter
                .u64_counter("filevault.files_created")
                .with_description("number of catalog records created")
                .build();
            let chunks_accepted = meter
                .u64_counter("filevault.chunks_accepted")
                .with_description("number of chunks accepted on the chunked path")
                .build();
            let chunk_bytes = meter
                .u64_counter("filevault.chunk_bytes")
                .with_description("number of bytes ingested through chunk uploads")
                .build();
            let downloads = meter
                .u64_counter("filevault.downloads")
                .with_description("number of chunks served")
                .build();
            let files_deleted = meter
                .u64_counter("filevault.files_deleted")
                .with_description("number of catalog records deleted")
                .build();
            Metrics {
                files_created,
                chunks_accepted,
                chunk_bytes,
                downloads,
                files_deleted,
            }
        }
    }
}

pub mod gc {
    use opentelemetry::metrics::Counter;

    #[derive(Debug, Clone)]
    pub struct Metrics {
        pub leases_reaped: Counter<u64>,
    }

    impl Default for Metrics {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Metrics {
        pub fn new() -> Metrics {
            let meter = opentelemetry::global::meter("gc");
            let leases_reaped = meter
                .u64_counter("filevault.leases_reaped")
                .with_description("number of expired partial uploads removed")
                .build();
            Metrics { leases_reaped }
        }
    }
}

pub mod blob_storage {
    use opentelemetry::metrics::Histogram;

    use crate::low_latency_boundaries;

    #[derive(Debug, Clone)]
    pub struct Metrics {
        pub operations: Histogram<f64>,
    }

    impl Default for Metrics {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Metrics {
        pub fn new() -> Metrics {
            let meter = opentelemetry::global::meter("blob-storage");
            let operations = meter
                .f64_histogram("filevault.blob_operations_duration")
                .with_unit("s")
                .with_boundaries(low_latency_boundaries())
                .with_description("content store operation latencies in seconds")
                .build();
            Metrics { operations }
        }
    }
}

#[derive(Clone, Debug)]
pub struct StateStoreMetrics {
    pub state_write: Histogram<f64>,
    pub state_read: Histogram<f64>,
}

impl Default for StateStoreMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStoreMetrics {
    pub fn new() -> Self {
        let meter = opentelemetry::global::meter("state_store");

        let state_write = meter
            .f64_histogram("filevault.state_machine_write_duration")
            .with_unit("s")
            .with_boundaries(low_latency_boundaries())
            .with_description("catalog write latency in seconds")
            .build();

        let state_read = meter
            .f64_histogram("filevault.state_machine_read_duration")
            .with_unit("s")
            .with_boundaries(low_latency_boundaries())
            .with_description("catalog read latency in seconds")
            .build();

        Self {
            state_write,
            state_read,
        }
    }
}
