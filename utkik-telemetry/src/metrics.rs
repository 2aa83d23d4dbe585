//! ## utkik-telemetry::metrics
//! **Prometheus counters and histograms for the resolution pipeline**
//!
//! One `MetricsRecorder` is created by the engine and cloned into every
//! worker; prometheus metrics share their series across clones, so all
//! threads increment the same counters.

use prometheus::{Counter, Histogram, HistogramOpts, Registry};

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: prometheus::Registry,
    pub lookups_total: prometheus::Counter,
    pub lookup_failures: prometheus::Counter,
    pub deadline_expirations: prometheus::Counter,
    pub lookup_latency: prometheus::Histogram,
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRecorder {
    pub fn new() -> Self {
        let registry = Registry::new();
        let lookups_total =
            Counter::new("utkik_lookups_total", "Total completed name lookups").unwrap();
        let lookup_failures = Counter::new(
            "utkik_lookup_failures_total",
            "Lookups that finished with a failure marker",
        )
        .unwrap();
        let deadline_expirations = Counter::new(
            "utkik_deadline_expirations_total",
            "Resolution batches cut short by their deadline",
        )
        .unwrap();

        let lookup_latency = Histogram::with_opts(
            HistogramOpts::new(
                "utkik_lookup_latency_seconds",
                "Blocking name lookup duration",
            )
            .buckets(vec![0.001, 0.01, 0.1, 1.0, 10.0]),
        )
        .unwrap();

        registry.register(Box::new(lookups_total.clone())).unwrap();
        registry
            .register(Box::new(lookup_failures.clone()))
            .unwrap();
        registry
            .register(Box::new(deadline_expirations.clone()))
            .unwrap();
        registry.register(Box::new(lookup_latency.clone())).unwrap();

        Self {
            registry,
            lookups_total,
            lookup_failures,
            deadline_expirations,
            lookup_latency,
        }
    }

    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer).unwrap())
    }

    pub fn inc_lookups(&self) {
        self.lookups_total.inc();
    }

    pub fn inc_lookup_failures(&self) {
        self.lookup_failures.inc();
    }

    pub fn inc_deadline_expirations(&self) {
        self.deadline_expirations.inc();
    }

    pub fn observe_lookup_latency(&self, seconds: f64) {
        self.lookup_latency.observe(seconds);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_flow_into_the_export() {
        let metrics = MetricsRecorder::new();
        metrics.inc_lookups();
        metrics.inc_lookups();
        metrics.inc_lookup_failures();
        metrics.observe_lookup_latency(0.025);

        let text = metrics.gather_metrics().unwrap();
        assert!(text.contains("utkik_lookups_total 2"));
        assert!(text.contains("utkik_lookup_failures_total 1"));
        assert!(text.contains("utkik_lookup_latency_seconds_count 1"));
    }

    #[test]
    fn clones_share_the_same_series() {
        let metrics = MetricsRecorder::new();
        let clone = metrics.clone();
        clone.inc_deadline_expirations();

        let text = metrics.gather_metrics().unwrap();
        assert!(text.contains("utkik_deadline_expirations_total 1"));
    }
}
