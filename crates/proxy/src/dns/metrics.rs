use prometheus::core::Collector;
use prometheus::{Histogram, HistogramOpts, IntCounter, Registry};
use tracing::{debug, warn};

use mesh_dns_domain::DomainError;

/// Per-server request instrumentation.
///
/// Collectors are registered against the injected registry. Registration is
/// idempotent for a given registry: a collector that is already present is
/// left in place, so constructing a second server against the same registry
/// cannot fail.
pub struct ServerMetrics {
    request_duration: Histogram,
    upstream_request_duration: Histogram,
    upstream_request_failures: IntCounter,
}

impl ServerMetrics {
    pub fn new(registry: &Registry) -> Result<Self, DomainError> {
        let request_duration = Histogram::with_opts(HistogramOpts::new(
            "dns_proxy_request_duration_seconds",
            "Total time spent handling one DNS request, local or forwarded",
        ))
        .map_err(metrics_err)?;

        let upstream_request_duration = Histogram::with_opts(HistogramOpts::new(
            "dns_proxy_upstream_request_duration_seconds",
            "Time spent waiting on the upstream resolver",
        ))
        .map_err(metrics_err)?;

        let upstream_request_failures = IntCounter::new(
            "dns_proxy_upstream_request_failures_total",
            "Number of failed upstream queries",
        )
        .map_err(metrics_err)?;

        register(registry, Box::new(request_duration.clone()));
        register(registry, Box::new(upstream_request_duration.clone()));
        register(registry, Box::new(upstream_request_failures.clone()));

        Ok(Self {
            request_duration,
            upstream_request_duration,
            upstream_request_failures,
        })
    }

    pub fn observe_request(&self, seconds: f64) {
        self.request_duration.observe(seconds);
    }

    pub fn observe_upstream_request(&self, seconds: f64) {
        self.upstream_request_duration.observe(seconds);
    }

    pub fn record_upstream_failure(&self) {
        self.upstream_request_failures.inc();
    }

    pub fn request_count(&self) -> u64 {
        self.request_duration.get_sample_count()
    }

    pub fn upstream_request_count(&self) -> u64 {
        self.upstream_request_duration.get_sample_count()
    }

    pub fn upstream_failures(&self) -> u64 {
        self.upstream_request_failures.get()
    }
}

fn register(registry: &Registry, collector: Box<dyn Collector>) {
    match registry.register(collector) {
        Ok(()) => {}
        Err(prometheus::Error::AlreadyReg) => {
            debug!("Collector already registered with this registry")
        }
        Err(e) => warn!(error = %e, "Failed to register metrics collector"),
    }
}

fn metrics_err(e: prometheus::Error) -> DomainError {
    DomainError::Metrics(e.to_string())
}
