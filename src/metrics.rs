//! Prometheus metrics for sandbox observability
//!
//! All metrics live in one crate-wide registry so an embedding service can
//! expose them with [`gather_text`].

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    /// Kernel gateways launched (initial starts and restarts)
    pub static ref KERNEL_STARTS: IntCounter = register_counter(
        "codebox_kernel_starts_total",
        "Kernel gateway processes launched",
    );

    /// Restarts caused by a closed channel during `run`
    pub static ref KERNEL_RESTARTS: IntCounter = register_counter(
        "codebox_kernel_restarts_total",
        "Kernel restarts triggered by a closed channel",
    );

    /// Time from spawn to healthy liveness endpoint
    pub static ref KERNEL_START_DURATION: Histogram = register_histogram(
        "codebox_kernel_start_duration_seconds",
        "Time for a kernel gateway to become healthy",
        vec![0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0],
    );

    /// Executions by outcome kind (text, image, error)
    pub static ref EXECUTIONS: IntCounterVec = {
        let counter = IntCounterVec::new(
            Opts::new("codebox_executions_total", "Code executions by outcome kind"),
            &["outcome"],
        )
        .expect("valid metric definition");
        REGISTRY
            .register(Box::new(counter.clone()))
            .expect("metric registered once");
        counter
    };

    /// Wall time of a single `run`, retries included
    pub static ref EXECUTION_DURATION: Histogram = register_histogram(
        "codebox_execution_duration_seconds",
        "Wall time of one run call",
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0],
    );

    /// Packages installed after a missing-module error
    pub static ref PACKAGES_INSTALLED: IntCounter = register_counter(
        "codebox_packages_installed_total",
        "Packages installed through the sandbox",
    );
}

fn register_counter(name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help).expect("valid metric definition");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("metric registered once");
    counter
}

fn register_histogram(name: &str, help: &str, buckets: Vec<f64>) -> Histogram {
    let histogram = Histogram::with_opts(HistogramOpts::new(name, help).buckets(buckets))
        .expect("valid metric definition");
    REGISTRY
        .register(Box::new(histogram.clone()))
        .expect("metric registered once");
    histogram
}

/// Render every registered metric in the Prometheus text format
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::warn!(error = %e, "failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
