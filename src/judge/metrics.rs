//! Prometheus metrics for the judging engine

use std::sync::{LazyLock, Once};

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

/// Global metrics registry
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Judged submissions by final status
pub static SUBMISSIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let opts = Opts::new("judge_submissions_total", "Judged submissions by status");
    IntCounterVec::new(opts, &["status"]).expect("Failed to create counter")
});

/// Test case outcomes by kind ("passed" or a failure kind)
pub static TEST_OUTCOMES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let opts = Opts::new("judge_test_outcomes_total", "Test case outcomes by kind");
    IntCounterVec::new(opts, &["outcome"]).expect("Failed to create counter")
});

/// Wall time of sandboxed runs
pub static SANDBOX_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        "judge_sandbox_duration_seconds",
        "Wall time of sandboxed test runs",
    )
    .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]);

    HistogramVec::new(opts, &["language"]).expect("Failed to create histogram")
});

/// Processes that could not be started
pub static SPAWN_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("judge_spawn_failures_total", "Sandbox processes that failed to start")
        .expect("Failed to create counter")
});

/// Evaluations currently in flight
pub static ACTIVE_EVALUATIONS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new("judge_active_evaluations", "Evaluations currently in flight")
        .expect("Failed to create gauge")
});

static INIT: Once = Once::new();

/// Register all metrics; safe to call more than once
pub fn init_metrics() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(SUBMISSIONS_TOTAL.clone()))
            .expect("Failed to register metric");
        REGISTRY
            .register(Box::new(TEST_OUTCOMES_TOTAL.clone()))
            .expect("Failed to register metric");
        REGISTRY
            .register(Box::new(SANDBOX_DURATION.clone()))
            .expect("Failed to register metric");
        REGISTRY
            .register(Box::new(SPAWN_FAILURES.clone()))
            .expect("Failed to register metric");
        REGISTRY
            .register(Box::new(ACTIVE_EVALUATIONS.clone()))
            .expect("Failed to register metric");
    });
}

/// Record a judged submission
pub fn record_submission(status: &str) {
    SUBMISSIONS_TOTAL.with_label_values(&[status]).inc();
}

/// Record one test run
pub fn record_test_run(language: &str, outcome: &str, duration_secs: f64) {
    SANDBOX_DURATION
        .with_label_values(&[language])
        .observe(duration_secs);
    TEST_OUTCOMES_TOTAL.with_label_values(&[outcome]).inc();
}

/// Keeps `ACTIVE_EVALUATIONS` raised while alive
pub struct ActiveEvaluation;

impl ActiveEvaluation {
    pub fn start() -> Self {
        ACTIVE_EVALUATIONS.inc();
        Self
    }
}

impl Drop for ActiveEvaluation {
    fn drop(&mut self) {
        ACTIVE_EVALUATIONS.dec();
    }
}

/// Render the registry in the Prometheus text format
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
