//! Prometheus metrics for participant components.
//!
//! All metrics follow the naming convention: `participant_<area>_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // SCHEDULER METRICS
    // =========================================================================

    /// Completed `execute` phases per job
    pub static ref JOBS_EXECUTED: IntCounterVec = IntCounterVec::new(
        Opts::new("participant_jobs_executed_total", "Total job executions"),
        &["job"]
    ).expect("metric creation failed");

    /// Failed phases per job
    pub static ref JOB_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("participant_job_failures_total", "Job phases that returned an error"),
        &["job", "phase"]  // phase: data_in/execute/data_out
    ).expect("metric creation failed");

    /// Max-runtime violations per job and applied strategy
    pub static ref RUNTIME_VIOLATIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("participant_runtime_violations_total", "Jobs exceeding their max runtime"),
        &["job", "strategy"]
    ).expect("metric creation failed");

    /// Wall-clock duration of `execute`
    pub static ref JOB_EXECUTE_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "participant_job_execute_duration_seconds",
            "Time spent in job execute"
        ).buckets(exponential_buckets(0.00001, 2.0, 16).expect("bucket layout"))
    ).expect("metric creation failed");

    // =========================================================================
    // CLOCK METRICS
    // =========================================================================

    /// Reset sequences emitted per clock
    pub static ref CLOCK_RESETS: IntCounterVec = IntCounterVec::new(
        Opts::new("participant_clock_resets_total", "Clock reset sequences"),
        &["clock"]
    ).expect("metric creation failed");

    // =========================================================================
    // REGISTRY METRICS
    // =========================================================================

    /// Components added to a registry
    pub static ref COMPONENTS_LOADED: IntCounterVec = IntCounterVec::new(
        Opts::new("participant_components_loaded_total", "Components added to a registry"),
        &["source"]  // source: native/plugin
    ).expect("metric creation failed");
}

/// Handle proving the metrics are registered.
#[derive(Debug, Clone, Copy)]
pub struct MetricsHandle {
    _registered: (),
}

/// Register all metrics with the global registry. Calling it again is a no-op.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Scheduler
        Box::new(JOBS_EXECUTED.clone()),
        Box::new(JOB_FAILURES.clone()),
        Box::new(RUNTIME_VIOLATIONS.clone()),
        Box::new(JOB_EXECUTE_DURATION.clone()),
        // Clocks
        Box::new(CLOCK_RESETS.clone()),
        // Registry
        Box::new(COMPONENTS_LOADED.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle { _registered: () })
}

/// Encode all metrics as Prometheus text format.
pub fn gather_text() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Times a histogram observation. Observes on [`HistogramTimer::stop`] or on drop.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
    observed: bool,
}

impl HistogramTimer {
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
            observed: false,
        }
    }

    /// Observe now and return the elapsed time.
    pub fn stop(mut self) -> std::time::Duration {
        let elapsed = self.start.elapsed();
        self.histogram.observe(elapsed.as_secs_f64());
        self.observed = true;
        elapsed
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        if !self.observed {
            self.histogram.observe(self.start.elapsed().as_secs_f64());
        }
    }
}

/// Start timing for a histogram.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::metrics::HistogramTimer::new(&$histogram)
    };
}
