mod metrics;

pub use metrics::{
    HistogramSummary, MetricsRecorder, ENRICHMENT_BATCH_DURATION, ENRICHMENT_DOCUMENTS_TOTAL,
    SYNTHESIS_CYCLES_TOTAL, SYNTHESIS_CYCLE_DURATION, SYNTHESIS_DOCUMENTS_TOTAL,
};

use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "nerv_llm" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// JSON lines on stderr; otherwise human-readable output.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { log_level: Level::INFO, module_levels: Vec::new(), json: true }
    }
}

impl TelemetryConfig {
    /// `EnvFilter` directive string for this config.
    pub fn filter_directives(&self) -> String {
        let mut filter_str = self.log_level.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            filter_str.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
        }
        filter_str
    }
}

/// Handle returned by [`init_telemetry`].
pub struct TelemetryGuard {
    metrics: Arc<MetricsRecorder>,
}

impl TelemetryGuard {
    /// Shared recorder to hand to pipelines as their observer.
    pub fn metrics(&self) -> Arc<MetricsRecorder> {
        self.metrics.clone()
    }
}

/// Initialize the telemetry subsystem. Call once at startup; later calls
/// keep the first subscriber.
pub fn init_telemetry(config: TelemetryConfig) -> TelemetryGuard {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directives()));

    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .with_writer(std::io::stderr)
            .with_filter(env_filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .with_filter(env_filter)
            .boxed()
    };

    if let Err(e) = tracing_subscriber::registry().with(fmt_layer).try_init() {
        eprintln!("nerv-telemetry: subscriber already installed: {e}");
    }

    TelemetryGuard { metrics: Arc::new(MetricsRecorder::new()) }
}
