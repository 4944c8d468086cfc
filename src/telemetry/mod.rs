//! # Telemetry
//!
//! Logging and optional OpenTelemetry export for the runner.
//!
//! Every execution produces one span per step (`ui.step`) carrying the
//! phase, step number, action and element, closed with the step status.
//! With an OTLP endpoint configured, those spans are shipped to a
//! collector (Jaeger, Tempo, ...); without one, events only go to the
//! console.
//!
//! ```text
//! [execution login-test] ──────────────────────────────────>
//!   [ui.step setup#1 navigate] ─>
//!                [ui.step body#1 fill username_field] ──>
//!                                    [ui.step body#2 click login_button] ─>
//! ```
//!
//! ## Environment
//!
//! - `OTEL_SERVICE_NAME`: service name on exported spans
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP collector URL (gRPC)
//! - `OTEL_TRACES_SAMPLER_ARG`: sampling ratio, 0.0 to 1.0
//! - `RUST_LOG`: overrides the configured log level

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::runtime::Tokio;
use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler, Tracer, TracerProvider};
use opentelemetry_sdk::{trace as sdktrace, Resource};
use tracing::Level;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::LogFormat;

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    /// OTLP gRPC endpoint, e.g. `http://localhost:4317`. Console only when absent.
    pub otlp_endpoint: Option<String>,
    /// Fraction of traces kept, 0.0 to 1.0.
    pub sampling_ratio: f64,
    pub enable_console_logging: bool,
    pub log_format: LogFormat,
    pub log_level: Level,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "ui-runner".to_string(),
            otlp_endpoint: None,
            sampling_ratio: 1.0,
            enable_console_logging: true,
            log_format: LogFormat::Compact,
            log_level: Level::INFO,
        }
    }
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(name) = std::env::var("OTEL_SERVICE_NAME") {
            config.service_name = name;
        }

        if let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                config.otlp_endpoint = Some(endpoint);
            }
        }

        if let Ok(ratio) = std::env::var("OTEL_TRACES_SAMPLER_ARG") {
            if let Ok(r) = ratio.parse::<f64>() {
                config.sampling_ratio = r.clamp(0.0, 1.0);
            }
        }

        config
    }
}

// ============================================================================
// INIT
// ============================================================================

/// Installs the global subscriber.
///
/// Returns the OTLP tracer when export is configured, `None` for console
/// only. Call [`shutdown_telemetry`] before exit so batched spans flush.
pub fn init_telemetry(config: TelemetryConfig) -> anyhow::Result<Option<Tracer>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    let console: Option<Box<dyn Layer<Registry> + Send + Sync>> = if config.enable_console_logging {
        match config.log_format {
            LogFormat::Compact => Some(tracing_subscriber::fmt::layer().compact().boxed()),
            LogFormat::Json => Some(tracing_subscriber::fmt::layer().json().boxed()),
        }
    } else {
        None
    };

    let Some(endpoint) = &config.otlp_endpoint else {
        tracing_subscriber::registry()
            .with(console)
            .with(env_filter)
            .try_init()?;
        tracing::info!("Telemetry initialized (console only)");
        return Ok(None);
    };

    let tracer = init_otlp_tracer(&config.service_name, endpoint, config.sampling_ratio)?;

    tracing_subscriber::registry()
        .with(console)
        .with(OpenTelemetryLayer::new(tracer.clone()))
        .with(env_filter)
        .try_init()?;

    tracing::info!(
        service_name = %config.service_name,
        endpoint = %endpoint,
        sampling_ratio = config.sampling_ratio,
        "Telemetry initialized with OTLP export"
    );

    Ok(Some(tracer))
}

fn sampler_for(ratio: f64) -> Sampler {
    if ratio >= 1.0 {
        Sampler::AlwaysOn
    } else if ratio <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::TraceIdRatioBased(ratio)
    }
}

fn init_otlp_tracer(service_name: &str, endpoint: &str, sampling_ratio: f64) -> anyhow::Result<Tracer> {
    let tracer_provider = TracerProvider::builder()
        .with_batch_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint)
                .build_span_exporter()?,
            Tokio,
        )
        .with_config(
            sdktrace::Config::default()
                .with_sampler(sampler_for(sampling_ratio))
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(Resource::new(vec![KeyValue::new(
                    "service.name",
                    service_name.to_string(),
                )])),
        )
        .build();

    let tracer = tracer_provider.tracer(service_name.to_string());
    global::set_tracer_provider(tracer_provider);

    Ok(tracer)
}

/// Flushes batched spans.
pub fn shutdown_telemetry() {
    global::shutdown_tracer_provider();
    tracing::info!("Telemetry shut down");
}

// ============================================================================
// STEP SPANS
// ============================================================================

pub mod instrumentation {
    use std::time::Instant;
    use tracing::{field, info_span, Span};

    use crate::protocol::{ActionKind, ExecutionStatus, Phase, StepResult, TestStep};

    /// Attributes of one UI step span.
    #[derive(Debug)]
    pub struct StepSpanContext {
        pub phase: Phase,
        pub step_number: u32,
        pub action: ActionKind,
        pub element: Option<String>,
        pub start_time: Instant,
        pub status: Option<ExecutionStatus>,
        pub duration_ms: Option<u64>,
    }

    impl StepSpanContext {
        pub fn new(phase: Phase, step: &TestStep) -> Self {
            Self {
                phase,
                step_number: step.step_number,
                action: step.action,
                element: step.element_name().map(str::to_string),
                start_time: Instant::now(),
                status: None,
                duration_ms: None,
            }
        }

        /// A `ui.step` span with empty `status`/`duration_ms` slots.
        pub fn span(&self) -> Span {
            info_span!(
                "ui.step",
                phase = %self.phase,
                step = self.step_number,
                action = %self.action,
                element = self.element.as_deref().unwrap_or(""),
                status = field::Empty,
                duration_ms = field::Empty,
            )
        }

        pub fn finish(&mut self, result: &StepResult) {
            self.status = Some(result.status);
            self.duration_ms = Some(self.start_time.elapsed().as_millis() as u64);
        }

        /// Writes the outcome into the span opened by [`Self::span`].
        pub fn record(&self, span: &Span) {
            if let Some(status) = self.status {
                span.record("status", status.as_str());
            }
            if let Some(duration) = self.duration_ms {
                span.record("duration_ms", duration);
            }
        }

        pub fn attributes(&self) -> Vec<(&'static str, String)> {
            let mut attrs = vec![
                ("step.phase", self.phase.to_string()),
                ("step.number", self.step_number.to_string()),
                ("step.action", self.action.to_string()),
            ];

            if let Some(element) = &self.element {
                attrs.push(("step.element", element.clone()));
            }

            if let Some(status) = self.status {
                attrs.push(("step.status", status.to_string()));
            }

            if let Some(duration) = self.duration_ms {
                attrs.push(("step.duration_ms", duration.to_string()));
            }

            attrs
        }
    }
}
