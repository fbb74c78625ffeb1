//! `OpenTelemetry` export for the portal server.
//!
//! Compiled only with the `metrics` feature. Spans from registration,
//! provisioning and token handling are exported over OTLP; a meter provider
//! is registered globally alongside the tracer.

use opentelemetry::global;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::{SdkTracerProvider, Tracer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Errors raised while building or shutting down the telemetry pipeline.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("failed to build OTLP exporter: {0}")]
    ExporterBuild(#[from] opentelemetry_otlp::ExporterBuildError),

    #[error("OpenTelemetry SDK error: {0}")]
    Sdk(#[from] opentelemetry_sdk::error::OTelSdkError),
}

/// Keeps the tracer and meter providers alive.
///
/// Call [`TelemetryGuard::shutdown`] before exit to flush buffered data;
/// dropping the guard does not flush.
pub struct TelemetryGuard {
    tracer_provider: SdkTracerProvider,
    meter_provider: SdkMeterProvider,
}

impl TelemetryGuard {
    pub fn shutdown(self) -> Result<(), TelemetryError> {
        self.tracer_provider.shutdown()?;
        self.meter_provider.shutdown()?;
        Ok(())
    }

    fn tracer(&self) -> Tracer {
        self.tracer_provider.tracer("portal-server")
    }
}

/// Build the OTLP exporters for `endpoint` (gRPC, e.g. `http://localhost:4317`)
/// and register them as the global providers.
pub fn init_telemetry(endpoint: &str) -> Result<TelemetryGuard, TelemetryError> {
    let span_exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;
    let tracer_provider = SdkTracerProvider::builder()
        .with_batch_exporter(span_exporter)
        .build();
    global::set_tracer_provider(tracer_provider.clone());

    let metric_exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;
    let meter_provider = SdkMeterProvider::builder()
        .with_periodic_exporter(metric_exporter)
        .build();
    global::set_meter_provider(meter_provider.clone());

    Ok(TelemetryGuard {
        tracer_provider,
        meter_provider,
    })
}

/// Like [`crate::tracing_init::init_tracing`], with an extra layer that
/// forwards spans to the OTLP tracer held by `guard`.
pub fn init_tracing_with_telemetry(default_filter: &str, log_json: bool, guard: &TelemetryGuard) {
    let env_filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
    );
    let otel = tracing_opentelemetry::layer().with_tracer(guard.tracer());
    if log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(otel)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(otel)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
