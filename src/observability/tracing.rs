//! Structured logging and span propagation (§4.11, §B.2).
//!
//! A `tracing-subscriber` JSON formatter is the logger facade; every log
//! line passes through it with whatever fields the call site attached
//! (`trace_id`, `method`, `path`, `task_type`, ...). When an OTLP endpoint
//! is configured and the crate is built with the `otel` feature, a
//! `tracing-opentelemetry` layer additionally bridges spans to the
//! configured collector over gRPC; trace context propagates from HTTP
//! into worker tasks via the request id carried in task metadata, not a
//! separate mechanism.

use std::sync::Once;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::error::Result;

static INIT: Once = Once::new();

#[cfg(feature = "otel")]
static TRACER_PROVIDER: std::sync::OnceLock<opentelemetry_sdk::trace::SdkTracerProvider> = std::sync::OnceLock::new();

/// Initializes the global tracing subscriber. Safe to call more than once
/// per process (subsequent calls are no-ops) — tests in this crate each
/// build their own `Config` and may call this repeatedly.
pub fn init_tracing(config: &Config) -> Result<()> {
    let mut init_result = Ok(());
    INIT.call_once(|| {
        init_result = try_init(config);
    });
    init_result
}

fn try_init(config: &Config) -> Result<()> {
    let env_filter = EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().json().with_target(true);
    let registry = tracing_subscriber::registry().with(env_filter).with(fmt_layer);

    match &config.observability.otlp_endpoint {
        Some(endpoint) if !endpoint.is_empty() => {
            #[cfg(feature = "otel")]
            {
                let otel_layer = build_otel_layer(endpoint, &config.service.name)?;
                registry.with(otel_layer).init();
                tracing::info!(endpoint, "otlp span export enabled");
            }
            #[cfg(not(feature = "otel"))]
            {
                registry.init();
                tracing::warn!(endpoint, "otlp_endpoint is configured but the otel feature is not compiled in; spans stay local");
            }
        }
        _ => registry.init(),
    }

    tracing::info!(service = %config.service.name, "tracing initialized");
    Ok(())
}

#[cfg(feature = "otel")]
fn build_otel_layer(
    endpoint: &str,
    service_name: &str,
) -> Result<tracing_opentelemetry::OpenTelemetryLayer<tracing_subscriber::Registry, opentelemetry_sdk::trace::Tracer>> {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_otlp::WithExportConfig;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| crate::error::Error::Internal(format!("failed to build otlp exporter: {e}")))?;

    let resource = opentelemetry_sdk::Resource::builder().with_service_name(service_name.to_string()).build();

    let provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build();

    let tracer = provider.tracer(service_name.to_string());
    opentelemetry::global::set_tracer_provider(provider.clone());
    let _ = TRACER_PROVIDER.set(provider);

    Ok(tracing_opentelemetry::layer().with_tracer(tracer))
}

/// Flushes any buffered spans on a bounded deadline and releases the
/// tracer provider (§4.6: shutdown flushes exporters before the process
/// exits). A no-op when the `otel` feature isn't compiled in or no
/// exporter was ever configured.
pub async fn shutdown_tracing() {
    #[cfg(feature = "otel")]
    if let Some(provider) = TRACER_PROVIDER.get() {
        if let Err(e) = provider.shutdown() {
            tracing::warn!(error = %e, "failed to flush otlp span exporter during shutdown");
        }
    }

    tracing::info!("tracing shutdown complete");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_does_not_panic_and_is_idempotent() {
        let config = Config::default();
        assert!(init_tracing(&config).is_ok());
        assert!(init_tracing(&config).is_ok());
    }
}
