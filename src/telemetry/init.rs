//! OTLP tracer provider setup.

use super::config::TelemetryConfig;
use crate::errors::{Error, Result};
use opentelemetry::KeyValue;
use opentelemetry_otlp::{WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider};
use opentelemetry_sdk::Resource;
use opentelemetry_semantic_conventions::resource::SERVICE_VERSION;
use tracing::{info, warn};

/// Providers built at startup. Keep this alive for the life of the process
/// and call [`TelemetryProviders::shutdown`] before exit so buffered spans are
/// flushed.
#[derive(Debug, Default)]
pub struct TelemetryProviders {
    pub tracer_provider: Option<SdkTracerProvider>,
}

impl TelemetryProviders {
    pub async fn shutdown(self) {
        let Some(provider) = self.tracer_provider else {
            return;
        };
        // Flushing the batch processor blocks on the exporter.
        let result = tokio::task::spawn_blocking(move || provider.shutdown()).await;
        match result {
            Ok(Ok(())) => info!("tracer provider shut down"),
            Ok(Err(e)) => warn!(error = %e, "tracer provider shutdown failed"),
            Err(e) => warn!(error = %e, "tracer provider shutdown task failed"),
        }
    }
}

fn resource(config: &TelemetryConfig) -> Resource {
    Resource::builder()
        .with_service_name(config.service_name.clone())
        .with_attribute(KeyValue::new(SERVICE_VERSION, config.service_version.clone()))
        .with_attribute(KeyValue::new("service.namespace", config.service_namespace.clone()))
        .with_attribute(KeyValue::new("deployment.environment.name", config.environment.clone()))
        .build()
}

/// Build the tracer provider described by `config`.
///
/// Returns empty providers when tracing is disabled; the caller then wires
/// no-op sinks. The provider is not installed globally.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryProviders> {
    if !config.traces_enabled() {
        info!(
            enabled = config.enabled,
            use_noop = config.use_noop,
            environment = %config.environment,
            "trace export disabled"
        );
        return Ok(TelemetryProviders::default());
    }

    let endpoint = config.export_endpoint();
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint.clone())
        .with_timeout(config.traces_timeout)
        .with_headers(config.traces_headers.clone())
        .build()
        .map_err(|e| Error::config(format!("failed to build OTLP span exporter: {}", e)))?;

    let sampler = Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(config.sample_rate)));
    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_sampler(sampler)
        .with_resource(resource(config))
        .build();

    info!(
        endpoint = %endpoint,
        insecure = config.traces_insecure,
        sample_rate = config.sample_rate,
        service_name = %config.service_name,
        "OTLP trace export initialized"
    );

    Ok(TelemetryProviders { tracer_provider: Some(provider) })
}
