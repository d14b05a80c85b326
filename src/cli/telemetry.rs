//! Logging and optional OTLP trace export.
//!
//! Logs go to stderr, pretty by default or one JSON object per line when
//! `HEARTS_LOG_FORMAT=json`. Spans are exported over OTLP/gRPC only when
//! `OTEL_EXPORTER_OTLP_ENDPOINT` is set.

use anyhow::{anyhow, Context, Result};
use base64ct::{Base64, Encoding};
use opentelemetry::propagation::TextMapCompositePropagator;
use opentelemetry::{global, trace::TracerProvider as _, KeyValue};
use opentelemetry_otlp::{Compression, WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::{
    propagation::{BaggagePropagator, TraceContextPropagator},
    trace::{SdkTracerProvider, Tracer},
    Resource,
};
use std::{env::var, sync::OnceLock, time::Duration};
use tonic::{
    metadata::{Ascii, Binary, MetadataKey, MetadataMap, MetadataValue},
    transport::ClientTlsConfig,
};
use tracing::{debug, warn, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer, Registry};
use ulid::Ulid;
use url::Url;

const SERVICE_NAME: &str = env!("CARGO_PKG_NAME");
const ENV_LOG_FORMAT: &str = "HEARTS_LOG_FORMAT";
const ENV_ENVIRONMENT: &str = "HEARTS_ENVIRONMENT";

/// Libraries that stay quiet unless `RUST_LOG` names them.
const NOISY_TARGETS: &[(&str, Level)] = &[
    ("hyper", Level::ERROR),
    ("hyper_util", Level::ERROR),
    ("h2", Level::ERROR),
    ("tower", Level::WARN),
    ("reqwest", Level::WARN),
    ("tonic", Level::WARN),
    ("opentelemetry_sdk", Level::WARN),
    ("opentelemetry_otlp", Level::WARN),
];

static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(format) if format.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Collector and resource settings read from the environment.
#[derive(Debug)]
struct ExporterSettings {
    endpoint: Url,
    headers: Vec<(String, String)>,
    service_name: String,
    instance_id: String,
    environment: Option<String>,
}

impl ExporterSettings {
    /// `None` when no collector endpoint is configured.
    fn from_env() -> Result<Option<Self>> {
        let Some(endpoint) = non_empty_var("OTEL_EXPORTER_OTLP_ENDPOINT") else {
            return Ok(None);
        };

        if let Some(protocol) = non_empty_var("OTEL_EXPORTER_OTLP_PROTOCOL") {
            if protocol != "grpc" {
                debug!(protocol = %protocol, "only grpc OTLP export is supported");
            }
        }

        Ok(Some(Self {
            endpoint: collector_url(&endpoint)?,
            headers: non_empty_var("OTEL_EXPORTER_OTLP_HEADERS")
                .map(|headers| parse_headers(&headers))
                .unwrap_or_default(),
            service_name: non_empty_var("OTEL_SERVICE_NAME")
                .unwrap_or_else(|| SERVICE_NAME.to_string()),
            instance_id: non_empty_var("OTEL_SERVICE_INSTANCE_ID")
                .unwrap_or_else(|| Ulid::new().to_string()),
            environment: non_empty_var(ENV_ENVIRONMENT),
        }))
    }

    /// Host to verify when the collector speaks TLS.
    fn tls_domain(&self) -> Option<&str> {
        if self.endpoint.scheme() == "https" {
            self.endpoint.host_str()
        } else {
            None
        }
    }

    fn resource(&self) -> Resource {
        let mut attributes = vec![
            KeyValue::new("service.name", self.service_name.clone()),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            KeyValue::new("service.instance.id", self.instance_id.clone()),
        ];
        if let Some(environment) = &self.environment {
            attributes.push(KeyValue::new("deployment.environment", environment.clone()));
        }
        Resource::builder_empty().with_attributes(attributes).build()
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Collector URL; a bare `host:port` means TLS.
fn collector_url(raw: &str) -> Result<Url> {
    let raw = raw.trim().trim_end_matches('/');
    let url = if raw.contains("://") {
        Url::parse(raw)
    } else {
        Url::parse(&format!("https://{raw}"))
    }
    .with_context(|| format!("Invalid OTLP endpoint: {raw}"))?;

    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        "http" | "https" => Err(anyhow!("OTLP endpoint has no host: {raw}")),
        scheme => Err(anyhow!("Unsupported OTLP endpoint scheme: {scheme}")),
    }
}

/// `key=value` pairs separated by commas; malformed pairs are skipped.
fn parse_headers(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let key = key.trim();
            (!key.is_empty()).then(|| (key.to_ascii_lowercase(), value.trim().to_string()))
        })
        .collect()
}

// gRPC metadata keys ending in `-bin` carry base64 encoded bytes
fn grpc_metadata(headers: &[(String, String)]) -> Result<MetadataMap> {
    let mut metadata = MetadataMap::with_capacity(headers.len());

    for (key, value) in headers {
        if key.ends_with("-bin") {
            let bytes = Base64::decode_vec(value)
                .map_err(|e| anyhow!("OTLP header {key} is not base64: {e}"))?;
            let key = MetadataKey::<Binary>::from_bytes(key.as_bytes())
                .map_err(|e| anyhow!("Invalid OTLP header name {key}: {e}"))?;
            metadata.insert_bin(key, MetadataValue::from_bytes(&bytes));
        } else {
            let name = MetadataKey::<Ascii>::from_bytes(key.as_bytes())
                .map_err(|e| anyhow!("Invalid OTLP header name {key}: {e}"))?;
            let value: MetadataValue<Ascii> = value
                .parse()
                .map_err(|e| anyhow!("Invalid OTLP header value for {key}: {e}"))?;
            metadata.insert(name, value);
        }
    }

    Ok(metadata)
}

fn install_tracer(settings: &ExporterSettings) -> Result<Tracer> {
    let endpoint = settings.endpoint.as_str().trim_end_matches('/');

    let mut builder = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .with_compression(Compression::Gzip)
        .with_timeout(Duration::from_secs(3));

    if let Some(domain) = settings.tls_domain() {
        builder = builder.with_tls_config(
            ClientTlsConfig::new()
                .domain_name(domain.to_string())
                .with_native_roots(),
        );
    }

    if !settings.headers.is_empty() {
        builder = builder.with_metadata(grpc_metadata(&settings.headers)?);
    }

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(builder.build()?)
        .with_resource(settings.resource())
        .build();

    let _ = TRACER_PROVIDER.set(provider.clone());

    global::set_tracer_provider(provider.clone());
    global::set_text_map_propagator(TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ]));

    Ok(provider.tracer(SERVICE_NAME))
}

/// Caps for the noisy libraries, never louder than `level`, skipping any
/// target `rust_log` already sets.
fn noise_directives(level: Level, rust_log: Option<&str>) -> Vec<String> {
    let named = |target: &str| {
        rust_log.is_some_and(|rust_log| {
            rust_log.split(',').any(|directive| {
                let name = directive.split(['=', '[']).next().unwrap_or_default().trim();
                name == target || name.starts_with(&format!("{target}::"))
            })
        })
    };

    NOISY_TARGETS
        .iter()
        .filter(|(target, _)| !named(target))
        .map(|(target, cap)| format!("{target}={}", level.min(*cap).as_str().to_ascii_lowercase()))
        .collect()
}

fn filter(level: Level, rust_log: Option<&str>) -> Result<EnvFilter> {
    let mut filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .parse_lossy(rust_log.unwrap_or_default());

    for directive in noise_directives(level, rust_log) {
        filter = filter.add_directive(directive.parse()?);
    }

    Ok(filter)
}

fn fmt_layer(format: LogFormat) -> Box<dyn Layer<Registry> + Send + Sync> {
    match format {
        LogFormat::Pretty => fmt::layer()
            .with_file(false)
            .with_line_number(false)
            .with_target(false)
            .pretty()
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
    }
}

/// Install the global subscriber: stderr logs at `verbosity_level` (errors
/// only when `None`) plus the OTLP exporter when one is configured.
///
/// # Errors
///
/// Returns an error if the exporter settings are invalid or a global
/// subscriber is already installed
pub fn init(verbosity_level: Option<Level>) -> Result<()> {
    let level = verbosity_level.unwrap_or(Level::ERROR);
    let rust_log = non_empty_var("RUST_LOG");
    let format = LogFormat::parse(var(ENV_LOG_FORMAT).ok().as_deref());

    let otel_layer = match ExporterSettings::from_env()? {
        Some(settings) => Some(tracing_opentelemetry::layer().with_tracer(install_tracer(&settings)?)),
        None => None,
    };

    let subscriber = Registry::default()
        .with(fmt_layer(format))
        .with(otel_layer)
        .with(filter(level, rust_log.as_deref())?);
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

/// Flush and shut down the tracer provider, if one was installed.
pub fn shutdown_tracer() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        debug!("shutting down tracer provider");
        if let Err(err) = provider.shutdown() {
            warn!("Failed to flush traces: {err}");
        }
    }
}
