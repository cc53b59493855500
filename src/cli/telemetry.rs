//! Log output and optional OTLP trace export.
//!
//! Spans are exported over gRPC only when `OTEL_EXPORTER_OTLP_ENDPOINT` is set;
//! otherwise warden only writes to stderr.

use anyhow::{Result, anyhow};
use base64ct::{Base64, Encoding};
use opentelemetry::propagation::TextMapCompositePropagator;
use opentelemetry::{KeyValue, global, trace::TracerProvider as _};
use opentelemetry_otlp::{Compression, WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::{
    Resource,
    propagation::{BaggagePropagator, TraceContextPropagator},
    trace::{SdkTracerProvider, Tracer},
};
use std::{collections::BTreeMap, env::var, sync::OnceLock, time::Duration};
use tonic::{
    metadata::{Ascii, Binary, MetadataKey, MetadataMap, MetadataValue},
    transport::ClientTlsConfig,
};
use tracing::{Level, debug};
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt};
use ulid::Ulid;

const DEFAULT_ENDPOINT: &str = "http://localhost:4317";
const EXPORT_TIMEOUT: Duration = Duration::from_secs(3);

static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// Exporter settings read from the standard `OTEL_*` variables.
#[derive(Debug, Clone, PartialEq, Eq)]
struct OtlpSettings {
    endpoint: String,
    headers: BTreeMap<String, String>,
    instance_id: String,
}

impl OtlpSettings {
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(protocol) = lookup("OTEL_EXPORTER_OTLP_PROTOCOL")
            && protocol != "grpc"
        {
            debug!("OTEL_EXPORTER_OTLP_PROTOCOL='{protocol}' ignored, exporting over grpc");
        }

        Self {
            endpoint: normalize_endpoint(
                lookup("OTEL_EXPORTER_OTLP_ENDPOINT").unwrap_or_else(|| DEFAULT_ENDPOINT.into()),
            ),
            headers: lookup("OTEL_EXPORTER_OTLP_HEADERS")
                .map(|raw| parse_headers(&raw))
                .unwrap_or_default(),
            instance_id: lookup("OTEL_SERVICE_INSTANCE_ID")
                .unwrap_or_else(|| Ulid::new().to_string()),
        }
    }

    /// Host to verify the collector certificate against, for https endpoints.
    fn tls_domain(&self) -> Option<&str> {
        self.endpoint
            .strip_prefix("https://")
            .and_then(|rest| rest.split('/').next())
            .and_then(|authority| authority.split(':').next())
            .filter(|host| !host.is_empty())
    }
}

/// Parse `key=value,key2=value2`. Pairs without `=` are skipped.
fn parse_headers(raw: &str) -> BTreeMap<String, String> {
    raw.split(',')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let key = key.trim();
            (!key.is_empty()).then(|| (key.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Keys ending in `-bin` carry base64 encoded binary values.
fn headers_to_metadata(headers: &BTreeMap<String, String>) -> Result<MetadataMap> {
    let mut metadata = MetadataMap::with_capacity(headers.len());

    for (key, value) in headers {
        let key = key.to_ascii_lowercase();

        if key.ends_with("-bin") {
            let bytes = Base64::decode_vec(value)
                .map_err(|err| anyhow!("failed to base64-decode value for {key}: {err}"))?;
            let name = MetadataKey::<Binary>::from_bytes(key.as_bytes())
                .map_err(|err| anyhow!("invalid binary metadata key {key}: {err}"))?;
            metadata.insert_bin(name, MetadataValue::from_bytes(&bytes));
        } else {
            let name = MetadataKey::<Ascii>::from_bytes(key.as_bytes())
                .map_err(|err| anyhow!("invalid metadata key {key}: {err}"))?;
            let value: MetadataValue<Ascii> = value
                .parse()
                .map_err(|err| anyhow!("invalid metadata value for {key}: {err}"))?;
            metadata.insert(name, value);
        }
    }

    Ok(metadata)
}

fn normalize_endpoint(endpoint: String) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint
    } else {
        format!("https://{}", endpoint.trim_end_matches('/'))
    }
}

fn init_tracer(settings: &OtlpSettings) -> Result<Tracer> {
    let mut builder = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&settings.endpoint)
        .with_compression(Compression::Gzip)
        .with_timeout(EXPORT_TIMEOUT);

    if let Some(domain) = settings.tls_domain() {
        builder = builder.with_tls_config(
            ClientTlsConfig::new()
                .domain_name(domain.to_string())
                .with_native_roots(),
        );
    }

    if !settings.headers.is_empty() {
        builder = builder.with_metadata(headers_to_metadata(&settings.headers)?);
    }

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(builder.build()?)
        .with_resource(
            Resource::builder_empty()
                .with_attributes(vec![
                    KeyValue::new("service.name", env!("CARGO_PKG_NAME")),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                    KeyValue::new("service.instance.id", settings.instance_id.clone()),
                ])
                .build(),
        )
        .build();

    let _ = TRACER_PROVIDER.set(provider.clone());

    global::set_tracer_provider(provider.clone());
    global::set_text_map_propagator(TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ]));

    Ok(provider.tracer(env!("CARGO_PKG_NAME")))
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns an error if the exporter cannot be built or a subscriber is already set.
pub fn init(verbosity_level: Option<Level>) -> Result<()> {
    let fmt_layer = fmt::layer()
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_target(false)
        .pretty();

    let filter = EnvFilter::builder()
        .with_default_directive(verbosity_level.unwrap_or(Level::ERROR).into())
        .from_env_lossy()
        .add_directive("hyper=error".parse()?)
        .add_directive("tokio=error".parse()?)
        .add_directive("sqlx=warn".parse()?)
        .add_directive("opentelemetry_sdk=warn".parse()?);

    if var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let settings = OtlpSettings::from_lookup(|name| var(name).ok());
        let tracer = init_tracer(&settings)?;
        let subscriber = Registry::default()
            .with(fmt_layer)
            .with(tracing_opentelemetry::layer().with_tracer(tracer))
            .with(filter);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = Registry::default().with(fmt_layer).with(filter);
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}

/// Flush and stop the exporter. Noop when tracing was never enabled.
pub fn shutdown_tracer() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        debug!("shutting down tracer provider");
        let _ = provider.shutdown();
    }
}
