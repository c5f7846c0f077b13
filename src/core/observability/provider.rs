use crate::app::config::{FileRotation, LogType, LoggingConfig, OtelProto};
use anyhow::{Context, Result, anyhow};
use opentelemetry::{KeyValue, global, trace::TracerProvider};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider};
use std::collections::HashMap;
use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::fmt::format::{FmtSpan, Writer};
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

type DynLayer = Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync + 'static>;

struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Utc::now().format("%Y-%m-%d %H:%M:%S"))
    }
}

/// Handles that must outlive logging: the otel provider to flush on
/// shutdown and the writer guards of the non blocking sinks
#[derive(Default)]
pub struct ObservabilityHandle {
    pub tracer_provider: Option<SdkTracerProvider>,
    guards: Vec<WorkerGuard>,
}

pub fn init(config: &LoggingConfig) -> Result<ObservabilityHandle> {
    config.validate()?;

    let crate_name = env!("CARGO_PKG_NAME").replace('-', "_");
    let filter = EnvFilter::from_default_env()
        .add_directive("warn".parse()?)
        .add_directive(format!("{}={}", crate_name, config.level).parse()?);

    let mut layers: Vec<DynLayer> = Vec::new();
    let mut handle = ObservabilityHandle::default();

    for sink in &config.sinks {
        match &sink.dest {
            LogType::Stdout { color, json, spans } => {
                let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
                handle.guards.push(guard);
                layers.push(fmt_layer(writer, *json, *spans, *color));
            }
            LogType::File {
                path,
                json,
                rotation,
                max_files,
                spans,
            } => {
                let (writer, guard) = create_file_writer(path, rotation, *max_files)?;
                handle.guards.push(guard);
                layers.push(fmt_layer(writer, *json, *spans, false));
            }
            LogType::Otel {
                endpoint,
                proto,
                headers,
            } => {
                if handle.tracer_provider.is_some() {
                    return Err(anyhow!(
                        "Multiple OTLP sinks configured. Only one is currently supported."
                    ));
                }

                let (otel_layer, provider) =
                    create_otel_layer(endpoint, proto, headers, config.span_sample_rate)?;
                layers.push(otel_layer);
                handle.tracer_provider = Some(provider);
            }
        }
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("failed to initialize tracing subscriber")?;

    if let Some(ref provider) = handle.tracer_provider {
        global::set_text_map_propagator(TraceContextPropagator::new());
        let _ = global::set_tracer_provider(provider.clone());
    }

    Ok(handle)
}

pub fn shutdown(handle: ObservabilityHandle) -> Result<()> {
    if let Some(provider) = &handle.tracer_provider {
        provider
            .shutdown()
            .context("failed to shutdown tracer provider")?;
    }

    // dropping the guards flushes buffered log lines
    drop(handle);
    Ok(())
}

fn fmt_layer(writer: NonBlocking, json: bool, spans: bool, color: bool) -> DynLayer {
    let span_events = if spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    if json {
        fmt::layer()
            .json()
            .with_writer(writer)
            .with_span_events(span_events)
            .boxed()
    } else {
        fmt::layer()
            .compact()
            .with_timer(CompactTime)
            .with_ansi(color)
            .with_writer(writer)
            .with_span_events(span_events)
            .boxed()
    }
}

fn create_file_writer(
    path: &Path,
    rotation: &FileRotation,
    max_files: usize,
) -> Result<(NonBlocking, WorkerGuard)> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("Invalid file name in path: {}", path.display()))?;

    let directory = path
        .parent()
        .ok_or_else(|| anyhow!("Invalid directory in path: {}", path.display()))?;

    if !directory.as_os_str().is_empty() {
        std::fs::create_dir_all(directory).with_context(|| {
            format!("failed to create log directory {}", directory.display())
        })?;
    }

    let file_appender = match rotation {
        FileRotation::Daily => tracing_appender::rolling::daily(directory, file_name),
        FileRotation::Hourly => tracing_appender::rolling::hourly(directory, file_name),
        FileRotation::Never => tracing_appender::rolling::never(directory, file_name),
    };

    cleanup_old_files(directory, file_name, max_files)?;

    Ok(tracing_appender::non_blocking(file_appender))
}

/// Keeps only the `max_files` most recently modified rotated files,
/// zero keeps everything
fn cleanup_old_files(directory: &Path, prefix: &str, max_files: usize) -> Result<()> {
    if max_files == 0 {
        return Ok(());
    }

    let dir = if directory.as_os_str().is_empty() {
        Path::new(".")
    } else {
        directory
    };

    let mut files: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(prefix))
        })
        .filter_map(|entry| {
            let modified = entry.metadata().ok()?.modified().ok()?;
            Some((entry.path(), modified))
        })
        .collect();

    if files.len() <= max_files {
        return Ok(());
    }

    files.sort_by(|a, b| b.1.cmp(&a.1));

    for (path, _) in files.iter().skip(max_files) {
        let _ = std::fs::remove_file(path);
    }

    Ok(())
}

fn create_otel_layer(
    endpoint: &str,
    proto: &OtelProto,
    headers: &HashMap<String, String>,
    sample_rate: f32,
) -> Result<(DynLayer, SdkTracerProvider)> {
    use opentelemetry_otlp::WithExportConfig;

    let exporter = match proto {
        OtelProto::Grpc => {
            if !headers.is_empty() {
                tracing::warn!("OTLP headers are only applied to the http exporter");
            }

            let mut builder = opentelemetry_otlp::SpanExporter::builder().with_tonic();
            if !endpoint.is_empty() {
                builder = builder.with_endpoint(endpoint);
            }

            builder
                .build()
                .context("failed to build OTLP gRPC exporter")?
        }
        OtelProto::Http => build_http_exporter(endpoint, headers)?,
    };

    let sampler = Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(sample_rate as f64)));

    let service_name =
        std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| env!("CARGO_PKG_NAME").to_string());
    let resource = Resource::builder()
        .with_service_name(service_name)
        .with_attribute(KeyValue::new("service.version", env!("CARGO_PKG_VERSION")))
        .build();

    let tracer_provider = SdkTracerProvider::builder()
        .with_sampler(sampler)
        .with_resource(resource)
        .with_batch_exporter(exporter)
        .build();

    let tracer = tracer_provider.tracer(env!("CARGO_PKG_NAME"));
    let layer = tracing_opentelemetry::layer().with_tracer(tracer).boxed();

    Ok((layer, tracer_provider))
}

#[cfg(feature = "otel-http")]
fn build_http_exporter(
    endpoint: &str,
    headers: &HashMap<String, String>,
) -> Result<opentelemetry_otlp::SpanExporter> {
    use opentelemetry_otlp::{WithExportConfig, WithHttpConfig};

    let mut builder = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_headers(headers.clone());
    if !endpoint.is_empty() {
        builder = builder.with_endpoint(endpoint);
    }

    builder
        .build()
        .context("failed to build OTLP HTTP exporter")
}

#[cfg(not(feature = "otel-http"))]
fn build_http_exporter(
    _: &str,
    _: &HashMap<String, String>,
) -> Result<opentelemetry_otlp::SpanExporter> {
    Err(anyhow!(
        "OTLP HTTP exporter requested but the build does not enable the `otel-http` feature"
    ))
}
