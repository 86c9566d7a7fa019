use std::{env, ffi::OsStr};

#[cfg(feature = "opentelemetry-otlp")]
use opentelemetry_otlp as otlp;
#[cfg(feature = "opentelemetry-otlp")]
use opentelemetry_sdk as sdk;
use tracing::{debug, dispatcher, Subscriber};
use tracing_subscriber::{
    layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt, Layer, Registry,
};

const KEY: &str = "RUST_LOG";

const SERVICE_NAME_KEY: &str = "OTEL_SERVICE_NAME";

fn init_layer_env_filter<S>() -> impl Layer<S>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    ::tracing_subscriber::EnvFilter::from_default_env()
}

fn init_layer_stdfmt<S>() -> impl Layer<S>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    // Synthesized templates go to stdout, so logs stay on stderr
    ::tracing_subscriber::fmt::layer().with_writer(::std::io::stderr)
}

#[cfg(feature = "opentelemetry-otlp")]
fn init_layer_otlp_tracer<S>() -> Option<impl Layer<S>>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    use opentelemetry::trace::TracerProvider;
    use sdk::runtime::Tokio as Runtime;

    let name = env::var(SERVICE_NAME_KEY).unwrap_or_else(|_| "ekp".into());

    let exporter = match otlp::SpanExporter::builder().with_tonic().build() {
        Ok(exporter) => exporter,
        Err(error) => {
            eprintln!("failed to init a span exporter: {error}");
            return None;
        }
    };

    let provider = sdk::trace::TracerProvider::builder()
        .with_batch_exporter(exporter, Runtime)
        .build();

    Some(::tracing_opentelemetry::OpenTelemetryLayer::new(
        provider.tracer(name),
    ))
}

fn init_once_opentelemetry(export: bool) {
    // Skip init if has been set
    if dispatcher::has_been_set() {
        return;
    }

    if env::var_os(SERVICE_NAME_KEY).is_none() {
        env::set_var(SERVICE_NAME_KEY, env!("CARGO_CRATE_NAME"));
    }

    let layer = Registry::default()
        .with(init_layer_env_filter())
        .with(init_layer_stdfmt());

    let is_otel_exporter_activated = env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok();
    if export && is_otel_exporter_activated {
        #[cfg(feature = "opentelemetry-otlp")]
        let layer = layer.with(init_layer_otlp_tracer());

        layer.init()
    } else {
        if export && !is_otel_exporter_activated {
            debug!("OTEL exporter is not activated.");
        }

        layer.init()
    }
}

pub fn init_once() {
    init_once_with_default(true)
}

pub fn init_once_with(level: impl AsRef<OsStr>, export: bool) {
    // Skip init if has been set
    if dispatcher::has_been_set() {
        return;
    }

    env::set_var(KEY, level);
    init_once_opentelemetry(export)
}

pub fn init_once_with_default(export: bool) {
    // Skip init if has been set
    if dispatcher::has_been_set() {
        return;
    }

    if env::var_os(KEY).is_none() {
        env::set_var(KEY, "INFO");
    }
    init_once_opentelemetry(export)
}

/// Initialises with the level selected by the number of `-v` flags.
///
/// Without any flag a `RUST_LOG` already set in the environment is kept.
pub fn init_once_with_level_int(level: u8, export: bool) {
    match verbosity_override(level, env::var_os(KEY).is_some()) {
        Some(level) => init_once_with(level, export),
        None => init_once_with_default(export),
    }
}

const fn verbosity_override(level: u8, has_env_filter: bool) -> Option<&'static str> {
    if level == 0 && has_env_filter {
        None
    } else {
        Some(level_from_verbosity(level))
    }
}

/// Maps the number of `-v` flags onto a tracing level.
///
/// Anything above `3` is clamped to `TRACE`.
pub const fn level_from_verbosity(level: u8) -> &'static str {
    match level {
        0 => "WARN",
        1 => "INFO",
        2 => "DEBUG",
        _ => "TRACE",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_is_clamped() {
        assert_eq!(level_from_verbosity(0), "WARN");
        assert_eq!(level_from_verbosity(2), "DEBUG");
        assert_eq!(level_from_verbosity(9), "TRACE");
    }

    #[test]
    fn environment_filter_wins_only_without_flags() {
        assert_eq!(verbosity_override(0, false), Some("WARN"));
        assert_eq!(verbosity_override(0, true), None);
        assert_eq!(verbosity_override(1, true), Some("INFO"));
    }
}
