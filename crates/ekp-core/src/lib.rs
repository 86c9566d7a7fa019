#[cfg(feature = "env")]
pub mod env;
#[cfg(feature = "opentelemetry")]
pub mod otel;
