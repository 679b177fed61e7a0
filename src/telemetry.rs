//! Tracing initialization.
//!
//! Controlled by `CLASSMERGE_TRACE`:
//! - unset or empty → no subscriber (tracing disabled)
//! - `"stderr"` or `"json"` → JSON spans/events to stderr
//! - `"text"` → human-readable events to stderr
//!
//! `RUST_LOG` refines the filter; the default level is `info`.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

/// Environment variable selecting the tracing output.
pub const TRACE_ENV: &str = "CLASSMERGE_TRACE";

/// Output selected by [`TRACE_ENV`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraceMode {
    /// Tracing disabled.
    Off,
    /// JSON lines on stderr.
    Json,
    /// Plain text on stderr.
    Text,
}

impl TraceMode {
    /// Interpret a `CLASSMERGE_TRACE` value.
    #[must_use]
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => Self::Off,
            Some("text") => Self::Text,
            Some("stderr" | "json") => Self::Json,
            Some(other) => {
                eprintln!("warning: unknown {TRACE_ENV} value {other:?}, using json");
                Self::Json
            }
        }
    }
}

/// Initialize tracing from the environment.
pub fn init() {
    let value = std::env::var(TRACE_ENV).ok();
    match TraceMode::from_env_value(value.as_deref()) {
        TraceMode::Off => {}
        TraceMode::Json => init_json(),
        TraceMode::Text => init_text(),
    }
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn init_json() {
    tracing_subscriber::registry()
        .with(filter())
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_span_events(FmtSpan::CLOSE),
        )
        .init();
}

fn init_text() {
    tracing_subscriber::registry()
        .with(filter())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}
