use time::{UtcOffset, format_description::well_known::Rfc3339};
use tracing::Subscriber;
use tracing_subscriber::{
    fmt, fmt::time::OffsetTime, layer::SubscriberExt, registry::LookupSpan,
    util::{SubscriberInitExt, TryInitError},
};

use crate::logger::{config::LoggerConfig, error::LoggerError, format::LoggerFormat};

/// Build the layer stack for `cfg.format` on top of the level filter and make it the global default.
pub(crate) fn install(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    let base = tracing_subscriber::registry().with(cfg.level.filter()?);

    let installed = match cfg.format {
        LoggerFormat::Text => base
            .with(
                fmt::layer()
                    .with_ansi(cfg.use_color)
                    .with_target(cfg.with_targets)
                    .with_thread_names(true)
                    .with_timer(local_timer()),
            )
            .try_init(),
        LoggerFormat::Json => base
            .with(
                fmt::layer()
                    .json()
                    .with_target(cfg.with_targets)
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_timer(local_timer()),
            )
            .try_init(),
        LoggerFormat::Journald => return journald(base),
    };
    installed.map_err(init_error)
}

/// RFC 3339 timestamps in the host offset.
///
/// `time` reads the local offset only while the process has a single thread and falls back
/// to UTC afterwards.
fn local_timer() -> OffsetTime<Rfc3339> {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetTime::new(offset, Rfc3339)
}

fn init_error(err: TryInitError) -> LoggerError {
    let text = err.to_string();
    if text.contains("global default") {
        LoggerError::AlreadyInitialized
    } else {
        LoggerError::InitializationFailed(text)
    }
}

#[cfg(all(target_os = "linux", feature = "journald"))]
fn journald<S>(base: S) -> Result<(), LoggerError>
where
    S: Subscriber + for<'a> LookupSpan<'a> + Send + Sync + 'static,
{
    let layer = tracing_journald::layer()
        .map_err(|e| LoggerError::InitializationFailed(format!("journald: {e}")))?
        .with_syslog_identifier("qwatch".to_string());
    base.with(layer).try_init().map_err(init_error)
}

#[cfg(not(all(target_os = "linux", feature = "journald")))]
fn journald<S>(_base: S) -> Result<(), LoggerError>
where
    S: Subscriber + for<'a> LookupSpan<'a> + Send + Sync + 'static,
{
    Err(LoggerError::JournaldNotSupported)
}
