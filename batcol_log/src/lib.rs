//! Logging initialization shared by batcol binaries.
#![deny(missing_docs)]

use anyhow::{Context, Result};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry};

/// Handle for changing the active filter at runtime.
pub type FilterHandle = reload::Handle<EnvFilter, Registry>;

fn filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(level).with_context(|| format!("invalid log filter `{level}`"))
}

/// Initialize structured JSON logging into hourly rolled files under `dir`.
/// `level` is an env-filter directive such as `info` or `batcol_exec=debug`.
pub fn init(dir: &str, level: &str) -> Result<FilterHandle> {
    let appender = RollingFileAppender::new(Rotation::HOURLY, dir, "batcol.log");
    let (filter, handle) = reload::Layer::new(filter(level)?);
    let fmt_layer = fmt::layer()
        .with_writer(appender)
        .json()
        .with_current_span(false)
        .with_span_list(false);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .context("logging already initialized")?;
    Ok(handle)
}

/// Initialize compact human readable logging on stderr.
pub fn init_stderr(level: &str) -> Result<FilterHandle> {
    let (filter, handle) = reload::Layer::new(filter(level)?);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init()
        .context("logging already initialized")?;
    Ok(handle)
}

/// Replace the active filter.
pub fn set_level(handle: &FilterHandle, level: &str) -> Result<()> {
    handle.reload(filter(level)?).context("failed to reload log filter")
}
