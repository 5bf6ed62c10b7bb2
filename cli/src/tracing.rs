use std::str::FromStr;

use anyhow::{anyhow, Result};
use tracing_subscriber::field::MakeExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer};
use yansi::Paint;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogType {
    #[default]
    Formatted,
    Simple,
    Json,
}

impl FromStr for LogType {
    type Err = anyhow::Error;

    fn from_str(input: &str) -> Result<Self> {
        match input {
            "formatted" => Ok(Self::Formatted),
            "simple" => Ok(Self::Simple),
            "json" | "prod" | "production" => Ok(Self::Json),
            _ => Err(anyhow!("unknown log type: {}", input)),
        }
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum LogLevel {
    /// Only shows errors and warnings
    Error,
    /// Shows errors, warnings, and some informational messages that are likely
    /// to be relevant when troubleshooting such as configuration
    Warn,
    /// Shows everything except debug and trace information
    Info,
    /// Shows debug information
    Debug,
    /// Shows everything
    Trace,
    /// Shows nothing
    Off,
}

impl FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match &*s.to_ascii_lowercase() {
            "critical" | "error" => Ok(LogLevel::Error),
            "support" | "warn" => Ok(LogLevel::Warn),
            "normal" | "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            "off" => Ok(LogLevel::Off),
            _ => Err(anyhow!("unrecognized log level: {}", s)),
        }
    }
}

pub fn filter_layer(level: LogLevel) -> Result<EnvFilter> {
    let filter_str = match level {
        LogLevel::Error => "warn,hyper=off,rustls=off,reqwest=off",
        LogLevel::Warn => "warn,relaygate::server=info,hyper=off,rustls=off,reqwest=off",
        LogLevel::Info => "info,hyper=off,rustls=off,reqwest=warn",
        LogLevel::Debug => "debug,hyper=info,rustls=off,reqwest=info",
        LogLevel::Trace => "trace,hyper=info,rustls=off,reqwest=debug,mio=debug,tokio_util=off",
        LogLevel::Off => "off",
    };

    Ok(EnvFilter::try_new(filter_str)?)
}

pub fn simple_logging_layer<S>() -> impl Layer<S>
where
    S: tracing::Subscriber,
    S: for<'span> LookupSpan<'span>,
{
    tracing_subscriber::fmt::layer()
        .compact()
        .with_file(false)
        .with_line_number(false)
        .with_target(false)
        .without_time()
}

pub fn default_logging_layer<S>() -> impl Layer<S>
where
    S: tracing::Subscriber,
    S: for<'span> LookupSpan<'span>,
{
    let field_format = tracing_subscriber::fmt::format::debug_fn(|writer, field, value| {
        // We'll format the field name and value separated with a colon.
        if field.name() == "message" {
            write!(writer, "{:?}", Paint::new(value).bold())
        } else {
            write!(writer, "{}: {:?}", field, Paint::default(value).bold())
        }
    })
    .delimited(", ")
    .display_messages();

    tracing_subscriber::fmt::layer().fmt_fields(field_format)
}

pub fn json_logging_layer<S>() -> impl Layer<S>
where
    S: tracing::Subscriber,
    S: for<'span> LookupSpan<'span>,
{
    Paint::disable();

    tracing_subscriber::fmt::layer().json()
}

/// Routes `log` records of the gateway through a tracing subscriber.
///
/// `LOG_TYPE` selects the output format, `LOG_LEVEL` takes precedence over
/// the level passed in.
pub fn init(log_level: Option<LogLevel>) -> Result<()> {
    use tracing_log::LogTracer;
    use tracing_subscriber::prelude::*;

    LogTracer::init()?;

    let log_type = match std::env::var("LOG_TYPE") {
        Ok(log_type) => log_type.parse()?,
        Err(_) => LogType::default(),
    };
    let log_level = match std::env::var("LOG_LEVEL") {
        Ok(level) => level.parse()?,
        Err(_) => log_level.unwrap_or(LogLevel::Info),
    };

    let registry = tracing_subscriber::registry().with(filter_layer(log_level)?);
    match log_type {
        LogType::Formatted => {
            tracing::subscriber::set_global_default(registry.with(default_logging_layer()))?
        }
        LogType::Simple => {
            tracing::subscriber::set_global_default(registry.with(simple_logging_layer()))?
        }
        LogType::Json => {
            tracing::subscriber::set_global_default(registry.with(json_logging_layer()))?
        }
    };

    Ok(())
}
