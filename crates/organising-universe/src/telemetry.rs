use crate::config::{LogFormat, TelemetryConfig};
use std::fmt;
use tracing::Subscriber;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

pub type BoxedSubscriber = Box<dyn Subscriber + Send + Sync + 'static>;

#[derive(Debug)]
pub enum TelemetryError {
    EnvFilter { value: String, source: ParseError },
    Subscriber(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryError::EnvFilter { value, .. } => {
                write!(f, "invalid log filter '{}' for the reconciliation engine", value)
            }
            TelemetryError::Subscriber(err) => {
                write!(f, "could not install the engine log subscriber: {err}")
            }
        }
    }
}

impl std::error::Error for TelemetryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TelemetryError::EnvFilter { source, .. } => Some(source),
            TelemetryError::Subscriber(err) => Some(&**err),
        }
    }
}

/// Install the global subscriber writing to stdout.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let subscriber = subscriber(config, std::io::stdout)?;
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|err| TelemetryError::Subscriber(Box::new(err)))
}

/// Build the engine subscriber for `writer` without installing it. `RUST_LOG` wins over the
/// configured level when present. In `Json` format the audit-failure escalation arrives as
/// `{"level":"ERROR","fields":{"alert":"critical",...}}`.
pub fn subscriber<W>(config: &TelemetryConfig, writer: W) -> Result<BoxedSubscriber, TelemetryError>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let env_filter = filter(config)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_ansi(false)
        .with_writer(writer);

    let subscriber: BoxedSubscriber = match config.format {
        LogFormat::Compact => Box::new(builder.compact().finish()),
        LogFormat::Json => Box::new(builder.json().with_current_span(false).finish()),
    };
    Ok(subscriber)
}

fn filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.log_level).map_err(|source| {
            TelemetryError::EnvFilter {
                value: config.log_level.clone(),
                source,
            }
        }),
    }
}
