use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{LogFormat, LoggingConfig};

// Quiet by default even when the service itself runs at debug/trace.
const NOISY_CRATES: &str = "hyper=warn,h2=warn,rustls=warn";

#[derive(thiserror::Error, Debug)]
pub enum LoggingError {
    #[error("invalid log filter '{directive}': {source}")]
    Filter {
        directive: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("global subscriber already installed: {0}")]
    AlreadyInstalled(#[from] tracing_subscriber::util::TryInitError),
}

/// Filter directive for the configured level raised by `-v` flags
/// (`-v` info, `-vv` debug, `-vvv` trace).
#[must_use]
pub fn filter_directive(config: &LoggingConfig, verbosity: u8) -> String {
    let level = match verbosity {
        0 => config.level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    format!("{level},{NOISY_CRATES}")
}

/// Install the global subscriber. `RUST_LOG`, when set, replaces the
/// computed directive.
///
/// # Errors
/// Returns [`LoggingError`] if the directive is invalid or a subscriber is
/// already installed.
pub fn init_logging(config: &LoggingConfig, verbosity: u8) -> Result<(), LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let directive = filter_directive(config, verbosity);
            EnvFilter::try_new(&directive)
                .map_err(|source| LoggingError::Filter { directive, source })?
        }
    };

    let (text, json) = match config.format {
        LogFormat::Text => (
            Some(
                fmt::layer()
                    .with_target(true)
                    .with_ansi(config.ansi)
                    .with_writer(std::io::stderr),
            ),
            None,
        ),
        LogFormat::Json => (
            None,
            Some(
                fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_writer(std::io::stderr),
            ),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .try_init()?;
    Ok(())
}
