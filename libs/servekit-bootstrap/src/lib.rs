#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Process bootstrap for model-serving binaries: layered configuration,
//! logging initialization and shutdown signals.

pub mod config;
pub mod logging;
pub mod signals;

pub use config::{AppConfig, CliArgs, ConfigError, ENV_PREFIX, LogFormat, LoggingConfig};
pub use logging::{LoggingError, filter_directive, init_logging};
pub use signals::{ShutdownSignal, cancel_on_shutdown, wait_for_shutdown};
