//! Logging initialisation for the updater and installer processes
//!
//! Both processes log through `tracing`. This crate turns the
//! [`LoggingConfig`] domain of the process configuration into a global
//! subscriber.

pub mod init;

pub use autoupdate_config::{LogFormat, LogLevel, LoggingConfig};
pub use init::{build_env_filter, init_logging_from_config, init_simple_tracing};
