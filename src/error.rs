//! Error types for monitor construction and lifecycle.
//!
//! Reading usage never fails; these errors only cover invalid configuration
//! and misuse of the background monitor's lifecycle.

use thiserror::Error;

/// Errors raised while configuring or driving a monitor.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// A refresh interval or threshold that is zero or negative.
    #[error("{name} <= 0")]
    InvalidDuration { name: &'static str },

    /// `start()` or listener registration on a monitor that is already running.
    #[error("monitor is already running")]
    AlreadyStarted,

    /// The monitor was stopped and cannot be restarted.
    #[error("monitor has been stopped")]
    Terminated,

    /// A refresh listener has already been registered.
    #[error("a refresh listener is already registered")]
    ListenerAlreadyRegistered,

    /// The background worker thread could not be created.
    #[error("failed to spawn background refresh worker: {0}")]
    Spawn(#[from] std::io::Error),

    /// Invalid configuration values.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

pub type Result<T> = std::result::Result<T, MonitorError>;
