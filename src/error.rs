//! Error types for the service lifecycle.
//!
//! Listener and shutdown errors are terminal to the lifecycle but never fatal to the
//! owner: they are logged and handed back in the [`ShutdownReport`](crate::lifecycle::ShutdownReport).

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Why the listener task stopped serving.
///
/// The listener always reports exactly one of these when `axum::serve` returns.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The listener stopped because a stop instruction had already been issued.
    #[error("listener closed after a stop instruction")]
    Closed,

    /// The listener stopped for any other reason.
    #[error("listener stopped unexpectedly: {0}")]
    Fatal(#[source] io::Error),
}

impl ListenerError {
    /// Returns true if this exit was caused by shutdown itself and is not a failure.
    pub fn is_expected(&self) -> bool {
        matches!(self, ListenerError::Closed)
    }

    pub(crate) fn vanished() -> Self {
        ListenerError::Fatal(io::Error::other(
            "listener task ended without reporting its exit",
        ))
    }
}

/// Errors returned by [`graceful_stop`](crate::shutdown::graceful_stop).
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// In-flight requests were still running when the deadline elapsed.
    #[error("graceful shutdown timed out after {waited:?} with requests still in flight")]
    Timeout { waited: Duration },

    /// The listener failed to stop cleanly for a reason other than the deadline.
    #[error("listener failed to stop cleanly: {0}")]
    Transport(#[source] io::Error),
}

/// Errors that prevent the service from reaching the running state.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error("failed to register termination signal handlers: {0}")]
    Signals(#[source] io::Error),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
}

impl StartupError {
    /// Process exit code when the service never reached the running state.
    ///
    /// Distinct from every [`ShutdownReport`](crate::lifecycle::ShutdownReport) code.
    pub fn exit_code(&self) -> u8 {
        4
    }
}
