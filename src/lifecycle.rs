//! Service lifecycle ownership.
//!
//! [`Lifecycle`] owns the root cancellation token and is the only thing that decides
//! the service should stop. It starts the listener, then waits for whichever comes
//! first: a termination notification or the listener's exit report. The winner
//! cancels the root token once and hands the listener to
//! [`graceful_stop`](crate::shutdown::graceful_stop) with a fresh deadline.
//!
//! ```text
//! Starting ──listener spawned──▶ Running ──first trigger──▶ ShuttingDown ──drain done──▶ Stopped
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{ListenerError, ShutdownError, StartupError};
use crate::listener::Listener;
use crate::shutdown::{graceful_stop, shutdown_deadline};
use crate::signal::{register_termination_signals, TerminationSignal};

/// Read-only view of the root lifecycle signal.
///
/// Handed to request handlers as an axum `Extension`. It can observe that the service
/// is stopping but cannot cause it.
#[derive(Debug, Clone)]
pub struct ServiceStopping(CancellationToken);

impl ServiceStopping {
    /// An observer that is not attached to any lifecycle and never fires.
    pub fn detached() -> Self {
        Self(CancellationToken::new())
    }

    pub fn is_stopping(&self) -> bool {
        self.0.is_cancelled()
    }

    /// Completes once the service has begun stopping.
    pub async fn stopped(&self) {
        self.0.cancelled().await
    }
}

/// Where the service is in its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    Running,
    ShuttingDown,
    Stopped,
}

/// The event that won the shutdown race.
#[derive(Debug)]
pub enum ShutdownTrigger {
    Signal(TerminationSignal),
    Listener(ListenerError),
}

impl fmt::Display for ShutdownTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownTrigger::Signal(signal) => write!(f, "received {}", signal),
            ShutdownTrigger::Listener(e) => write!(f, "{}", e),
        }
    }
}

/// What happened during shutdown.
#[derive(Debug)]
pub struct ShutdownReport {
    pub trigger: ShutdownTrigger,
    pub outcome: Result<(), ShutdownError>,
}

impl ShutdownReport {
    /// Process exit code for this shutdown.
    ///
    /// - `0`: stopped cleanly
    /// - `1`: the listener failed unexpectedly, but draining succeeded
    /// - `2`: draining timed out
    /// - `3`: the listener failed to stop cleanly
    ///
    /// Startup failures use their own code, see
    /// [`StartupError::exit_code`](crate::error::StartupError::exit_code).
    pub fn exit_code(&self) -> u8 {
        match (&self.trigger, &self.outcome) {
            (_, Err(ShutdownError::Transport(_))) => 3,
            (_, Err(ShutdownError::Timeout { .. })) => 2,
            (ShutdownTrigger::Listener(e), Ok(())) if !e.is_expected() => 1,
            _ => 0,
        }
    }
}

impl From<&ShutdownReport> for ExitCode {
    fn from(report: &ShutdownReport) -> Self {
        ExitCode::from(report.exit_code())
    }
}

/// Owner of the service lifecycle.
pub struct Lifecycle {
    root: CancellationToken,
    grace_period: Duration,
    notifications: mpsc::Receiver<TerminationSignal>,
    listener: Listener,
    state: watch::Sender<LifecycleState>,
}

impl Lifecycle {
    /// Registers SIGINT/SIGTERM handlers, binds the configured address and starts
    /// serving `router` in the background.
    pub async fn start(config: &Config, router: Router) -> Result<Self, StartupError> {
        let notifications = register_termination_signals().map_err(StartupError::Signals)?;
        Self::start_with(config, router, notifications).await
    }

    /// Like [`Lifecycle::start`], but termination notifications come from
    /// `notifications` instead of OS signal handlers.
    pub async fn start_with(
        config: &Config,
        router: Router,
        notifications: mpsc::Receiver<TerminationSignal>,
    ) -> Result<Self, StartupError> {
        let (state, _) = watch::channel(LifecycleState::Starting);
        let root = CancellationToken::new();

        let addr = config.bind_addr();
        let tcp = TcpListener::bind(&addr)
            .await
            .map_err(|source| StartupError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let listener = Listener::spawn(tcp, router, ServiceStopping(root.child_token()))
            .map_err(|source| StartupError::Bind { addr, source })?;

        state.send_replace(LifecycleState::Running);

        Ok(Self {
            root,
            grace_period: config.grace_period,
            notifications,
            listener,
            state,
        })
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    /// An observer of the root lifecycle signal.
    pub fn stopping(&self) -> ServiceStopping {
        ServiceStopping(self.root.child_token())
    }

    pub fn subscribe_state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Waits for the first shutdown trigger, then shuts the service down.
    ///
    /// Never fails: errors from the listener or from draining are logged and returned
    /// in the report.
    pub async fn run(mut self) -> ShutdownReport {
        let trigger =
            wait_for_trigger(&mut self.notifications, self.listener.exit_reports()).await;
        self.state.send_replace(LifecycleState::ShuttingDown);

        match &trigger {
            ShutdownTrigger::Signal(signal) => {
                tracing::info!("Received {}, shutting down", signal);
            }
            ShutdownTrigger::Listener(e) if e.is_expected() => {
                tracing::info!("Listener closed, shutting down");
            }
            ShutdownTrigger::Listener(e) => {
                tracing::error!("Server error: {}, shutting down", e);
            }
        }

        self.root.cancel();

        let deadline = shutdown_deadline(Instant::now(), self.grace_period);
        let outcome = graceful_stop(deadline, self.listener).await;

        match &outcome {
            Ok(()) => tracing::info!("Server shutdown gracefully"),
            Err(e @ ShutdownError::Timeout { .. }) => tracing::warn!("{}", e),
            Err(e) => tracing::error!("Error during server shutdown: {}", e),
        }

        self.state.send_replace(LifecycleState::Stopped);

        ShutdownReport { trigger, outcome }
    }
}

/// Waits until a termination notification or a listener exit report arrives.
///
/// First result wins; whatever the other source delivers later is left unread. A
/// closed notification inbox just disables that branch, while a listener that vanished
/// without reporting counts as a fatal listener exit.
pub(crate) async fn wait_for_trigger(
    notifications: &mut mpsc::Receiver<TerminationSignal>,
    exit_reports: &mut mpsc::Receiver<ListenerError>,
) -> ShutdownTrigger {
    tokio::select! {
        Some(signal) = notifications.recv() => ShutdownTrigger::Signal(signal),
        report = exit_reports.recv() => {
            ShutdownTrigger::Listener(report.unwrap_or_else(ListenerError::vanished))
        }
    }
}
