//! Termination signal handling.
//!
//! OS signals are translated into a buffered in-process inbox right here, so the rest of
//! the service only deals with an ordinary channel receiver.

use std::fmt;
use std::io;

use tokio::sync::mpsc;

/// A termination request from the operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationSignal {
    /// SIGINT (Ctrl+C)
    Interrupt,
    /// SIGTERM (common in containerized environments)
    Terminate,
}

impl fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationSignal::Interrupt => f.write_str("SIGINT"),
            TerminationSignal::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Creates the termination notification inbox.
///
/// Capacity is one: a single pending notification is enough to trigger shutdown, and
/// it is kept until someone receives it.
pub fn notification_channel() -> (
    mpsc::Sender<TerminationSignal>,
    mpsc::Receiver<TerminationSignal>,
) {
    mpsc::channel(1)
}

/// Registers handlers for SIGINT and SIGTERM and returns the notification inbox.
///
/// Handlers are installed before this function returns, so a signal that arrives
/// before anyone is receiving is still buffered. Must be called from within a tokio
/// runtime.
///
/// # Example
///
/// ```ignore
/// use graceline::signal::register_termination_signals;
///
/// let mut notifications = register_termination_signals()?;
/// let signal = notifications.recv().await;
/// ```
pub fn register_termination_signals() -> io::Result<mpsc::Receiver<TerminationSignal>> {
    let (tx, rx) = notification_channel();
    spawn_translation(tx)?;
    Ok(rx)
}

#[cfg(unix)]
fn spawn_translation(tx: mpsc::Sender<TerminationSignal>) -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                Some(()) = interrupt.recv() => TerminationSignal::Interrupt,
                Some(()) = terminate.recv() => TerminationSignal::Terminate,
                else => break,
            };

            if !forward(&tx, received) {
                break;
            }
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn spawn_translation(tx: mpsc::Sender<TerminationSignal>) -> io::Result<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                forward(&tx, TerminationSignal::Interrupt);
            }
            Err(e) => {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
            }
        }
    });

    Ok(())
}

/// Pushes a signal into the inbox. Returns false once nobody can receive any more.
fn forward(tx: &mpsc::Sender<TerminationSignal>, received: TerminationSignal) -> bool {
    match tx.try_send(received) {
        Ok(()) => {
            tracing::debug!("Received {}, queued termination notification", received);
            true
        }
        Err(mpsc::error::TrySendError::Full(_)) => {
            tracing::debug!(
                "Received {}, a termination notification is already pending",
                received
            );
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}
