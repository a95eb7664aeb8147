//! The HTTP listener task.
//!
//! The listener serves a router on its own tokio task until it is told to stop. When
//! serving ends, for whatever reason, the task writes exactly one [`ListenerError`] to
//! its exit-report inbox.

use std::io;
use std::net::SocketAddr;

use axum::{Extension, Router};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::ListenerError;
use crate::lifecycle::ServiceStopping;

/// A running HTTP listener.
pub struct Listener {
    local_addr: SocketAddr,
    stop: CancellationToken,
    task: JoinHandle<()>,
    exit_reports: mpsc::Receiver<ListenerError>,
}

impl Listener {
    /// Starts serving `router` on `tcp` in a spawned task.
    ///
    /// Every request sees `stopping` as an [`Extension`], so handlers can observe the
    /// root lifecycle signal.
    pub fn spawn(
        tcp: TcpListener,
        router: Router,
        stopping: ServiceStopping,
    ) -> io::Result<Self> {
        let local_addr = tcp.local_addr()?;
        let stop = CancellationToken::new();
        let (report_tx, exit_reports) = mpsc::channel(1);

        let app = router.layer(Extension(stopping));
        let stop_instruction = stop.clone();

        let task = tokio::spawn(async move {
            tracing::info!("HTTP server started on {}", local_addr);

            let stop_signal = stop_instruction.clone();
            let result = axum::serve(tcp, app)
                .with_graceful_shutdown(async move { stop_signal.cancelled().await })
                .await;

            let exit = match result {
                Ok(()) if stop_instruction.is_cancelled() => ListenerError::Closed,
                Ok(()) => ListenerError::Fatal(io::Error::other(
                    "server returned without a stop instruction",
                )),
                Err(e) => ListenerError::Fatal(e),
            };

            // Sole writer on a fresh channel of capacity one, so this cannot be full.
            if report_tx.try_send(exit).is_err() {
                tracing::debug!("Listener exit report dropped, nobody is observing");
            }
        });

        Ok(Self {
            local_addr,
            stop,
            task,
            exit_reports,
        })
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Inbox carrying the listener's single exit report.
    pub(crate) fn exit_reports(&mut self) -> &mut mpsc::Receiver<ListenerError> {
        &mut self.exit_reports
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        CancellationToken,
        JoinHandle<()>,
        mpsc::Receiver<ListenerError>,
    ) {
        (self.stop, self.task, self.exit_reports)
    }

    /// Swaps in a fresh exit-report inbox and returns its sender, so a test can speak
    /// for the listener task.
    #[cfg(test)]
    pub(crate) fn take_over_exit_reports(&mut self) -> mpsc::Sender<ListenerError> {
        let (report_tx, exit_reports) = mpsc::channel(1);
        self.exit_reports = exit_reports;
        report_tx
    }
}
