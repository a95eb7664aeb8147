//! Bounded graceful shutdown of the HTTP listener.
//!
//! Stopping is a race between the listener draining its in-flight requests and the
//! shutdown deadline. Whichever finishes first decides the outcome; the call never
//! blocks past the deadline.

use std::io;
use std::time::Duration;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::{timeout_at, Instant};

use crate::error::{ListenerError, ShutdownError};
use crate::listener::Listener;

/// Upper bound used when `start + grace_period` cannot be represented.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// The instant by which draining must finish when shutdown begins at `start`.
///
/// Saturates instead of overflowing, so an absurdly large grace period just means
/// "wait as long as it takes".
pub fn shutdown_deadline(start: Instant, grace_period: Duration) -> Instant {
    start
        .checked_add(grace_period)
        .unwrap_or_else(|| start + FAR_FUTURE)
}

/// Stops `listener` and waits for in-flight requests until `deadline`.
///
/// The listener stops accepting new connections as soon as this is called, even if
/// the deadline is far away. Taking the listener by value means nothing else can act
/// on it once shutdown has begun.
///
/// Returns `Ok(())` if every connection drained in time. If the deadline elapses first
/// the listener task is aborted and [`ShutdownError::Timeout`] is returned; requests
/// that were still running are not guaranteed to complete.
pub async fn graceful_stop(deadline: Instant, listener: Listener) -> Result<(), ShutdownError> {
    let local_addr = listener.local_addr();
    let (stop, mut task, mut exit_reports) = listener.into_parts();
    let started = Instant::now();

    stop.cancel();
    tracing::info!(
        "Stopped accepting connections on {}, draining in-flight requests",
        local_addr
    );

    match timeout_at(deadline, &mut task).await {
        Ok(Ok(())) => match exit_reports.try_recv() {
            Ok(ListenerError::Closed) => Ok(()),
            Ok(ListenerError::Fatal(e)) => Err(ShutdownError::Transport(e)),
            // The owner already consumed the report that started this shutdown.
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => Ok(()),
        },
        Ok(Err(join_error)) => Err(ShutdownError::Transport(io::Error::other(join_error))),
        Err(_elapsed) => {
            task.abort();
            Err(ShutdownError::Timeout {
                waited: started.elapsed(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::ServiceStopping;
    use axum::{routing::get, Router};
    use std::sync::Arc;
    use tokio::net::TcpListener;
    use tokio::sync::Notify;

    /// Spawns a listener whose `/slow` route takes `delay` and notifies on entry.
    async fn spawn_slow_listener(delay: Duration) -> (Listener, Arc<Notify>) {
        let entered = Arc::new(Notify::new());
        let notify = entered.clone();
        let router = Router::new().route(
            "/slow",
            get(move || {
                let notify = notify.clone();
                async move {
                    notify.notify_one();
                    tokio::time::sleep(delay).await;
                    "done"
                }
            }),
        );

        let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let listener = Listener::spawn(tcp, router, ServiceStopping::detached()).unwrap();
        (listener, entered)
    }

    #[tokio::test]
    async fn test_graceful_stop_idle_listener() {
        let (listener, _) = spawn_slow_listener(Duration::from_millis(0)).await;

        let deadline = Instant::now() + Duration::from_secs(5);
        let result = graceful_stop(deadline, listener).await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_graceful_stop_waits_for_in_flight_request() {
        let (listener, entered) = spawn_slow_listener(Duration::from_millis(300)).await;
        let url = format!("http://{}/slow", listener.local_addr());

        let request = tokio::spawn(async move {
            reqwest::get(&url).await.unwrap().text().await.unwrap()
        });
        entered.notified().await;

        let deadline = Instant::now() + Duration::from_secs(5);
        let result = graceful_stop(deadline, listener).await;

        assert!(result.is_ok());
        assert_eq!(request.await.unwrap(), "done");
    }

    #[tokio::test]
    async fn test_graceful_stop_times_out_at_deadline() {
        let (listener, entered) = spawn_slow_listener(Duration::from_secs(30)).await;
        let url = format!("http://{}/slow", listener.local_addr());

        let _request = tokio::spawn(async move { reqwest::get(&url).await });
        entered.notified().await;

        let started = Instant::now();
        let deadline = started + Duration::from_millis(200);
        let result = graceful_stop(deadline, listener).await;

        assert!(matches!(result, Err(ShutdownError::Timeout { .. })));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_secs(2), "returned too late: {:?}", elapsed);
    }

    #[test]
    fn test_shutdown_deadline_adds_grace_period() {
        let start = Instant::now();
        let deadline = shutdown_deadline(start, Duration::from_secs(10));
        assert_eq!(deadline - start, Duration::from_secs(10));
    }

    #[test]
    fn test_shutdown_deadline_saturates_on_huge_grace_period() {
        let start = Instant::now();

        let deadline = shutdown_deadline(start, Duration::from_secs(u64::MAX));

        assert!(deadline > start + Duration::from_secs(86400 * 365));
    }

    #[tokio::test]
    async fn test_graceful_stop_refuses_connections_while_draining() {
        let (listener, entered) = spawn_slow_listener(Duration::from_millis(800)).await;
        let addr = listener.local_addr();
        let url = format!("http://{}/slow", addr);

        let request = tokio::spawn(async move {
            reqwest::get(&url).await.unwrap().text().await.unwrap()
        });
        entered.notified().await;

        let deadline = Instant::now() + Duration::from_secs(5);
        let stopping = tokio::spawn(graceful_stop(deadline, listener));
        tokio::time::sleep(Duration::from_millis(150)).await;

        // The slow request is still draining, yet the socket is already closed.
        assert!(!stopping.is_finished());
        assert!(tokio::net::TcpStream::connect(addr).await.is_err());

        assert!(stopping.await.unwrap().is_ok());
        assert_eq!(request.await.unwrap(), "done");
    }

    #[tokio::test]
    async fn test_graceful_stop_refuses_new_connections() {
        let (listener, _) = spawn_slow_listener(Duration::from_millis(0)).await;
        let addr = listener.local_addr();

        let deadline = Instant::now() + Duration::from_secs(5);
        graceful_stop(deadline, listener).await.unwrap();

        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }
}
