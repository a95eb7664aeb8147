//! Health-check route
//!
//! `GET /health` answers `200 OK` while the service is accepting requests. Each
//! request carries its own cancellation token; once that fires the handler writes
//! nothing at all.

use std::convert::Infallible;

use axum::{
    extract::{FromRequestParts, Request},
    http::{request::Parts, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio_util::sync::CancellationToken;

/// Per-request cancellation signal.
///
/// Cancelled when the request is abandoned, i.e. when the future serving it is
/// dropped because the client went away.
#[derive(Debug, Clone, Default)]
pub struct RequestCancellation(pub CancellationToken);

impl RequestCancellation {
    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestCancellation {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestCancellation>()
            .cloned()
            .unwrap_or_default())
    }
}

/// Create the health router with its cancellation middleware
pub fn router() -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .layer(middleware::from_fn(track_request_cancellation))
}

/// Gives every request a cancellation token that fires when the request is dropped.
///
/// If the request already carries a [`RequestCancellation`] the new token is its child,
/// so cancellation from further out still reaches the handler.
pub async fn track_request_cancellation(mut request: Request, next: Next) -> Response {
    let token = request
        .extensions()
        .get::<RequestCancellation>()
        .map(|outer| outer.0.child_token())
        .unwrap_or_default();

    request
        .extensions_mut()
        .insert(RequestCancellation(token.clone()));

    let _guard = token.drop_guard();
    next.run(request).await
}

/// Health handler. Never resolves once the request has been cancelled, so no status
/// line or body is ever written for it.
///
/// The token from [`track_request_cancellation`] only fires when the request future is
/// dropped, at which point hyper is already discarding this handler. The pending branch
/// is reached only through an outer token that is cancelled while the connection is
/// still open; such a request holds its connection until the client disconnects or the
/// shutdown deadline aborts the listener. Do not derive request tokens from the root
/// lifecycle signal.
pub async fn health_handler(cancellation: RequestCancellation) -> Response {
    if cancellation.is_cancelled() {
        tracing::debug!("Health request cancelled before responding");
        return std::future::pending().await;
    }

    (StatusCode::OK, "OK").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use std::time::Duration;
    use tokio_test::{assert_pending, task};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_handler_returns_ok() {
        let response = health_handler(RequestCancellation::default()).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"OK");
    }

    #[test]
    fn test_cancelled_health_handler_never_responds() {
        let token = CancellationToken::new();
        token.cancel();

        let mut handler = task::spawn(health_handler(RequestCancellation(token)));

        assert_pending!(handler.poll());
        assert_pending!(handler.poll());
    }

    #[tokio::test]
    async fn test_router_propagates_outer_cancellation() {
        let outer = CancellationToken::new();
        outer.cancel();

        let mut request = axum::http::Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        request.extensions_mut().insert(RequestCancellation(outer));

        let result =
            tokio::time::timeout(Duration::from_millis(50), router().oneshot(request)).await;

        assert!(result.is_err(), "cancelled request must not produce a response");
    }

    #[tokio::test]
    async fn test_router_unknown_path_is_not_found() {
        let request = axum::http::Request::builder()
            .uri("/nope")
            .body(Body::empty())
            .unwrap();

        let response = router().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
