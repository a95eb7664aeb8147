//! Shared test utilities and helpers for graceline tests.
//!
//! This module provides common functionality used across integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Extension, Router};
use graceline::config::Config;
use graceline::ServiceStopping;
use tokio::sync::Notify;

/// Config bound to a free loopback port with the given grace period.
pub fn test_config(grace_period: Duration) -> Config {
    Config::new("127.0.0.1", 0, grace_period)
}

/// Router with the health route plus test-only routes:
///
/// - `/slow`: notifies `entered`, sleeps `delay`, answers `done`
/// - `/until-stopping`: notifies `entered`, waits for the root lifecycle signal,
///   answers `stopping observed`
pub fn test_router(delay: Duration, entered: Arc<Notify>) -> Router {
    let slow_entered = entered.clone();
    let stopping_entered = entered;

    graceline::health::router()
        .route(
            "/slow",
            get(move || {
                let entered = slow_entered.clone();
                async move {
                    entered.notify_one();
                    tokio::time::sleep(delay).await;
                    "done"
                }
            }),
        )
        .route(
            "/until-stopping",
            get(move |Extension(stopping): Extension<ServiceStopping>| {
                let entered = stopping_entered.clone();
                async move {
                    entered.notify_one();
                    stopping.stopped().await;
                    "stopping observed"
                }
            }),
        )
}
