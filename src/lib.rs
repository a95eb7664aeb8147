//! graceline - HTTP health-check service with bounded graceful shutdown

pub mod config;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod listener;
pub mod shutdown;
pub mod signal;

pub use lifecycle::{Lifecycle, LifecycleState, ServiceStopping, ShutdownReport, ShutdownTrigger};
