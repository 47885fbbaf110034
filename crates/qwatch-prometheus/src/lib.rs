//! Prometheus metrics for qwatch task supervision.
//!
//! [`PrometheusObserver`] implements [`qwatch_core::TaskObserver`]; attach it to a supervisor or a
//! session store and expose [`PrometheusObserver::gather`] on a `/metrics` endpoint.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use qwatch_core::{SessionStore, SupervisorConfig};
//! use qwatch_prometheus::PrometheusObserver;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let metrics = Arc::new(PrometheusObserver::new()?);
//! let store = SessionStore::builder(SupervisorConfig::default())
//!     .with_observer(metrics.clone())
//!     .build();
//! # let _ = store;
//!
//! let body = metrics.encode()?;
//! # let _ = body;
//! # Ok(())
//! # }
//! ```
//!
//! ## Metrics
//! - `qwatch_tasks_started_total` - Counter
//! - `qwatch_tasks_finished_total{outcome}` - Counter
//! - `qwatch_task_failures_total{kind}` - Counter
//! - `qwatch_tasks_active` - Gauge
//! - `qwatch_task_duration_seconds{outcome}` - Histogram
//!
//! ## HTTP Server
//! This crate does NOT provide an HTTP server; mount [`PrometheusObserver::encode`] in your own
//! router (the query-server demo does this with axum).

mod observer;
pub use observer::PrometheusObserver;

pub use prometheus::{Encoder, Registry, TextEncoder};
