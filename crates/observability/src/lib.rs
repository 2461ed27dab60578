//! # funkrelais-observability
//!
//! Observability-Crate fuer Funkrelais:
//! - Prometheus-kompatible Metriken (`/metrics`)
//! - Structured Logging via tracing-subscriber

pub mod logging;
pub mod metrics;

pub use logging::logging_initialisieren;
pub use metrics::{metrics_router, metrics_server_starten, RelayMetriken};
