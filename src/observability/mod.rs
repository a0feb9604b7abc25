//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Mirror dispatcher produces:
//!     → sink.rs (per-backend samples, response-diff reports)
//!         → logging.rs (structured log events)
//!         → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows through every event
//! - Sink calls are infallible; nothing here can fail a request

pub mod logging;
pub mod metrics;
pub mod sink;

pub use sink::{DiffSink, TracingSink};
