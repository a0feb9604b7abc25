//! Traffic shadowing subsystem.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → capture.rs (read body once, bounded)
//!     → dispatcher.rs (two fresh copies, forwarded in parallel)
//!         → transport.rs (primary backend)    → capture.rs → caller
//!         → transport.rs (shadow backend)     → capture.rs ┐
//!     → response_diff.rs (status, protocol, headers)       │ background task
//!         → body_diff.rs (JSON / XML / bytes)              │
//!             → map_diff.rs (added / missing / changed)    ┘
//!     → observability sink
//! ```
//!
//! # Design Decisions
//! - Only the primary response is ever written back to the caller
//! - Shadow failures are absorbed into the diff report
//! - Bodies are buffered whole, bounded by `max_body_bytes`

pub mod body_diff;
pub mod capture;
pub mod dispatcher;
pub mod map_diff;
pub mod response_diff;
pub mod transport;

use serde::Serialize;

pub use body_diff::{BodyDiffDetail, BodyDiffFailure, BodyDiffResult, BodyDiffer};
pub use capture::{Capture, CaptureError, CapturedRequest, CapturedResponse};
pub use dispatcher::{BackendSample, MirrorDispatcher, MirrorOutcome, MirrorReport, MirrorSettings};
pub use map_diff::{diff_maps, DiffValue, MapDiffResult, MapEntry, Mapping};
pub use response_diff::{DiffOptions, ResponseDiffResult, ResponseDiffer, ValueDiff};
pub use transport::{HttpTransport, Transport, TransportError};

/// Which backend a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// The serving backend whose response reaches the caller.
    Main,
    /// The candidate backend receiving mirrored traffic.
    Shadow,
}

impl Side {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Main => "main",
            Side::Shadow => "shadow",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
