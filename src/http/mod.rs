//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, catch-all route)
//!     → request.rs (request ID, hop-by-hop header removal)
//!     → mirror dispatcher (fork to primary + shadow)
//!     → response.rs (primary response or mapped error)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{request_id, strip_hop_by_hop, RequestUuid, X_REQUEST_ID};
pub use server::{HttpServer, ServerError};
