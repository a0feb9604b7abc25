//! Shadow Traffic Proxy Library

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod mirror;
pub mod observability;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use mirror::{MirrorDispatcher, MirrorReport, ResponseDiffer};
pub use observability::{DiffSink, TracingSink};
