//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → server swaps the reloadable mirror settings atomically
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields except backend URLs have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Backend URLs and listener address are fixed for the process lifetime

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    BackendConfig, ListenerConfig, LogFormat, MirrorConfig, ObservabilityConfig, ProxyConfig,
    TimeoutConfig,
};
pub use watcher::ConfigWatcher;
