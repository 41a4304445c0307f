//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → ServiceConfig (immutable)
//!     → ServerConfig::normalized() (defaults applied at run time)
//!     → listener plans for the plaintext and TLS listeners
//! ```
//!
//! # Design Decisions
//! - Config is immutable once handed to the server
//! - All fields have defaults to allow minimal configs
//! - Zero means "default"; nothing is rejected

pub mod loader;
pub mod schema;

pub use loader::{load_config, ConfigError};
pub use schema::{ObservabilityConfig, ServerConfig, ServiceConfig, Timeouts, TlsProfile};
