//! REST server lifecycle library.
//!
//! Runs an HTTP pipeline over a plaintext listener and, optionally, a TLS
//! listener (or redirects plaintext traffic to HTTPS), with a readiness gate
//! for load-balancer probes and a bounded graceful shutdown.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::{ServerConfig, ServiceConfig, TlsProfile};
pub use error::ServerError;
pub use http::{default_pipeline, ReadinessGate, Server};
pub use net::ListenerKind;
