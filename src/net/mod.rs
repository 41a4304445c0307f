//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! listener.rs (bind, accept loop, phase tracking)
//!     → connection.rs (idle timeout on the raw stream)
//!     → tls.rs (optional TLS handshake, hardened rustls config)
//!     → Hand off to the HTTP pipeline
//!
//! Listener phases:
//!     Unstarted → Listening → Draining → Stopped
//! ```

pub mod connection;
pub mod listener;
pub mod tls;

pub use listener::{ListenerHandle, ListenerKind, ListenerPhase, ListenerSpec};
