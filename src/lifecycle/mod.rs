//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Normalize config → Verify TLS material → Plan listeners
//!     → Spawn HTTPS listener → Serve plaintext in the foreground
//!
//! Shutdown (shutdown.rs):
//!     shutdown() → Stop accepting on both listeners → Drain with grace → Report
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → caller invokes shutdown()
//! ```
//!
//! # Design Decisions
//! - Startup failures are terminal; nothing is retried
//! - Each listener drains under its own grace period

pub mod shutdown;
pub mod signals;
pub mod startup;
