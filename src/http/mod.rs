//! HTTP subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted connection (net)
//!     → pipeline.rs (caller's Router or the built-in probe routes)
//!     → readiness.rs (GET /readiness answered from the gate)
//!     → access_log.rs (optional per-request DEBUG line)
//!     → Response
//!
//! Redirect mode: plaintext listener serves redirect.rs instead
//! ```
//!
//! server.rs owns the lifecycle: `run` starts both listeners and `shutdown`
//! drains them.

pub mod access_log;
pub mod pipeline;
pub mod readiness;
pub mod redirect;
pub mod server;

pub use access_log::access_log;
pub use pipeline::{default_pipeline, READINESS_PATH};
pub use readiness::{ReadinessGate, ReadinessLayer};
pub use redirect::redirect_pipeline;
pub use server::Server;
