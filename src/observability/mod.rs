//! Observability subsystem.
//!
//! Structured logging only: every subsystem emits `tracing` events and the
//! binary installs one subscriber at startup.

pub mod logging;
