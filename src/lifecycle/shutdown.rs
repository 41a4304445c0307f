//! Shutdown coordination for the listeners.

use std::time::Duration;

use crate::error::ServerError;
use crate::net::listener::ListenerHandle;

/// Drain both listeners concurrently.
///
/// Each listener gets its own `grace` period; a slow TLS drain never delays
/// or skips the plaintext one. The plaintext error wins when both fail.
pub async fn drain_listeners(
    plaintext: Option<&ListenerHandle>,
    tls: Option<&ListenerHandle>,
    grace: Duration,
) -> Result<(), ServerError> {
    let (plaintext, tls) = tokio::join!(drain_optional(plaintext, grace), drain_optional(tls, grace));
    plaintext.and(tls)
}

async fn drain_optional(handle: Option<&ListenerHandle>, grace: Duration) -> Result<(), ServerError> {
    match handle {
        Some(handle) => drain(handle, grace).await,
        None => Ok(()),
    }
}

/// Stop accepting on `handle` and wait up to `grace` for it to stop.
///
/// Connections still open when `grace` runs out are closed and reported as
/// [`ServerError::DrainTimeout`]. A listener that is already draining or
/// stopped is left alone.
pub async fn drain(handle: &ListenerHandle, grace: Duration) -> Result<(), ServerError> {
    if !handle.begin_drain() {
        return Ok(());
    }

    tracing::info!(
        listener = %handle.kind(),
        address = %handle.address(),
        connections = handle.connection_count(),
        grace = ?grace,
        "Draining listener"
    );

    if tokio::time::timeout(grace, handle.stopped()).await.is_ok() {
        tracing::info!(listener = %handle.kind(), "Listener drained");
        return Ok(());
    }

    let open = handle.connection_count();
    handle.force_close();
    if open > 0 {
        tracing::warn!(listener = %handle.kind(), connections = open, "Grace period elapsed, closing open connections");
        return Err(ServerError::DrainTimeout {
            listener: handle.kind(),
            grace,
        });
    }

    tracing::info!(listener = %handle.kind(), "Listener drained");
    Ok(())
}
