//! Startup orchestration.
//!
//! # Responsibilities
//! - Turn a normalized `ServerConfig` and a pipeline into listener specs
//! - Swap the plaintext pipeline for the redirect handler when asked to
//! - Run the HTTPS listener on a background task
//!
//! # Design Decisions
//! - Fail fast: missing TLS material is checked before anything is spawned
//! - The HTTPS listener's own failures are logged, never returned; callers
//!   that depend on HTTPS must probe it themselves

use std::path::PathBuf;

use axum::Router;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::http::redirect::redirect_pipeline;
use crate::net::listener::{ListenerHandle, ListenerKind, ListenerSpec};
use crate::net::tls::load_tls_config;

/// The listeners a `run` call will start.
#[derive(Debug, Clone)]
pub struct ListenerPlan {
    pub plaintext: ListenerSpec,
    pub tls: Option<TlsPlan>,
}

/// HTTPS listener spec plus the PEM files it serves.
#[derive(Debug, Clone)]
pub struct TlsPlan {
    pub spec: ListenerSpec,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Build listener specs from a normalized config.
pub fn plan_listeners(config: &ServerConfig, app: Router) -> ListenerPlan {
    let timeouts = config.timeouts();

    let plaintext_app = match &config.tls {
        Some(tls) if tls.redirect => redirect_pipeline(&tls.redirect_url),
        _ => app.clone(),
    };
    let plaintext = ListenerSpec::new(ListenerKind::Plaintext, config.http_address(), timeouts, plaintext_app);

    let tls = config.tls.as_ref().zip(config.https_address()).map(|(profile, address)| TlsPlan {
        spec: ListenerSpec::new(ListenerKind::Tls, address, timeouts, app),
        cert_path: profile.cert_path.clone(),
        key_path: profile.key_path.clone(),
    });

    ListenerPlan { plaintext, tls }
}

/// Start the HTTPS listener in the background.
///
/// The task always leaves `handle` in `Stopped`, whether it served, failed
/// to load the certificate, or failed to bind.
pub fn spawn_tls(plan: TlsPlan, handle: ListenerHandle) {
    tokio::spawn(async move {
        match serve_tls(plan, &handle).await {
            Ok(()) => tracing::info!(address = %handle.address(), "HTTPS server stopped"),
            Err(e) => tracing::warn!(address = %handle.address(), error = %e, "HTTPS server terminated"),
        }
        handle.mark_stopped();
    });
}

async fn serve_tls(plan: TlsPlan, handle: &ListenerHandle) -> Result<(), ServerError> {
    let tls = load_tls_config(&plan.cert_path, &plan.key_path).await?;

    let listener = plan.spec.bind().map_err(|source| ServerError::Bind {
        listener: ListenerKind::Tls,
        address: plan.spec.address.clone(),
        source,
    })?;
    if let Ok(local_addr) = listener.local_addr() {
        handle.mark_listening(local_addr);
        tracing::info!(address = %local_addr, "HTTPS server listening");
    }

    plan.spec
        .serve_tls(listener, tls, handle)
        .await
        .map_err(|source| ServerError::Serve {
            listener: ListenerKind::Tls,
            source,
        })
}
