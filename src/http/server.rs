//! REST server lifecycle controller.
//!
//! # Responsibilities
//! - Normalize configuration and verify TLS material before anything starts
//! - Start the HTTPS listener in the background and the plaintext listener
//!   in the foreground, both serving the same pipeline
//! - Drain both listeners with a bounded grace period on shutdown
//!
//! # Usage
//! `run` blocks until the plaintext listener stops, so `shutdown` is
//! normally called from another task:
//!
//! ```ignore
//! let server = Arc::new(Server::new(config));
//! let stopper = Arc::clone(&server);
//! tokio::spawn(async move {
//!     let _ = signals::termination().await;
//!     let _ = stopper.shutdown().await;
//! });
//! server.run(None).await?;
//! ```

use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::Router;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::http::pipeline::default_pipeline;
use crate::http::readiness::ReadinessGate;
use crate::lifecycle::shutdown::drain_listeners;
use crate::lifecycle::startup::{plan_listeners, spawn_tls};
use crate::net::listener::{ListenerHandle, ListenerKind};
use crate::net::tls::verify_material;

/// Controller state. Moves `Idle → Running → Stopped` and never back.
#[derive(Debug)]
enum State {
    Idle,
    Running(ListenerSet),
    Stopped,
}

/// Handles of the listeners started by one `run`.
#[derive(Debug, Clone)]
struct ListenerSet {
    plaintext: ListenerHandle,
    tls: Option<ListenerHandle>,
}

/// HTTP/HTTPS server with graceful shutdown and a readiness gate.
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    readiness: ReadinessGate,
    state: Mutex<State>,
}

impl Server {
    /// Create a server whose readiness gate starts out ready.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_readiness(config, ReadinessGate::new(true))
    }

    /// Create a server sharing a caller-owned readiness gate.
    pub fn with_readiness(config: ServerConfig, readiness: ReadinessGate) -> Self {
        Self {
            config,
            readiness,
            state: Mutex::new(State::Idle),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn readiness(&self) -> &ReadinessGate {
        &self.readiness
    }

    /// Bound address of a listener, once it is accepting connections.
    pub fn local_addr(&self, kind: ListenerKind) -> Option<SocketAddr> {
        match &*self.lock_state() {
            State::Running(set) => set.get(kind).and_then(ListenerHandle::local_addr),
            _ => None,
        }
    }

    /// Run the server until it is shut down.
    ///
    /// With no pipeline, the built-in one serving `/ping`, `/liveness` and
    /// `/readiness` is used. Returns `Ok(())` after a clean shutdown.
    ///
    /// Failures of the background HTTPS listener (unreadable certificate,
    /// bind error) are logged and do not affect the result.
    pub async fn run(&self, pipeline: Option<Router>) -> Result<(), ServerError> {
        let config = self.config.normalized();

        if let Some(tls) = &config.tls {
            verify_material(tls)?;
        }

        let app = pipeline.unwrap_or_else(|| default_pipeline(self.readiness.clone()));
        let plan = plan_listeners(&config, app);

        let (handle, listener) = {
            let mut state = self.lock_state();
            match &*state {
                State::Idle => {}
                State::Running(_) => {
                    return Err(ServerError::Bind {
                        listener: ListenerKind::Plaintext,
                        address: plan.plaintext.address.clone(),
                        source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "server is already running"),
                    });
                }
                State::Stopped => return Err(ServerError::Stopped),
            }

            let tls = plan.tls.clone().map(|tls_plan| {
                tracing::info!(address = %tls_plan.spec.address, "Starting HTTPS server");
                let handle = ListenerHandle::new(ListenerKind::Tls, tls_plan.spec.address.clone());
                spawn_tls(tls_plan, handle.clone());
                handle
            });

            let handle = ListenerHandle::new(ListenerKind::Plaintext, plan.plaintext.address.clone());
            let listener = match plan.plaintext.bind() {
                Ok(listener) => listener,
                Err(source) => {
                    if let Some(tls) = &tls {
                        tls.begin_drain();
                        tls.force_close();
                    }
                    *state = State::Stopped;
                    return Err(ServerError::Bind {
                        listener: ListenerKind::Plaintext,
                        address: plan.plaintext.address.clone(),
                        source,
                    });
                }
            };
            if let Ok(local_addr) = listener.local_addr() {
                handle.mark_listening(local_addr);
            }

            *state = State::Running(ListenerSet {
                plaintext: handle.clone(),
                tls,
            });
            (handle, listener)
        };

        let redirecting = config.tls.as_ref().is_some_and(|tls| tls.redirect);
        tracing::info!(
            address = %plan.plaintext.address,
            redirect = redirecting,
            "HTTP server listening"
        );

        let result = plan.plaintext.serve(listener, &handle).await;
        handle.mark_stopped();

        match result {
            Ok(()) => {
                tracing::info!("HTTP server stopped");
                Ok(())
            }
            Err(source) => Err(ServerError::Serve {
                listener: ListenerKind::Plaintext,
                source,
            }),
        }
    }

    /// Shut down with the configured grace period (10s by default).
    pub async fn shutdown(&self) -> Result<(), ServerError> {
        let grace = self.config.normalized().shutdown_grace;
        self.shutdown_with_timeout(grace).await
    }

    /// Stop accepting connections and give in-flight requests up to `grace`
    /// to finish on each listener.
    ///
    /// A no-op if the server never ran or was already shut down.
    pub async fn shutdown_with_timeout(&self, grace: Duration) -> Result<(), ServerError> {
        let set = {
            let mut state = self.lock_state();
            match std::mem::replace(&mut *state, State::Stopped) {
                State::Running(set) => set,
                previous @ State::Idle => {
                    *state = previous;
                    return Ok(());
                }
                State::Stopped => return Ok(()),
            }
        };

        tracing::info!(grace = ?grace, "Shutting down server");
        drain_listeners(Some(&set.plaintext), set.tls.as_ref(), grace).await
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ListenerSet {
    fn get(&self, kind: ListenerKind) -> Option<&ListenerHandle> {
        match kind {
            ListenerKind::Plaintext => Some(&self.plaintext),
            ListenerKind::Tls => self.tls.as_ref(),
        }
    }
}
