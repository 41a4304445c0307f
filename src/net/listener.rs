//! Listener binding, serving, and per-listener lifecycle state.
//!
//! # Responsibilities
//! - Bind the configured address synchronously so bind failures surface at once
//! - Serve a pipeline over plaintext or TLS with the shared timeouts
//! - Track each listener through `Unstarted → Listening → Draining → Stopped`
//!
//! # Design Decisions
//! - A [`ListenerHandle`] is cheap to clone; all clones observe one state
//! - Phases only move forward; a stopped listener is never restarted

use std::fmt;
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, OnceLock};

use axum::Router;
use axum_server::tls_rustls::{RustlsAcceptor, RustlsConfig};
use axum_server::Handle;
use hyper_util::rt::TokioTimer;
use tokio::sync::watch;
use tower_http::timeout::TimeoutLayer;

use crate::config::Timeouts;
use crate::net::connection::IdleTimeoutAcceptor;

/// Which of the two listeners a handle or error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    Plaintext,
    Tls,
}

impl fmt::Display for ListenerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerKind::Plaintext => write!(f, "http"),
            ListenerKind::Tls => write!(f, "https"),
        }
    }
}

/// Lifecycle state of one listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ListenerPhase {
    /// Created, socket not yet bound.
    Unstarted,
    /// Bound and accepting connections.
    Listening,
    /// No longer accepting; in-flight requests are finishing.
    Draining,
    /// Accept loop has exited.
    Stopped,
}

/// Runtime handle to one listener.
#[derive(Debug, Clone)]
pub struct ListenerHandle {
    kind: ListenerKind,
    address: String,
    server: Handle,
    phase: Arc<watch::Sender<ListenerPhase>>,
    local_addr: Arc<OnceLock<SocketAddr>>,
}

impl ListenerHandle {
    pub fn new(kind: ListenerKind, address: impl Into<String>) -> Self {
        let (phase, _) = watch::channel(ListenerPhase::Unstarted);
        Self {
            kind,
            address: address.into(),
            server: Handle::new(),
            phase: Arc::new(phase),
            local_addr: Arc::new(OnceLock::new()),
        }
    }

    pub fn kind(&self) -> ListenerKind {
        self.kind
    }

    /// Configured `host:port`.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn phase(&self) -> ListenerPhase {
        *self.phase.borrow()
    }

    /// Address the socket is actually bound to, once listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Number of connections currently open on this listener.
    pub fn connection_count(&self) -> usize {
        self.server.connection_count()
    }

    /// `Unstarted → Listening`. Ignored in any other phase.
    pub fn mark_listening(&self, local_addr: SocketAddr) -> bool {
        let _ = self.local_addr.set(local_addr);
        self.advance(ListenerPhase::Unstarted, ListenerPhase::Listening)
    }

    /// Move to `Draining` and ask the transport to stop accepting.
    ///
    /// Open connections finish their current request and are then closed.
    /// Returns `false` if the listener was already draining or stopped.
    pub fn begin_drain(&self) -> bool {
        let started = self.phase.send_if_modified(|phase| {
            if *phase < ListenerPhase::Draining {
                *phase = ListenerPhase::Draining;
                true
            } else {
                false
            }
        });
        if started {
            self.server.graceful_shutdown(None);
        }
        started
    }

    /// Close every open connection now and stop the accept loop.
    pub fn force_close(&self) {
        self.server.shutdown();
    }

    /// Terminal transition; called once the accept loop has returned.
    pub fn mark_stopped(&self) {
        self.phase.send_if_modified(|phase| {
            let changed = *phase != ListenerPhase::Stopped;
            *phase = ListenerPhase::Stopped;
            changed
        });
    }

    /// Resolves once the listener reaches `Stopped`.
    pub async fn stopped(&self) {
        let mut rx = self.phase.subscribe();
        let _ = rx.wait_for(|phase| *phase == ListenerPhase::Stopped).await;
    }

    fn advance(&self, from: ListenerPhase, to: ListenerPhase) -> bool {
        self.phase.send_if_modified(|phase| {
            if *phase == from {
                *phase = to;
                true
            } else {
                false
            }
        })
    }
}

/// Everything needed to start one listener.
#[derive(Debug, Clone)]
pub struct ListenerSpec {
    pub kind: ListenerKind,
    /// `host:port` to bind.
    pub address: String,
    pub timeouts: Timeouts,
    pub app: Router,
}

impl ListenerSpec {
    pub fn new(kind: ListenerKind, address: String, timeouts: Timeouts, app: Router) -> Self {
        Self {
            kind,
            address,
            timeouts,
            app,
        }
    }

    /// Bind the socket for this listener.
    pub fn bind(&self) -> std::io::Result<TcpListener> {
        let listener = TcpListener::bind(self.address.as_str())?;
        listener.set_nonblocking(true)?;
        Ok(listener)
    }

    /// Serve plain HTTP until `handle` is shut down.
    pub async fn serve(self, listener: TcpListener, handle: &ListenerHandle) -> std::io::Result<()> {
        let mut server = axum_server::from_tcp(listener)
            .acceptor(IdleTimeoutAcceptor::new(self.timeouts.idle))
            .handle(handle.server.clone());
        server
            .http_builder()
            .http1()
            .timer(TokioTimer::new())
            .header_read_timeout(self.timeouts.read_header);

        server.serve(self.into_make_service()).await
    }

    /// Serve HTTPS until `handle` is shut down.
    pub async fn serve_tls(
        self,
        listener: TcpListener,
        tls: RustlsConfig,
        handle: &ListenerHandle,
    ) -> std::io::Result<()> {
        // `handshake_timeout` only exists before the inner acceptor is swapped.
        let acceptor = RustlsAcceptor::new(tls)
            .handshake_timeout(self.timeouts.read_header)
            .acceptor(IdleTimeoutAcceptor::new(self.timeouts.idle));
        let mut server = axum_server::from_tcp(listener)
            .acceptor(acceptor)
            .handle(handle.server.clone());
        server
            .http_builder()
            .http1()
            .timer(TokioTimer::new())
            .header_read_timeout(self.timeouts.read_header);

        server.serve(self.into_make_service()).await
    }

    #[allow(deprecated)]
    fn into_make_service(self) -> axum::extract::connect_info::IntoMakeServiceWithConnectInfo<Router, SocketAddr> {
        self.app
            .layer(TimeoutLayer::new(self.timeouts.write))
            .into_make_service_with_connect_info::<SocketAddr>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_render_as_schemes() {
        assert_eq!(ListenerKind::Plaintext.to_string(), "http");
        assert_eq!(ListenerKind::Tls.to_string(), "https");
    }

    #[tokio::test]
    async fn phases_only_move_forward() {
        let handle = ListenerHandle::new(ListenerKind::Plaintext, "127.0.0.1:0");
        assert_eq!(handle.phase(), ListenerPhase::Unstarted);
        assert!(handle.local_addr().is_none());

        let addr: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        assert!(handle.mark_listening(addr));
        assert_eq!(handle.phase(), ListenerPhase::Listening);
        assert_eq!(handle.local_addr(), Some(addr));

        assert!(handle.begin_drain());
        assert!(!handle.begin_drain());
        assert_eq!(handle.phase(), ListenerPhase::Draining);

        assert!(!handle.mark_listening(addr));
        handle.mark_stopped();
        assert_eq!(handle.phase(), ListenerPhase::Stopped);
        assert!(!handle.begin_drain());

        // Already stopped: resolves immediately.
        handle.stopped().await;
    }

    #[tokio::test]
    async fn drain_before_bind_skips_listening() {
        let handle = ListenerHandle::new(ListenerKind::Tls, "127.0.0.1:0");
        assert!(handle.begin_drain());
        assert!(!handle.mark_listening("127.0.0.1:1".parse().unwrap()));
        assert_eq!(handle.phase(), ListenerPhase::Draining);
    }

    #[test]
    fn clones_share_state() {
        let handle = ListenerHandle::new(ListenerKind::Plaintext, "127.0.0.1:0");
        let clone = handle.clone();
        clone.mark_stopped();
        assert_eq!(handle.phase(), ListenerPhase::Stopped);
    }

    #[test]
    fn second_bind_on_same_port_is_addr_in_use() {
        let spec = ListenerSpec::new(
            ListenerKind::Plaintext,
            "127.0.0.1:0".into(),
            crate::config::ServerConfig::default().normalized().timeouts(),
            Router::new(),
        );
        let first = spec.bind().unwrap();
        let taken = first.local_addr().unwrap().to_string();

        let clash = ListenerSpec { address: taken, ..spec };
        let err = clash.bind().unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::AddrInUse);
    }
}
