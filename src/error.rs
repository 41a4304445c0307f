//! Error types surfaced by the server lifecycle.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::net::listener::ListenerKind;
use crate::net::tls::TlsError;

/// Errors returned from [`Server::run`](crate::Server::run) and
/// [`Server::shutdown`](crate::Server::shutdown).
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configured certificate could not be found on disk.
    #[error("ssl certificate file not found: {}", path.display())]
    CertificateNotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The configured private key could not be found on disk.
    #[error("ssl key file not found: {}", path.display())]
    KeyNotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Binding the listener socket failed.
    #[error("start {listener} server on {address}: {source}")]
    Bind {
        listener: ListenerKind,
        address: String,
        #[source]
        source: io::Error,
    },

    /// The accept loop stopped with a transport error.
    #[error("{listener} server terminated: {source}")]
    Serve {
        listener: ListenerKind,
        #[source]
        source: io::Error,
    },

    /// Loading the TLS material failed.
    #[error(transparent)]
    Tls(#[from] TlsError),

    /// In-flight connections were still open when the grace period ran out.
    #[error("{listener} server did not drain within {grace:?}")]
    DrainTimeout {
        listener: ListenerKind,
        grace: Duration,
    },

    /// The server was already shut down and must be rebuilt.
    #[error("server has been shut down")]
    Stopped,
}

impl ServerError {
    /// Whether the error means the address (or the controller) is already taken.
    pub fn is_addr_in_use(&self) -> bool {
        matches!(
            self,
            ServerError::Bind { source, .. } if source.kind() == io::ErrorKind::AddrInUse
        )
    }
}
