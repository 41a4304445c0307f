//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.
//! Zero values mean "use the default"; [`ServerConfig::normalized`] applies
//! the defaults right before the listeners are built.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default plaintext port.
pub const DEFAULT_PORT: u16 = 8080;
/// Default time allowed to read request headers.
pub const DEFAULT_READ_HEADER_TIMEOUT: Duration = Duration::from_secs(10);
/// Default time allowed to produce a response.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);
/// Default time an idle keep-alive connection is held open.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
/// Default grace period granted to in-flight requests at shutdown.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

const ALL_INTERFACES: &str = "0.0.0.0";

/// Root configuration file layout.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener and lifecycle settings.
    pub server: ServerConfig,

    /// Logging settings.
    pub observability: ObservabilityConfig,
}

/// Listener and lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address. Empty or `*` binds all interfaces.
    pub address: String,

    /// Plaintext port (0 selects 8080).
    pub port: u16,

    /// Time allowed for a client to send the request headers.
    #[serde(rename = "read_header_timeout_secs", with = "secs")]
    pub read_header_timeout: Duration,

    /// Time allowed for the pipeline to produce a response.
    #[serde(rename = "write_timeout_secs", with = "secs")]
    pub write_timeout: Duration,

    /// Time a connection may sit without traffic before it is closed.
    #[serde(rename = "idle_timeout_secs", with = "secs")]
    pub idle_timeout: Duration,

    /// Grace period used by `Server::shutdown`.
    #[serde(rename = "shutdown_grace_secs", with = "secs")]
    pub shutdown_grace: Duration,

    /// Optional HTTPS listener.
    pub tls: Option<TlsProfile>,
}

/// HTTPS listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct TlsProfile {
    /// Path to certificate chain (PEM).
    pub cert_path: PathBuf,

    /// Path to private key (PEM).
    pub key_path: PathBuf,

    /// HTTPS port (0 selects the plaintext port + 1).
    pub port: u16,

    /// Answer every plaintext request with a redirect to `redirect_url`.
    pub redirect: bool,

    /// Base URL that plaintext requests are redirected to.
    pub redirect_url: String,
}

/// Per-connection timeouts shared by both listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub read_header: Duration,
    pub write: Duration,
    pub idle: Duration,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON lines instead of the human readable format.
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}

impl ServerConfig {
    /// Returns a copy with every zero or empty field replaced by its default.
    pub fn normalized(&self) -> ServerConfig {
        let mut config = self.clone();

        if config.address.is_empty() || config.address == "*" {
            config.address = ALL_INTERFACES.to_string();
        }
        if config.port == 0 {
            config.port = DEFAULT_PORT;
        }
        config.read_header_timeout = or_default(config.read_header_timeout, DEFAULT_READ_HEADER_TIMEOUT);
        config.write_timeout = or_default(config.write_timeout, DEFAULT_WRITE_TIMEOUT);
        config.idle_timeout = or_default(config.idle_timeout, DEFAULT_IDLE_TIMEOUT);
        config.shutdown_grace = or_default(config.shutdown_grace, DEFAULT_SHUTDOWN_GRACE);

        if let Some(tls) = config.tls.as_mut() {
            if tls.port == 0 {
                tls.port = config.port.saturating_add(1);
            }
        }

        config
    }

    /// The timeouts applied to every accepted connection.
    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            read_header: self.read_header_timeout,
            write: self.write_timeout,
            idle: self.idle_timeout,
        }
    }

    /// `address:port` of the plaintext listener.
    pub fn http_address(&self) -> String {
        join_host_port(&self.address, self.port)
    }

    /// `address:port` of the HTTPS listener, when one is configured.
    pub fn https_address(&self) -> Option<String> {
        self.tls
            .as_ref()
            .map(|tls| join_host_port(&self.address, tls.port))
    }
}

fn or_default(value: Duration, default: Duration) -> Duration {
    if value.is_zero() {
        default
    } else {
        value
    }
}

fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
