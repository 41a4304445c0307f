//! TLS configuration and certificate loading.
//!
//! The HTTPS listener negotiates TLS 1.2 or 1.3 only, prefers the server's
//! cipher-suite order, and restricts both suites and key-exchange groups to
//! an explicit allow-list.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use rustls::crypto::{aws_lc_rs, CryptoProvider};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use thiserror::Error;

use crate::config::TlsProfile;
use crate::error::ServerError;

/// Error type for loading TLS material.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no certificates found in {}", .0.display())]
    NoCertificates(PathBuf),
    #[error("no private key found in {}", .0.display())]
    NoPrivateKey(PathBuf),
    #[error("build tls config: {0}")]
    Rustls(#[from] rustls::Error),
}

/// Check that the certificate and key referenced by the profile exist.
///
/// This runs before any listener is started so that a missing file is a
/// startup failure rather than a background one.
pub fn verify_material(profile: &TlsProfile) -> Result<(), ServerError> {
    if let Err(source) = std::fs::metadata(&profile.cert_path) {
        return Err(ServerError::CertificateNotFound {
            path: profile.cert_path.clone(),
            source,
        });
    }
    if let Err(source) = std::fs::metadata(&profile.key_path) {
        return Err(ServerError::KeyNotFound {
            path: profile.key_path.clone(),
            source,
        });
    }
    Ok(())
}

/// Load PEM files into an `axum-server` rustls configuration.
pub async fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<RustlsConfig, TlsError> {
    let cert_pem = read(cert_path).await?;
    let key_pem = read(key_path).await?;

    let certs = rustls_pemfile::certs(&mut cert_pem.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Read {
            path: cert_path.to_path_buf(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(cert_path.to_path_buf()));
    }

    let key = rustls_pemfile::private_key(&mut key_pem.as_slice())
        .map_err(|source| TlsError::Read {
            path: key_path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(key_path.to_path_buf()))?;

    let config = server_config(certs, key)?;
    Ok(RustlsConfig::from_config(Arc::new(config)))
}

/// Build the hardened rustls server configuration.
pub fn server_config(
    certs: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> Result<ServerConfig, TlsError> {
    let mut config = ServerConfig::builder_with_provider(Arc::new(hardened_provider()))
        .with_protocol_versions(&[&rustls::version::TLS13, &rustls::version::TLS12])?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    config.ignore_client_order = true;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(config)
}

/// Crypto provider limited to AEAD suites with forward secrecy.
pub fn hardened_provider() -> CryptoProvider {
    use aws_lc_rs::cipher_suite as suite;
    use aws_lc_rs::kx_group;

    CryptoProvider {
        cipher_suites: vec![
            suite::TLS13_AES_256_GCM_SHA384,
            suite::TLS13_CHACHA20_POLY1305_SHA256,
            suite::TLS13_AES_128_GCM_SHA256,
            suite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
            suite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
            suite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
            suite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
            suite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
            suite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
        ],
        kx_groups: vec![kx_group::SECP256R1, kx_group::X25519, kx_group::SECP384R1],
        ..aws_lc_rs::default_provider()
    }
}

async fn read(path: &Path) -> Result<Vec<u8>, TlsError> {
    tokio::fs::read(path).await.map_err(|source| TlsError::Read {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustls::pki_types::PrivatePkcs8KeyDer;
    use rustls::{CipherSuite, NamedGroup, ProtocolVersion};

    fn self_signed() -> (Vec<CertificateDer<'static>>, PrivateKeyDer<'static>) {
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let key = PrivatePkcs8KeyDer::from(key_pair.serialize_der());
        (vec![cert.der().clone()], key.into())
    }

    #[test]
    fn provider_allows_only_modern_suites() {
        let provider = hardened_provider();
        for suite in &provider.cipher_suites {
            let version = suite.version().version;
            assert!(
                version == ProtocolVersion::TLSv1_2 || version == ProtocolVersion::TLSv1_3,
                "unexpected protocol for {:?}",
                suite.suite()
            );
        }
        assert!(!provider
            .cipher_suites
            .iter()
            .any(|s| s.suite() == CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA));

        let groups: Vec<NamedGroup> = provider.kx_groups.iter().map(|g| g.name()).collect();
        assert_eq!(
            groups,
            vec![NamedGroup::secp256r1, NamedGroup::X25519, NamedGroup::secp384r1]
        );
    }

    #[test]
    fn server_prefers_its_own_order() {
        let (certs, key) = self_signed();
        let config = server_config(certs, key).unwrap();
        assert!(config.ignore_client_order);
        assert_eq!(config.alpn_protocols[1], b"http/1.1".to_vec());
    }

    #[test]
    fn missing_certificate_is_reported_first() {
        let profile = TlsProfile {
            cert_path: "missing-cert.pem".into(),
            key_path: "missing-key.pem".into(),
            ..Default::default()
        };
        let err = verify_material(&profile).unwrap_err();
        assert!(matches!(err, ServerError::CertificateNotFound { .. }));
    }

    #[test]
    fn missing_key_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let cert_path = dir.path().join("cert.pem");
        std::fs::write(&cert_path, "placeholder").unwrap();

        let profile = TlsProfile {
            cert_path,
            key_path: dir.path().join("key.pem"),
            ..Default::default()
        };
        let err = verify_material(&profile).unwrap_err();
        assert!(matches!(err, ServerError::KeyNotFound { .. }));
    }

    #[tokio::test]
    async fn empty_certificate_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("key.pem");
        std::fs::write(&cert_path, "").unwrap();
        std::fs::write(&key_path, "").unwrap();

        let err = load_tls_config(&cert_path, &key_path).await.unwrap_err();
        assert!(matches!(err, TlsError::NoCertificates(_)));
    }
}
