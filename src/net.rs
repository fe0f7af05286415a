//! Shared network plumbing for the protocol probes: target parsing and TLS
//! connector construction.

use std::sync::Arc;

use once_cell::sync::Lazy;
use reqwest::Url;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use tokio_rustls::TlsConnector;

/// Extracts host and port from a check target, which may be a full URL
/// (`https://example.com:8443/path`), a `host:port` pair, or a bare hostname.
pub fn host_and_port(target: &str, default_port: u16) -> (String, u16) {
    if target.contains("://") {
        if let Ok(url) = Url::parse(target) {
            if let Some(host) = url.host_str() {
                return (host.to_string(), url.port().unwrap_or(default_port));
            }
        }
    }
    let stripped = target.split('/').next().unwrap_or(target);
    match stripped.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) => {
            (host.to_string(), port.parse().unwrap_or(default_port))
        }
        _ => (stripped.to_string(), default_port),
    }
}

/// Extracts the hostname only, discarding any scheme, port, or path.
pub fn host_of(target: &str) -> String {
    host_and_port(target, 0).0
}

/// Certificate verifier that accepts any server certificate.
///
/// The SSL and TLS probes exist to observe certificate and protocol facts,
/// including for endpoints whose certificates are already expired or
/// otherwise invalid, so the handshake must not reject what the probe is
/// supposed to report on.
#[derive(Debug)]
struct AcceptAnyServerCert;

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}

// The provider is pinned explicitly: the dependency graph enables more than
// one rustls crypto backend, so the feature-based default is ambiguous.
fn tls_builder() -> rustls::ConfigBuilder<rustls::ClientConfig, rustls::WantsVerifier> {
    rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .expect("ring provider supports the default protocol versions")
}

static PERMISSIVE_CONNECTOR: Lazy<TlsConnector> = Lazy::new(|| {
    let config = tls_builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert))
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
});

static VERIFYING_CONNECTOR: Lazy<TlsConnector> = Lazy::new(|| {
    let mut roots = rustls::RootCertStore::empty();
    for cert in rustls_native_certs::load_native_certs().certs {
        let _ = roots.add(cert);
    }
    let config = tls_builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
});

/// Connector used by the certificate/protocol introspection probes.
pub fn permissive_tls_connector() -> TlsConnector {
    PERMISSIVE_CONNECTOR.clone()
}

/// Connector with system trust roots, used by the mail probes and the email
/// delivery channel.
pub fn verifying_tls_connector() -> TlsConnector {
    VERIFYING_CONNECTOR.clone()
}

/// Owned SNI name for a handshake.
pub fn server_name(host: &str) -> Result<ServerName<'static>, String> {
    ServerName::try_from(host.to_string()).map_err(|e| format!("invalid server name '{host}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_urls() {
        assert_eq!(
            host_and_port("https://example.com/path", 443),
            ("example.com".to_string(), 443)
        );
        assert_eq!(
            host_and_port("https://example.com:8443/path", 443),
            ("example.com".to_string(), 8443)
        );
    }

    #[test]
    fn parses_bare_hosts() {
        assert_eq!(
            host_and_port("mail.example.com", 587),
            ("mail.example.com".to_string(), 587)
        );
        assert_eq!(
            host_and_port("mail.example.com:2525", 587),
            ("mail.example.com".to_string(), 2525)
        );
    }

    #[test]
    fn host_of_strips_everything_but_the_host() {
        assert_eq!(host_of("https://example.com:8443/x/y"), "example.com");
        assert_eq!(host_of("example.com:80"), "example.com");
        assert_eq!(host_of("example.com"), "example.com");
    }
}
