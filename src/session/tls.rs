//! TLS credential loading and configuration.
//!
//! Both endpoints load one PEM bundle that doubles as trust anchor and
//! certificate/private-key source: the certificates in the bundle are
//! installed as the root store used to verify the peer, and the first
//! certificate plus the bundled key identify the local endpoint. rustls
//! only negotiates TLS 1.2/1.3 with ephemeral key exchange, so no weak
//! protocol versions or static Diffie-Hellman configuration exist to
//! disable.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::server::WebPkiClientVerifier;
use tokio_rustls::rustls::{ClientConfig, RootCertStore, ServerConfig};

use crate::core::error::TransportError;

/// Certificate chain, private key, and trust anchors for one endpoint.
#[derive(Debug)]
pub struct TlsCredentials {
    certs: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
    roots: RootCertStore,
}

impl TlsCredentials {
    /// Load a PEM bundle containing at least one certificate and one
    /// private key.
    ///
    /// Every certificate in the bundle is also added to the trust
    /// anchor store used to verify the peer.
    pub fn load(path: &Path) -> Result<Self, TransportError> {
        let certs = rustls_pemfile::certs(&mut BufReader::new(File::open(path)?))
            .collect::<Result<Vec<_>, _>>()?;
        if certs.is_empty() {
            return Err(TransportError::InvalidCredentials(format!(
                "no certificate found in {}",
                path.display()
            )));
        }

        let key = rustls_pemfile::private_key(&mut BufReader::new(File::open(path)?))?
            .ok_or_else(|| {
                TransportError::InvalidCredentials(format!(
                    "no private key found in {}",
                    path.display()
                ))
            })?;

        let mut roots = RootCertStore::empty();
        for cert in &certs {
            roots.add(cert.clone())?;
        }

        Ok(Self { certs, key, roots })
    }

    /// Build the server-role TLS configuration (requires a verified
    /// client certificate).
    pub(crate) fn server_config(&self) -> Result<ServerConfig, TransportError> {
        let verifier = WebPkiClientVerifier::builder(Arc::new(self.roots.clone()))
            .build()
            .map_err(|e| TransportError::InvalidCredentials(e.to_string()))?;
        let config = ServerConfig::builder()
            .with_client_cert_verifier(verifier)
            .with_single_cert(self.certs.clone(), self.key.clone_key())?;
        Ok(config)
    }

    /// Build the client-role TLS configuration (presents the local
    /// certificate, verifies the server against the trust anchors).
    pub(crate) fn client_config(&self) -> Result<ClientConfig, TransportError> {
        let config = ClientConfig::builder()
            .with_root_certificates(self.roots.clone())
            .with_client_auth_cert(self.certs.clone(), self.key.clone_key())?;
        Ok(config)
    }
}
