//! TLS configuration for TCP channels.

use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::RootCertStore;
use tracing::debug;

use crate::error::ProtocolError;
use crate::trust::{TrustPolicy, TrustPolicyVerifier};

/// Install the ring crypto provider as the process default, if none is set.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Server identity: a certificate chain and its private key.
#[derive(Debug)]
pub struct ServerIdentity {
    pub certs: Vec<CertificateDer<'static>>,
    pub key: PrivateKeyDer<'static>,
}

impl ServerIdentity {
    pub fn from_pem(cert_pem: &str, key_pem: &str) -> Result<Self, ProtocolError> {
        Ok(Self {
            certs: parse_certs(cert_pem)?,
            key: parse_key(key_pem)?,
        })
    }

    pub fn from_files(cert_path: &Path, key_path: &Path) -> Result<Self, ProtocolError> {
        Ok(Self {
            certs: load_certs(cert_path)?,
            key: load_private_key(key_path)?,
        })
    }
}

impl Clone for ServerIdentity {
    fn clone(&self) -> Self {
        Self {
            certs: self.certs.clone(),
            key: self.key.clone_key(),
        }
    }
}

/// Build a rustls `ServerConfig` that authenticates the server only.
///
/// Protocol versions are the rustls safe defaults; no client certificate is
/// requested.
pub fn server_config(identity: ServerIdentity) -> Result<Arc<rustls::ServerConfig>, ProtocolError> {
    install_crypto_provider();
    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(identity.certs, identity.key)
        .map_err(|e| ProtocolError::Tls(e.to_string()))?;
    debug!("built server TLS config");
    Ok(Arc::new(config))
}

/// Build a rustls `ClientConfig` whose certificate checks follow `policy`.
pub fn client_config(
    policy: TrustPolicy,
    roots: RootCertStore,
) -> Arc<rustls::ClientConfig> {
    install_crypto_provider();
    let verifier = TrustPolicyVerifier::new(policy, roots);
    let config = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();
    debug!(
        accept_self_signed = policy.accept_self_signed,
        "built client TLS config"
    );
    Arc::new(config)
}

/// Build a root store from PEM-encoded trust anchors.
pub fn root_store(pem: &str) -> Result<RootCertStore, ProtocolError> {
    let mut roots = RootCertStore::empty();
    for cert in parse_certs(pem)? {
        roots
            .add(cert)
            .map_err(|e| ProtocolError::Tls(format!("invalid trust anchor: {e}")))?;
    }
    Ok(roots)
}

/// Validate and own an expected server name (DNS name or IP address).
pub fn server_name(name: &str) -> Result<ServerName<'static>, ProtocolError> {
    ServerName::try_from(name.to_string())
        .map_err(|e| ProtocolError::Tls(format!("invalid server name {name:?}: {e}")))
}

pub fn parse_certs(pem: &str) -> Result<Vec<CertificateDer<'static>>, ProtocolError> {
    let mut reader = std::io::BufReader::new(pem.as_bytes());
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ProtocolError::Tls(format!("failed to parse certificate PEM: {e}")))?;
    if certs.is_empty() {
        return Err(ProtocolError::Tls(
            "no certificates found in PEM".to_string(),
        ));
    }
    Ok(certs)
}

pub fn parse_key(pem: &str) -> Result<PrivateKeyDer<'static>, ProtocolError> {
    let mut reader = std::io::BufReader::new(pem.as_bytes());
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| ProtocolError::Tls(format!("failed to parse key PEM: {e}")))?
        .ok_or_else(|| ProtocolError::Tls("no private key found in PEM".to_string()))
}

/// Read every certificate from a PEM file.
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ProtocolError> {
    parse_certs(&read_pem(path)?)
}

/// Read the first private key from a PEM file.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, ProtocolError> {
    parse_key(&read_pem(path)?)
}

fn read_pem(path: &Path) -> Result<String, ProtocolError> {
    std::fs::read_to_string(path)
        .map_err(|e| ProtocolError::Tls(format!("failed to read {}: {e}", path.display())))
}
