//! Server certificate trust policy.
//!
//! Chain validation and server-name validation are evaluated separately and
//! folded into a [`PolicyErrors`] set. [`TrustPolicy`] then decides whether
//! that set is acceptable. A name mismatch is never tolerated: it means the
//! peer is a different endpoint, not merely one with an untrusted issuer.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::{verify_server_cert_signed_by_trust_anchor, verify_server_name};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::server::ParsedCertificate;
use rustls::{CertificateError, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tracing::debug;

/// Set of validation failures observed for a presented certificate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PolicyErrors(u8);

impl PolicyErrors {
    pub const NONE: Self = Self(0);
    /// The certificate does not cover the expected server name.
    pub const NAME_MISMATCH: Self = Self(1);
    /// The chain does not lead to a trusted root (self-signed, unknown CA,
    /// outside its validity window).
    pub const CHAIN_ERRORS: Self = Self(1 << 1);
    /// Anything else, including unparseable certificates.
    pub const OTHER: Self = Self(1 << 2);

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for PolicyErrors {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for PolicyErrors {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for PolicyErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let names = [
            (Self::NAME_MISMATCH, "name-mismatch"),
            (Self::CHAIN_ERRORS, "chain-errors"),
            (Self::OTHER, "other"),
        ];
        let mut first = true;
        for (flag, name) in names {
            if self.contains(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Decides whether a certificate with the given validation errors is trusted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrustPolicy {
    /// Tolerate chain errors such as a self-signed or unknown issuer.
    pub accept_self_signed: bool,
}

impl TrustPolicy {
    pub fn new(accept_self_signed: bool) -> Self {
        Self { accept_self_signed }
    }

    /// Pure decision; performs no I/O.
    pub fn accepts(&self, errors: PolicyErrors) -> bool {
        match errors {
            PolicyErrors::NONE => true,
            PolicyErrors::NAME_MISMATCH => false,
            PolicyErrors::CHAIN_ERRORS => self.accept_self_signed,
            _ => false,
        }
    }
}

/// rustls verifier applying a [`TrustPolicy`] during the client handshake.
#[derive(Debug)]
pub struct TrustPolicyVerifier {
    policy: TrustPolicy,
    roots: Arc<RootCertStore>,
    provider: Arc<CryptoProvider>,
}

impl TrustPolicyVerifier {
    /// `roots` may be empty, in which case every chain is untrusted and only
    /// `accept_self_signed` lets a connection through.
    pub fn new(policy: TrustPolicy, roots: RootCertStore) -> Self {
        Self {
            policy,
            roots: Arc::new(roots),
            provider: Arc::new(rustls::crypto::ring::default_provider()),
        }
    }

    pub fn policy(&self) -> TrustPolicy {
        self.policy
    }

    /// Validate the chain and the server name independently.
    pub fn classify(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        now: UnixTime,
    ) -> PolicyErrors {
        let cert = match ParsedCertificate::try_from(end_entity) {
            Ok(cert) => cert,
            Err(e) => {
                debug!(error = %e, "unparseable server certificate");
                return PolicyErrors::OTHER;
            }
        };

        let mut errors = PolicyErrors::NONE;
        if let Err(e) = verify_server_cert_signed_by_trust_anchor(
            &cert,
            &self.roots,
            intermediates,
            now,
            self.provider.signature_verification_algorithms.all,
        ) {
            errors |= classify_chain_error(&e);
        }
        if verify_server_name(&cert, server_name).is_err() {
            errors |= PolicyErrors::NAME_MISMATCH;
        }
        errors
    }
}

fn classify_chain_error(error: &rustls::Error) -> PolicyErrors {
    match error {
        rustls::Error::InvalidCertificate(
            CertificateError::UnknownIssuer
            | CertificateError::Expired
            | CertificateError::NotValidYet
            | CertificateError::UnknownRevocationStatus
            | CertificateError::InvalidPurpose,
        ) => PolicyErrors::CHAIN_ERRORS,
        _ => PolicyErrors::OTHER,
    }
}

impl ServerCertVerifier for TrustPolicyVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let errors = self.classify(end_entity, intermediates, server_name, now);
        if self.policy.accepts(errors) {
            debug!(server = ?server_name, %errors, "server certificate accepted");
            return Ok(ServerCertVerified::assertion());
        }

        debug!(server = ?server_name, %errors, "server certificate rejected");
        Err(if errors.contains(PolicyErrors::NAME_MISMATCH) {
            rustls::Error::InvalidCertificate(CertificateError::NotValidForName)
        } else if errors == PolicyErrors::CHAIN_ERRORS {
            rustls::Error::InvalidCertificate(CertificateError::UnknownIssuer)
        } else {
            rustls::Error::General(format!("certificate rejected by trust policy ({errors})"))
        })
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
