//! TLS certificate generation for seclink.
//!
//! Generates self-signed server certificates and small private certificate
//! authorities for TLS over TCP. Certificates are identified by their
//! SHA-256 fingerprint.

pub mod error;

pub use error::CertgenError;

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose, SanType,
};

const ORGANIZATION: &str = "seclink";

/// A generated certificate and private key pair.
pub struct GeneratedCert {
    /// PEM-encoded certificate.
    pub cert_pem: String,
    /// PEM-encoded private key.
    pub key_pem: String,
    /// SHA-256 fingerprint of the DER-encoded certificate.
    pub fingerprint: String,
}

impl GeneratedCert {
    /// Write `<stem>.crt` and `<stem>.key` into `dir`, returning both paths.
    pub fn write_to(&self, dir: &Path, stem: &str) -> Result<(PathBuf, PathBuf), CertgenError> {
        std::fs::create_dir_all(dir)?;
        let cert_path = dir.join(format!("{stem}.crt"));
        let key_path = dir.join(format!("{stem}.key"));
        std::fs::write(&cert_path, &self.cert_pem)?;
        std::fs::write(&key_path, &self.key_pem)?;
        Ok((cert_path, key_path))
    }
}

/// Generate a new self-signed server certificate.
///
/// The certificate is valid for the given hostname and includes
/// `localhost` and `127.0.0.1` as subject alternative names.
pub fn generate_certificate(hostname: &str) -> Result<GeneratedCert, CertgenError> {
    let key_pair = KeyPair::generate()?;
    let params = server_params(hostname)?;
    let cert = params.self_signed(&key_pair)?;
    Ok(finish(&cert, &key_pair))
}

/// Generate a certificate authority that can issue server certificates.
pub fn generate_ca(name: &str) -> Result<CertificateAuthority, CertgenError> {
    let key_pair = KeyPair::generate()?;

    let mut params = CertificateParams::default();
    params.distinguished_name = distinguished_name(name);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];

    let cert = params.self_signed(&key_pair)?;
    Ok(CertificateAuthority { cert, key_pair })
}

/// A private certificate authority.
pub struct CertificateAuthority {
    cert: Certificate,
    key_pair: KeyPair,
}

impl CertificateAuthority {
    /// PEM-encoded CA certificate, suitable as a client trust anchor.
    pub fn cert_pem(&self) -> String {
        self.cert.pem()
    }

    pub fn fingerprint(&self) -> String {
        sha256_fingerprint(self.cert.der())
    }

    /// Issue a server certificate for `hostname` signed by this authority.
    pub fn issue(&self, hostname: &str) -> Result<GeneratedCert, CertgenError> {
        let key_pair = KeyPair::generate()?;
        let params = server_params(hostname)?;
        let cert = params.signed_by(&key_pair, &self.cert, &self.key_pair)?;
        Ok(finish(&cert, &key_pair))
    }
}

fn server_params(hostname: &str) -> Result<CertificateParams, CertgenError> {
    let mut params = CertificateParams::default();
    params.distinguished_name = distinguished_name(hostname);
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];

    let mut names = vec![san(hostname)?];
    if hostname != "localhost" {
        names.push(san("localhost")?);
    }
    let loopback = SanType::IpAddress(IpAddr::V4(Ipv4Addr::LOCALHOST));
    if !names.contains(&loopback) {
        names.push(loopback);
    }
    params.subject_alt_names = names;
    Ok(params)
}

fn distinguished_name(common_name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    dn.push(DnType::OrganizationName, ORGANIZATION);
    dn
}

fn san(name: &str) -> Result<SanType, CertgenError> {
    if let Ok(ip) = name.parse::<IpAddr>() {
        return Ok(SanType::IpAddress(ip));
    }
    let dns = name.try_into().map_err(|e: rcgen::Error| CertgenError::InvalidName {
        name: name.to_string(),
        reason: e.to_string(),
    })?;
    Ok(SanType::DnsName(dns))
}

fn finish(cert: &Certificate, key_pair: &KeyPair) -> GeneratedCert {
    GeneratedCert {
        cert_pem: cert.pem(),
        key_pem: key_pair.serialize_pem(),
        fingerprint: sha256_fingerprint(cert.der()),
    }
}

/// Compute SHA-256 fingerprint of DER-encoded certificate bytes.
fn sha256_fingerprint(der: &[u8]) -> String {
    use std::fmt::Write;
    let digest = ring::digest::digest(&ring::digest::SHA256, der);
    let mut fingerprint = String::from("SHA256:");
    for (i, byte) in digest.as_ref().iter().enumerate() {
        if i > 0 {
            fingerprint.push(':');
        }
        let _ = write!(fingerprint, "{byte:02x}");
    }
    fingerprint
}
