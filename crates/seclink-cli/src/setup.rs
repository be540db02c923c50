//! Config loading and TLS material for the CLI commands.

use std::path::{Path, PathBuf};

use anyhow::Context;
use seclink_protocol::{tls, ClientConnector, ServerIdentity};
use seclink_types::Endpoint;
use tracing::info;

use crate::config::{ClientConfig, Config, ServerConfig};

const CERT_STEM: &str = "seclink";

/// Load configuration from the given path, or the default location.
///
/// A missing file at the default location yields the defaults; an explicit
/// path must exist.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<(Config, Option<PathBuf>)> {
    let config_path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let default = default_config_path();
            if !default.exists() {
                return Ok((Config::default(), None));
            }
            default
        }
    };

    let content = std::fs::read_to_string(&config_path)
        .with_context(|| format!("failed to read config {}", config_path.display()))?;
    let config: Config = toml::from_str(&content)
        .with_context(|| format!("failed to parse config {}", config_path.display()))?;
    Ok((config, Some(config_path)))
}

/// Server certificate and key: the configured files, or a self-signed pair
/// kept in `dir` and generated on first use.
pub fn load_or_generate_identity(server: &ServerConfig, dir: &Path) -> anyhow::Result<ServerIdentity> {
    if let (Some(cert), Some(key)) = (&server.cert, &server.key) {
        let identity = ServerIdentity::from_files(cert, key)?;
        info!(path = %cert.display(), "loaded TLS cert");
        return Ok(identity);
    }

    let cert_path = dir.join(format!("{CERT_STEM}.crt"));
    let key_path = dir.join(format!("{CERT_STEM}.key"));
    if cert_path.exists() && key_path.exists() {
        let identity = ServerIdentity::from_files(&cert_path, &key_path)?;
        info!(path = %cert_path.display(), "loaded existing TLS cert");
        return Ok(identity);
    }

    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create config dir {}", dir.display()))?;
    let cert = seclink_certgen::generate_certificate(&local_hostname())?;
    cert.write_to(dir, CERT_STEM)?;
    info!(fingerprint = %cert.fingerprint, path = %cert_path.display(), "generated new TLS cert");

    Ok(ServerIdentity::from_pem(&cert.cert_pem, &cert.key_pem)?)
}

/// Connector for `endpoint` using the client trust settings.
pub fn connector(client: &ClientConfig, endpoint: Endpoint) -> anyhow::Result<ClientConnector> {
    let mut connector = ClientConnector::new(endpoint, &client.server_name, client.accept_self_signed)
        .with_options(client.connector_options());
    if let Some(ca) = &client.ca {
        let pem = std::fs::read_to_string(ca)
            .with_context(|| format!("failed to read trust anchors {}", ca.display()))?;
        connector = connector.with_trust_anchors(tls::root_store(&pem)?);
    }
    Ok(connector)
}

pub fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "seclink".to_string())
}

/// Get the default config directory path.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("seclink")
}

fn default_config_path() -> PathBuf {
    config_dir().join("config.toml")
}
