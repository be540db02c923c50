//! Outbound connections: TCP connect followed by a client TLS handshake.

use std::time::Duration;

use rustls::RootCertStore;
use seclink_types::Endpoint;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info};

use crate::channel::SecureChannel;
use crate::error::ProtocolError;
use crate::tls;
use crate::trust::TrustPolicy;
use crate::wire::WireProtocol;

/// Timeouts applied while establishing a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectorOptions {
    pub connect_timeout: Duration,
    pub handshake_timeout: Duration,
}

impl Default for ConnectorOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

/// Dials one endpoint and authenticates it as `server_name`.
#[derive(Debug, Clone)]
pub struct ClientConnector {
    endpoint: Endpoint,
    server_name: String,
    policy: TrustPolicy,
    roots: RootCertStore,
    options: ConnectorOptions,
}

impl ClientConnector {
    /// A connector with no trust anchors: only `accept_self_signed` lets an
    /// unanchored chain through.
    pub fn new(endpoint: Endpoint, server_name: impl Into<String>, accept_self_signed: bool) -> Self {
        Self {
            endpoint,
            server_name: server_name.into(),
            policy: TrustPolicy::new(accept_self_signed),
            roots: RootCertStore::empty(),
            options: ConnectorOptions::default(),
        }
    }

    #[must_use]
    pub fn with_trust_anchors(mut self, roots: RootCertStore) -> Self {
        self.roots = roots;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: ConnectorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn policy(&self) -> TrustPolicy {
        self.policy
    }

    /// Connect and authenticate. The returned channel is connected but not
    /// started.
    ///
    /// Fails with [`ProtocolError::Connection`] when the socket cannot be
    /// opened and [`ProtocolError::Authentication`] when the handshake or the
    /// trust policy rejects the server. Nothing is retried.
    pub async fn connect<P: WireProtocol>(
        &self,
        protocol: P,
    ) -> Result<SecureChannel<P>, ProtocolError> {
        let name = tls::server_name(&self.server_name)?;
        let addr = self.endpoint.dial_addr().ok_or_else(|| {
            ProtocolError::Connection(format!("cannot dial wildcard endpoint {}", self.endpoint))
        })?;

        let tcp = match tokio::time::timeout(self.options.connect_timeout, TcpStream::connect(addr))
            .await
        {
            Ok(Ok(tcp)) => tcp,
            Ok(Err(e)) => return Err(ProtocolError::Connection(format!("{addr}: {e}"))),
            Err(_) => {
                return Err(ProtocolError::Connection(format!(
                    "{addr}: timed out after {:?}",
                    self.options.connect_timeout
                )))
            }
        };
        if let Err(e) = tcp.set_nodelay(true) {
            debug!(remote = %addr, error = %e, "failed to set TCP_NODELAY");
        }
        debug!(remote = %addr, "tcp connected");

        let config = tls::client_config(self.policy, self.roots.clone());
        let handshake = TlsConnector::from(config).connect(name, tcp);
        let stream = match tokio::time::timeout(self.options.handshake_timeout, handshake).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                debug!(remote = %addr, error = %e, "client handshake failed");
                return Err(ProtocolError::Authentication(e.to_string()));
            }
            Err(_) => {
                return Err(ProtocolError::Authentication(format!(
                    "handshake timed out after {:?}",
                    self.options.handshake_timeout
                )))
            }
        };

        info!(remote = %self.endpoint, server_name = %self.server_name, "secure channel established");
        Ok(SecureChannel::new(stream, self.endpoint, protocol))
    }
}

/// Connect with default options and no trust anchors.
pub async fn connect<P: WireProtocol>(
    endpoint: Endpoint,
    server_name: &str,
    accept_self_signed: bool,
    protocol: P,
) -> Result<SecureChannel<P>, ProtocolError> {
    ClientConnector::new(endpoint, server_name, accept_self_signed)
        .connect(protocol)
        .await
}

#[cfg(test)]
mod tests {
    use seclink_types::Message;

    use super::*;
    use crate::wire::BincodeWireProtocol;

    type Protocol = BincodeWireProtocol<Message>;

    #[tokio::test]
    async fn wildcard_endpoint_cannot_be_dialed() {
        let err = connect(Endpoint::any(10085), "localhost", true, Protocol::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Connection(_)), "{err}");
    }

    #[tokio::test]
    async fn invalid_server_name_fails_before_io() {
        let endpoint: Endpoint = "127.0.0.1:1".parse().unwrap();
        let err = connect(endpoint, "not a host name", true, Protocol::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Tls(_)), "{err}");
    }

    #[tokio::test]
    async fn refused_connection_is_a_connection_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = connect(addr.into(), "localhost", true, Protocol::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Connection(_)), "{err}");
    }

    #[tokio::test]
    async fn silent_server_times_out_handshake() {
        // Accepts TCP but never speaks TLS.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _hold = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let connector = ClientConnector::new(addr.into(), "localhost", true).with_options(
            ConnectorOptions {
                handshake_timeout: Duration::from_millis(100),
                ..ConnectorOptions::default()
            },
        );
        let err = connector.connect(Protocol::new()).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Authentication(_)), "{err}");
    }

    #[tokio::test]
    async fn failures_never_surface_as_raw_io() {
        // Accepts TCP and hangs up before any TLS bytes.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                drop(socket);
            }
        });
        let closed = {
            let unused = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            unused.local_addr().unwrap()
        };

        for addr in [open, closed] {
            let err = connect(addr.into(), "localhost", true, Protocol::new())
                .await
                .unwrap_err();
            assert!(
                matches!(
                    err,
                    ProtocolError::Connection(_) | ProtocolError::Authentication(_)
                ),
                "{addr}: {err:?}"
            );
        }
    }

    #[test]
    fn builder_keeps_settings() {
        let endpoint: Endpoint = "10.0.0.1:443".parse().unwrap();
        let connector = ClientConnector::new(endpoint, "server.internal", false);
        assert_eq!(connector.endpoint(), endpoint);
        assert_eq!(connector.server_name(), "server.internal");
        assert!(!connector.policy().accept_self_signed);
        assert_eq!(
            ConnectorOptions::default().connect_timeout,
            Duration::from_secs(10)
        );
    }
}
