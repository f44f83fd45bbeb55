//! QUIC transport built on Quinn.
//!
//! One QUIC connection per client session. The client opens a bidirectional
//! stream per request; the server pushes location updates down a single
//! unidirectional stream it opens right after the handshake. TLS 1.3 is
//! mandatory and ALPN is pinned to `waypost` so a mismatched peer fails the
//! handshake instead of exchanging garbage frames.
//!
//! Certificates come from PEM files in production. Without them the
//! transport falls back to a freshly generated self-signed certificate,
//! which only dev clients configured to skip verification will accept.

use std::{net::SocketAddr, sync::Arc};

use quinn::{Endpoint, RecvStream, SendStream, ServerConfig};
use waypost_proto::ALPN_PROTOCOL;

use crate::error::ServerError;

/// Server-side QUIC endpoint.
pub struct QuinnTransport {
    endpoint: Endpoint,
}

impl QuinnTransport {
    /// Bind the endpoint.
    ///
    /// With both `cert_path` and `key_path` set the PEM files are loaded;
    /// otherwise a self-signed certificate is generated and a warning is
    /// logged.
    ///
    /// # Errors
    ///
    /// [`ServerError::Config`] for an unparseable address or bad TLS
    /// material, [`ServerError::Transport`] if the UDP socket can't bind.
    pub fn bind(
        address: &str,
        cert_path: Option<&str>,
        key_path: Option<&str>,
    ) -> Result<Self, ServerError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| ServerError::Config(format!("invalid bind address '{address}': {e}")))?;

        let server_config = match (cert_path, key_path) {
            (Some(cert), Some(key)) => load_tls_config(cert, key)?,
            _ => generate_self_signed_config()?,
        };

        let endpoint = Endpoint::server(server_config, addr)
            .map_err(|e| ServerError::Transport(format!("failed to bind endpoint: {e}")))?;

        tracing::info!(address = %addr, "QUIC transport bound");

        Ok(Self { endpoint })
    }

    /// Wait for the next incoming connection.
    ///
    /// # Errors
    ///
    /// [`ServerError::Transport`] if the endpoint is closed or the QUIC
    /// handshake fails.
    pub async fn accept(&self) -> Result<QuinnConnection, ServerError> {
        let incoming = self
            .endpoint
            .accept()
            .await
            .ok_or_else(|| ServerError::Transport("endpoint closed".to_string()))?;

        let connection = incoming
            .await
            .map_err(|e| ServerError::Transport(format!("handshake failed: {e}")))?;

        Ok(QuinnConnection { connection })
    }

    /// Address the endpoint actually bound to (useful with port 0).
    ///
    /// # Errors
    ///
    /// [`ServerError::Transport`] if the socket address can't be read.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.endpoint
            .local_addr()
            .map_err(|e| ServerError::Transport(format!("failed to read local address: {e}")))
    }
}

/// One accepted QUIC connection.
///
/// Clones share the underlying connection, so the accept loop can hand a
/// clone to each stream task.
#[derive(Clone)]
pub struct QuinnConnection {
    connection: quinn::Connection,
}

impl QuinnConnection {
    /// Accept the next client-opened bidirectional stream.
    ///
    /// # Errors
    ///
    /// [`ServerError::Transport`] once the connection is closed.
    pub async fn accept_bi(&self) -> Result<(SendStream, RecvStream), ServerError> {
        self.connection
            .accept_bi()
            .await
            .map_err(|e| ServerError::Transport(format!("accept_bi failed: {e}")))
    }

    /// Open the server-to-client push stream.
    ///
    /// # Errors
    ///
    /// [`ServerError::Transport`] if the connection is closed.
    pub async fn open_uni(&self) -> Result<SendStream, ServerError> {
        self.connection
            .open_uni()
            .await
            .map_err(|e| ServerError::Transport(format!("open_uni failed: {e}")))
    }

    /// Remote peer address.
    pub fn remote_addr(&self) -> SocketAddr {
        self.connection.remote_address()
    }

    /// Close the connection, sending the reason to the peer.
    pub fn close(&self, error_code: quinn::VarInt, reason: &[u8]) {
        self.connection.close(error_code, reason);
    }
}

/// Wrap a rustls config for Quinn, pinning the ALPN protocol.
fn quic_server_config(mut tls_config: rustls::ServerConfig) -> Result<ServerConfig, ServerError> {
    tls_config.alpn_protocols = vec![ALPN_PROTOCOL.to_vec()];

    Ok(ServerConfig::with_crypto(Arc::new(
        quinn::crypto::rustls::QuicServerConfig::try_from(tls_config)
            .map_err(|e| ServerError::Config(format!("QUIC config error: {e}")))?,
    )))
}

fn load_tls_config(cert_path: &str, key_path: &str) -> Result<ServerConfig, ServerError> {
    let cert_pem = std::fs::read(cert_path)
        .map_err(|e| ServerError::Config(format!("failed to read cert '{cert_path}': {e}")))?;
    let key_pem = std::fs::read(key_path)
        .map_err(|e| ServerError::Config(format!("failed to read key '{key_path}': {e}")))?;

    let certs = rustls_pemfile::certs(&mut &cert_pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::Config(format!("failed to parse certificates: {e}")))?;

    let key = rustls_pemfile::private_key(&mut &key_pem[..])
        .map_err(|e| ServerError::Config(format!("failed to parse private key: {e}")))?
        .ok_or_else(|| ServerError::Config("no private key found".to_string()))?;

    let tls_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::Config(format!("invalid TLS config: {e}")))?;

    quic_server_config(tls_config)
}

fn generate_self_signed_config() -> Result<ServerConfig, ServerError> {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
        .map_err(|e| ServerError::Config(format!("failed to generate self-signed cert: {e}")))?;

    let key = rustls::pki_types::PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der());

    let tls_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert.cert.der().clone()], key.into())
        .map_err(|e| ServerError::Config(format!("invalid TLS config: {e}")))?;

    tracing::warn!("using self-signed certificate, dev only");

    quic_server_config(tls_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn binds_with_self_signed_cert() {
        let transport =
            QuinnTransport::bind("127.0.0.1:0", None, None).expect("bind should succeed");

        let addr = transport.local_addr().expect("local_addr should succeed");
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn rejects_unparseable_address() {
        let result = QuinnTransport::bind("not-an-address", None, None);
        assert!(matches!(result, Err(ServerError::Config(_))));
    }
}
