//! Secure session layer: one authenticated, encrypted, ordered byte
//! stream between two endpoints.
//!
//! A session is established either by a [`SessionListener`] (bind a
//! port, accept one inbound connection, run the server-role handshake)
//! or by [`SecureSession::connect`] (connector-initiated, client-role
//! handshake). Both endpoints authenticate each other against the trust
//! anchors in their [`TlsCredentials`].
//!
//! Sessions are strictly sequential: reads and writes are serialized on
//! one task, and nothing here is safe for concurrent invocation from
//! multiple tasks against the same session. Concurrency across peers is
//! achieved with one session per connection.

pub mod tls;

use std::net::{Ipv6Addr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::{TlsAcceptor, TlsConnector, TlsStream};
use tracing::{debug, info};

use crate::core::error::TransportError;

pub use tls::TlsCredentials;

/// Listening endpoint that accepts one secure session per connection.
pub struct SessionListener {
    listener: TcpListener,
    acceptor: TlsAcceptor,
    port: u16,
}

impl SessionListener {
    /// Bind to `port` on the IPv6 any-address.
    ///
    /// A `port` of 0 requests an OS-assigned ephemeral port; the
    /// concrete value is resolved immediately after binding and exposed
    /// through [`port`](Self::port). A resolved port of 0 is a fatal
    /// initialization error.
    pub async fn bind(port: u16, credentials: &TlsCredentials) -> Result<Self, TransportError> {
        let config = credentials.server_config()?;
        let listener = TcpListener::bind((Ipv6Addr::UNSPECIFIED, port)).await?;
        let bound = listener.local_addr()?.port();
        if bound == 0 {
            return Err(TransportError::PortUnresolved);
        }
        info!(port = bound, "session listener bound");
        Ok(Self {
            listener,
            acceptor: TlsAcceptor::from(Arc::new(config)),
            port: bound,
        })
    }

    /// The concrete, nonzero port this listener is bound to.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Block until a peer connects, then run the server-role handshake.
    pub async fn accept(&self) -> Result<SecureSession, TransportError> {
        let (stream, peer) = self.listener.accept().await?;
        debug!(%peer, "tcp connection accepted, starting handshake");
        let tls = self.acceptor.accept(stream).await?;
        info!(%peer, "server handshake complete");
        Ok(SecureSession {
            stream: TlsStream::from(tls),
            peer,
        })
    }

    /// Like [`accept`](Self::accept), bounded by a deadline.
    pub async fn accept_timeout(&self, timeout: Duration) -> Result<SecureSession, TransportError> {
        match tokio::time::timeout(timeout, self.accept()).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::AcceptTimeout(timeout)),
        }
    }
}

impl std::fmt::Debug for SessionListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionListener")
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

/// One authenticated, encrypted duplex byte stream to exactly one peer.
///
/// The session owns the underlying socket for its whole lifetime.
/// Dropping it closes the descriptor; [`close`](Self::close) performs
/// an orderly shutdown first, swallowing any error it raises; cleanup
/// never escalates.
pub struct SecureSession {
    stream: TlsStream<TcpStream>,
    peer: SocketAddr,
}

impl SecureSession {
    /// Connect to `host:port` and run the client-role handshake,
    /// verifying the server certificate for `server_name`.
    pub async fn connect(
        host: &str,
        port: u16,
        server_name: &str,
        credentials: &TlsCredentials,
    ) -> Result<Self, TransportError> {
        let name = ServerName::try_from(server_name.to_string())
            .map_err(|_| TransportError::InvalidServerName(server_name.to_string()))?;
        let config = credentials.client_config()?;
        let connector = TlsConnector::from(Arc::new(config));
        let stream = TcpStream::connect((host, port)).await?;
        let peer = stream.peer_addr()?;
        let tls = connector.connect(name, stream).await?;
        info!(%peer, "client handshake complete");
        Ok(Self {
            stream: TlsStream::from(tls),
            peer,
        })
    }

    /// Address of the connected peer.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Whether the underlying socket descriptor is currently open.
    ///
    /// This inspects only the low-level socket, not the encrypted
    /// channel; a `true` result does not imply the peer is reachable.
    pub fn is_open(&self) -> bool {
        let (tcp, _) = self.stream.get_ref();
        tcp.peer_addr().is_ok()
    }

    /// Write all of `bytes` to the encrypted channel.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Read exactly `buf.len()` bytes from the encrypted channel.
    ///
    /// A short read, including a clean peer close mid-buffer, surfaces
    /// as an error.
    pub async fn recv_exact(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        self.stream.read_exact(buf).await?;
        Ok(())
    }

    /// Best-effort orderly teardown: send close_notify and shut the
    /// socket down. Errors during teardown are swallowed.
    pub async fn close(mut self) {
        let _ = self.stream.shutdown().await;
    }
}

impl std::fmt::Debug for SecureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureSession")
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

// The framer and legacy channel layer over a session generically, so the
// session delegates byte-level I/O to the TLS stream.
impl AsyncRead for SecureSession {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for SecureSession {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.get_mut().stream).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use tempdir::TempDir;

    fn write_credentials(dir: &Path) -> PathBuf {
        let generated = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let path = dir.join("identity.pem");
        let bundle = format!("{}{}", generated.cert.pem(), generated.key_pair.serialize_pem());
        std::fs::write(&path, bundle).unwrap();
        path
    }

    fn load_credentials(tmp: &TempDir) -> TlsCredentials {
        let path = write_credentials(tmp.path());
        TlsCredentials::load(&path).unwrap()
    }

    #[tokio::test]
    async fn test_ephemeral_port_is_resolved_nonzero() {
        let tmp = TempDir::new("worklink").unwrap();
        let creds = load_credentials(&tmp);

        let listener = SessionListener::bind(0, &creds).await.unwrap();
        assert_ne!(listener.port(), 0);
    }

    #[tokio::test]
    async fn test_sequential_ephemeral_binds_get_distinct_ports() {
        let tmp = TempDir::new("worklink").unwrap();
        let creds = load_credentials(&tmp);

        let first = SessionListener::bind(0, &creds).await.unwrap();
        let second = SessionListener::bind(0, &creds).await.unwrap();
        assert_ne!(first.port(), 0);
        assert_ne!(second.port(), 0);
        assert_ne!(first.port(), second.port());
    }

    #[tokio::test]
    async fn test_accept_timeout_without_peer() {
        let tmp = TempDir::new("worklink").unwrap();
        let creds = load_credentials(&tmp);

        let listener = SessionListener::bind(0, &creds).await.unwrap();
        let err = listener
            .accept_timeout(Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::AcceptTimeout(_)));
    }

    #[tokio::test]
    async fn test_handshake_and_raw_round_trip() {
        let tmp = TempDir::new("worklink").unwrap();
        let creds = load_credentials(&tmp);

        let listener = SessionListener::bind(0, &creds).await.unwrap();
        let port = listener.port();

        let (server, client) = tokio::join!(
            listener.accept(),
            SecureSession::connect("::1", port, "localhost", &creds),
        );
        let mut server = server.unwrap();
        let mut client = client.unwrap();

        assert!(server.is_open());
        assert!(client.is_open());

        client.send_raw(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        server.recv_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        server.send_raw(b"pong").await.unwrap();
        client.recv_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");

        client.close().await;
        server.close().await;
    }

    #[tokio::test]
    async fn test_invalid_server_name_is_rejected() {
        let tmp = TempDir::new("worklink").unwrap();
        let creds = load_credentials(&tmp);

        // The name is validated before any socket is dialed.
        let err = SecureSession::connect("::1", 1, "not a hostname", &creds)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidServerName(_)));
    }
}
