//! End-to-end tests over real TLS sockets on the loopback interface.
//!
//! Both endpoints share one self-signed PEM bundle acting as trust
//! anchor, certificate, and private key, mirroring the deployment
//! layout.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempdir::TempDir;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use worklink::sync::{receiver, sender};
use worklink::{Framer, LegacyChannel, SecureSession, SessionListener, TlsCredentials};

/// Route protocol events to stderr, filtered by `RUST_LOG`. Repeated
/// initialization across tests is a no-op.
fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init();
}

fn write_credentials(dir: &Path) -> PathBuf {
    let generated = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let path = dir.join("identity.pem");
    let bundle = format!(
        "{}{}",
        generated.cert.pem(),
        generated.key_pair.serialize_pem()
    );
    fs::write(&path, bundle).unwrap();
    path
}

async fn connected_pair(creds: &TlsCredentials) -> (SecureSession, SecureSession) {
    let listener = SessionListener::bind(0, creds).await.unwrap();
    let port = listener.port();
    let (server, client) = tokio::join!(
        listener.accept(),
        SecureSession::connect("::1", port, "localhost", creds),
    );
    (server.unwrap(), client.unwrap())
}

#[tokio::test]
async fn full_sync_round_over_tls() {
    init_tracing();
    let tmp = TempDir::new("worklink").unwrap();
    let creds = TlsCredentials::load(&write_credentials(tmp.path())).unwrap();

    let src = TempDir::new("worklink-src").unwrap();
    let dst = TempDir::new("worklink-dst").unwrap();
    fs::write(src.path().join("case-001.bin"), b"symbolic trace one").unwrap();
    fs::write(src.path().join("case-002.bin"), b"symbolic trace two").unwrap();

    let (server, client) = connected_pair(&creds).await;
    let mut dispatcher = Framer::new(server);
    let mut worker = Framer::new(client);

    let dest = dst.path().to_string_lossy().into_owned();
    let (sent, applied) = tokio::join!(
        sender::push_directory(&mut dispatcher, src.path(), &dest),
        receiver::receive_update(&mut worker),
    );
    let sent = sent.unwrap();
    assert_eq!(sent, applied.unwrap());
    assert_eq!(
        sent,
        vec!["case-001.bin".to_string(), "case-002.bin".to_string()]
    );
    assert_eq!(
        fs::read(dst.path().join("case-001.bin")).unwrap(),
        b"symbolic trace one"
    );
    assert_eq!(
        fs::read(dst.path().join("case-002.bin")).unwrap(),
        b"symbolic trace two"
    );

    // The same session carries the next round; mtime propagation means
    // nothing is stale anymore.
    let (sent, applied) = tokio::join!(
        sender::push_directory(&mut dispatcher, src.path(), &dest),
        receiver::receive_update(&mut worker),
    );
    assert!(sent.unwrap().is_empty());
    assert!(applied.unwrap().is_empty());
}

#[tokio::test]
async fn legacy_channel_over_tls() {
    init_tracing();
    let tmp = TempDir::new("worklink").unwrap();
    let creds = TlsCredentials::load(&write_credentials(tmp.path())).unwrap();

    let (server, client) = connected_pair(&creds).await;
    let mut tx = LegacyChannel::new(server);
    let mut rx = LegacyChannel::new(client);

    tx.send("dispatch ready").await.unwrap();
    assert_eq!(rx.recv().await.unwrap(), Some("dispatch ready".to_string()));

    // An orderly close on the sending side surfaces as the legacy
    // sentinel on the receiver.
    tx.into_inner().close().await;
    assert_eq!(rx.recv().await.unwrap(), None);
}

#[tokio::test]
async fn framed_packets_over_tls() {
    init_tracing();
    let tmp = TempDir::new("worklink").unwrap();
    let creds = TlsCredentials::load(&write_credentials(tmp.path())).unwrap();

    let (server, client) = connected_pair(&creds).await;
    let mut tx = Framer::new(server);
    let mut rx = Framer::new(client);

    let payload = vec![0x5au8; 4096];
    tx.write_buf(99, 4, &payload).await.unwrap();
    let (header, received) = rx.read_payload().await.unwrap();
    assert_eq!(header.id, 99);
    assert_eq!(header.kind, 4);
    assert_eq!(received, payload);
}

#[tokio::test]
async fn accept_timeout_then_successful_accept() {
    init_tracing();
    let tmp = TempDir::new("worklink").unwrap();
    let creds = TlsCredentials::load(&write_credentials(tmp.path())).unwrap();

    let listener = SessionListener::bind(0, &creds).await.unwrap();
    assert!(listener
        .accept_timeout(Duration::from_millis(50))
        .await
        .is_err());

    // The listener stays usable after a timed-out accept.
    let port = listener.port();
    let (server, client) = tokio::join!(
        listener.accept_timeout(Duration::from_secs(5)),
        SecureSession::connect("::1", port, "localhost", &creds),
    );
    let mut server = server.unwrap();
    let mut client = client.unwrap();
    client.send_raw(b"ok").await.unwrap();
    let mut buf = [0u8; 2];
    server.recv_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ok");
}
