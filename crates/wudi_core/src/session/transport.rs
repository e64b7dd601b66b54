//! The `Transport` trait (spec.md §4.4, §9 REDESIGN FLAGS): generalizes the
//! teacher's `ClientStream` marker trait
//! (`crates/migux_core/src/worker/mod.rs`, `AsyncRead + AsyncWrite + Unpin +
//! Send` over the inbound socket) to the outbound side — the stream used to
//! talk to the target site once any proxy handshake has already run over
//! the raw TCP connection.

use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::rustls;
use tokio_rustls::TlsConnector;

/// A stream ready to carry HTTP bytes to the target site. `upgrade` takes an
/// already-connected (and, for SOCKS5, already-tunneled) TCP stream and
/// turns it into the final transport; plain transport is a pass-through,
/// TLS transport performs the handshake here against `sni`.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + Sized {
    async fn upgrade(stream: TcpStream, sni: &str, handshake_timeout: Duration) -> std::io::Result<Self>;

    /// Named `close` rather than `shutdown` so it doesn't collide with
    /// `AsyncWriteExt::shutdown`, which every `Transport` impl also has in
    /// scope via its `AsyncWrite` bound.
    async fn close(&mut self);
}

/// Plain HTTP over the raw TCP connection — no upgrade step.
pub struct PlainTransport(TcpStream);

impl AsyncRead for PlainTransport {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        Pin::new(&mut this.0).poll_read(cx, buf)
    }
}

impl AsyncWrite for PlainTransport {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        let this = self.get_mut();
        Pin::new(&mut this.0).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        Pin::new(&mut this.0).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        Pin::new(&mut this.0).poll_shutdown(cx)
    }
}

impl Transport for PlainTransport {
    async fn upgrade(stream: TcpStream, _sni: &str, _handshake_timeout: Duration) -> std::io::Result<Self> {
        Ok(PlainTransport(stream))
    }

    async fn close(&mut self) {
        use tokio::io::AsyncWriteExt;
        let _ = self.0.shutdown().await;
    }
}

/// HTTPS — the TLS handshake runs against `sni` once the raw (and, for
/// SOCKS5, tunneled) TCP connection is up.
pub struct TlsTransport(tokio_rustls::client::TlsStream<TcpStream>);

impl AsyncRead for TlsTransport {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        Pin::new(&mut this.0).poll_read(cx, buf)
    }
}

impl AsyncWrite for TlsTransport {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        let this = self.get_mut();
        Pin::new(&mut this.0).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        Pin::new(&mut this.0).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        Pin::new(&mut this.0).poll_shutdown(cx)
    }
}

impl Transport for TlsTransport {
    async fn upgrade(stream: TcpStream, sni: &str, handshake_timeout: Duration) -> std::io::Result<Self> {
        let connector = TlsConnector::from(client_tls_config());
        let server_name = rustls::ServerName::try_from(sni)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        let stream = timeout(handshake_timeout, connector.connect(server_name, stream))
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "tls handshake timed out"))??;
        Ok(TlsTransport(stream))
    }

    async fn close(&mut self) {
        use tokio::io::AsyncWriteExt;
        let _ = self.0.shutdown().await;
    }
}

/// Built once per process: a `rustls::ClientConfig` trusting the
/// `webpki-roots` bundled CA set, generalizing the teacher's
/// `master::tls::load_tls_acceptor` (server-side cert/key loading) to the
/// client side, where we trust public CAs instead of loading our own cert.
fn client_tls_config() -> Arc<rustls::ClientConfig> {
    static CONFIG: OnceLock<Arc<rustls::ClientConfig>> = OnceLock::new();
    CONFIG
        .get_or_init(|| {
            let mut roots = rustls::RootCertStore::empty();
            roots.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
                rustls::OwnedTrustAnchor::from_subject_spki_name_constraints(
                    ta.subject,
                    ta.spki,
                    ta.name_constraints,
                )
            }));
            let config = rustls::ClientConfig::builder()
                .with_safe_defaults()
                .with_root_certificates(roots)
                .with_no_client_auth();
            Arc::new(config)
        })
        .clone()
}
