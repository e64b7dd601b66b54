//! The `ProxyHandshake` trait (spec.md §4.4, §9 REDESIGN FLAGS): whatever a
//! session must do against the proxy's raw TCP connection before the HTTP
//! request can go out. Grounded in
//! `original_source/server2/socks5_http_socket_base.hpp` for the SOCKS5
//! case; the HTTP-CONNECT-style case needs nothing extra since the site
//! adapter already addresses the proxy with an absolute-form target URL.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use parser::socks5;

use super::limits::{
    MAX_SOCKS5_FIRST_HANDSHAKE_RETRIES, MAX_SOCKS5_SECOND_HANDSHAKE_RETRIES, SOCKS5_CONNECT_TIMEOUT,
    SOCKS5_GREETING_TIMEOUT,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeOutcome {
    Ready,
    Unresponsive,
}

pub trait ProxyHandshake: Send {
    /// Run against `stream` (already connected to the proxy) to arrange a
    /// path to `target_host:target_port`. Any handshake failure maps to
    /// `Unresponsive` — the caller marks the proxy accordingly and rotates.
    async fn establish(stream: &mut TcpStream, target_host: &str, target_port: u16) -> std::io::Result<HandshakeOutcome>;
}

pub struct NoHandshake;

impl ProxyHandshake for NoHandshake {
    async fn establish(_stream: &mut TcpStream, _target_host: &str, _target_port: u16) -> std::io::Result<HandshakeOutcome> {
        Ok(HandshakeOutcome::Ready)
    }
}

/// Two-step SOCKS5 handshake, no-auth only (spec.md §4.4).
pub struct Socks5Handshake;

impl ProxyHandshake for Socks5Handshake {
    async fn establish(stream: &mut TcpStream, target_host: &str, target_port: u16) -> std::io::Result<HandshakeOutcome> {
        if !greet(stream).await {
            return Ok(HandshakeOutcome::Unresponsive);
        }
        if !connect(stream, target_host, target_port).await {
            return Ok(HandshakeOutcome::Unresponsive);
        }
        Ok(HandshakeOutcome::Ready)
    }
}

/// Runs `op` under `budget`, collapsing both an elapsed timeout and an
/// underlying I/O error to `false` — either one means this attempt failed
/// and the caller should retry or give up, not trust a partially-filled
/// buffer.
async fn bounded<F>(budget: std::time::Duration, op: F) -> bool
where
    F: std::future::Future<Output = std::io::Result<()>>,
{
    matches!(timeout(budget, op).await, Ok(Ok(())))
}

/// First SOCKS5 step (spec.md §4.4), retried up to
/// [`MAX_SOCKS5_FIRST_HANDSHAKE_RETRIES`] times before giving up.
async fn greet(stream: &mut TcpStream) -> bool {
    let greeting = socks5::greeting();
    for _ in 0..=MAX_SOCKS5_FIRST_HANDSHAKE_RETRIES {
        if !bounded(SOCKS5_GREETING_TIMEOUT, stream.write_all(&greeting)).await {
            continue;
        }
        let mut reply = [0u8; 2];
        if !bounded(SOCKS5_GREETING_TIMEOUT, stream.read_exact(&mut reply)).await {
            continue;
        }
        if socks5::parse_greeting_reply(&reply).is_ok() {
            return true;
        }
    }
    false
}

/// Second SOCKS5 step (spec.md §4.4), retried up to
/// [`MAX_SOCKS5_SECOND_HANDSHAKE_RETRIES`] times before giving up.
async fn connect(stream: &mut TcpStream, target_host: &str, target_port: u16) -> bool {
    let Ok(connect_req) = socks5::connect_request(target_host, target_port) else {
        return false;
    };
    for _ in 0..=MAX_SOCKS5_SECOND_HANDSHAKE_RETRIES {
        if !bounded(SOCKS5_CONNECT_TIMEOUT, stream.write_all(&connect_req)).await {
            continue;
        }
        // Minimal reply: version+reply+reserved+atyp+IPv4(4)+port(2). A
        // domain or IPv6 bound-address reply would need a longer read, but
        // we never inspect the bound address so this fixed size is enough
        // for the vendors this crawler actually talks to.
        let mut reply = [0u8; 10];
        if !bounded(SOCKS5_CONNECT_TIMEOUT, stream.read_exact(&mut reply)).await {
            continue;
        }
        if socks5::parse_connect_reply(&reply).is_ok() {
            return true;
        }
    }
    false
}
