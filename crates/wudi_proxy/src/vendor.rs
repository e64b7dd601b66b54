//! Talks plain HTTP/1.1 to the proxy vendor's endpoints (quota + extract).
//! These are ordinary internet hosts, never reached through a proxy
//! themselves, so a direct `TcpStream` is all that's needed.

use std::time::Duration;

use bytes::BytesMut;
use tokio::net::TcpStream;
use wudi_http::{Request, read_response};

use crate::error::ProxyRepositoryError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const IDLE_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_HEADERS: usize = 16 * 1024;
const MAX_BODY: usize = 8 * 1024 * 1024;

/// Split a vendor URL (e.g. `http://vendor.example:8080/extract`) into the
/// `host:port` to dial and the path to request.
pub fn split_url(url: &str) -> Result<(String, u16, String), ProxyRepositoryError> {
    let uri: http::Uri = url
        .parse()
        .map_err(|_| ProxyRepositoryError::MalformedResponse(format!("invalid vendor url: {url}")))?;
    let host = uri
        .host()
        .ok_or_else(|| ProxyRepositoryError::MalformedResponse(format!("vendor url has no host: {url}")))?
        .to_string();
    let port = uri.port_u16().unwrap_or(80);
    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/").to_string();
    Ok((host, port, path))
}

/// GET `url` over a fresh plain TCP connection and return the response body
/// as text. Used for both the quota endpoint and the extract endpoint; the
/// vendor speaks plain HTTP even when the target sites being crawled don't.
pub async fn vendor_get(url: &str, user_agent: &str) -> Result<(u16, String), ProxyRepositoryError> {
    let (host, port, path) = split_url(url)?;
    let addr = format!("{host}:{port}");

    let mut stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr))
        .await
        .map_err(|_| ProxyRepositoryError::MalformedResponse(format!("timed out connecting to {addr}")))??;

    let request = Request::get(path)
        .header("Host", &host)
        .header("User-Agent", user_agent)
        .header("Connection", "close")
        .into_bytes();

    tokio::io::AsyncWriteExt::write_all(&mut stream, &request).await?;

    let mut buf = BytesMut::new();
    let response = read_response(
        &mut stream,
        &mut buf,
        IDLE_TIMEOUT,
        READ_TIMEOUT,
        MAX_HEADERS,
        MAX_BODY,
    )
    .await
    .map_err(|e| ProxyRepositoryError::MalformedResponse(e.to_string()))?;

    Ok((response.status, response.body_str().into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_host_port_and_path() {
        let (host, port, path) = split_url("http://vendor.example:8080/extract?x=1").unwrap();
        assert_eq!(host, "vendor.example");
        assert_eq!(port, 8080);
        assert_eq!(path, "/extract?x=1");
    }

    #[test]
    fn defaults_to_port_80_without_explicit_port() {
        let (_, port, _) = split_url("http://vendor.example/count").unwrap();
        assert_eq!(port, 80);
    }

    #[test]
    fn rejects_malformed_url() {
        assert!(split_url("not a url at all \u{0}").is_err());
    }
}
