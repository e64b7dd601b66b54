//! Reads a full HTTP/1.1 response (status line, headers and body) off an
//! async stream, enforcing size and idle-time limits the way the rest of
//! the crawler does.

use bytes::{Buf, BytesMut};
use tokio::io::AsyncReadExt;
use tokio::time::{Duration, timeout};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ResponseError {
    #[error("timed out waiting for response headers")]
    HeaderTimeout,
    #[error("timed out waiting for response body")]
    BodyTimeout,
    #[error("connection closed before headers were complete")]
    ClosedDuringHeaders,
    #[error("connection closed before the declared body was read")]
    ClosedDuringBody,
    #[error("response headers exceeded the configured limit")]
    HeadersTooLarge,
    #[error("response body exceeded the configured limit")]
    BodyTooLarge,
    #[error("malformed response headers")]
    MalformedHeaders,
    #[error("malformed chunked transfer encoding")]
    MalformedChunk,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A fully-buffered HTTP response. Site adapters work against `body` as a
/// string (`response.body_str()`) most of the time.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn body_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Read one full response from `stream`, reusing bytes already sitting in
/// `buf` from a previous read. `idle_timeout` bounds the wait for the very
/// first byte; `read_timeout` bounds every read after that.
pub async fn read_response<S>(
    stream: &mut S,
    buf: &mut BytesMut,
    idle_timeout: Duration,
    read_timeout: Duration,
    max_headers: usize,
    max_body: usize,
) -> Result<Response, ResponseError>
where
    S: tokio::io::AsyncRead + Unpin,
{
    let headers_end = read_headers(stream, buf, idle_timeout, read_timeout, max_headers).await?;
    let header_bytes = buf.split_to(headers_end + 4);

    let mut header_storage = [httparse::EMPTY_HEADER; 64];
    let mut parsed = httparse::Response::new(&mut header_storage);
    let parse_result = parsed
        .parse(&header_bytes)
        .map_err(|_| ResponseError::MalformedHeaders)?;
    if parse_result.is_partial() {
        return Err(ResponseError::MalformedHeaders);
    }

    let status = parsed.code.ok_or(ResponseError::MalformedHeaders)?;
    let mut headers = Vec::with_capacity(parsed.headers.len());
    let mut content_length: Option<usize> = None;
    let mut is_chunked = false;

    for header in parsed.headers.iter() {
        let name = header.name.to_string();
        let value = String::from_utf8_lossy(header.value).to_string();
        match name.to_ascii_lowercase().as_str() {
            "content-length" => {
                content_length = value.trim().parse::<usize>().ok();
            }
            "transfer-encoding" => {
                if value.to_ascii_lowercase().contains("chunked") {
                    is_chunked = true;
                }
            }
            _ => {}
        }
        headers.push((name, value));
    }

    debug!(status, is_chunked, content_length = ?content_length, "read response headers");

    let no_body = matches!(status, 100..=199 | 204 | 304);
    let body = if no_body {
        Vec::new()
    } else if is_chunked {
        read_chunked_body(stream, buf, read_timeout, max_body).await?
    } else if let Some(len) = content_length {
        if max_body > 0 && len > max_body {
            return Err(ResponseError::BodyTooLarge);
        }
        read_content_length_body(stream, buf, len, read_timeout).await?
    } else {
        read_until_eof(stream, buf, read_timeout, max_body).await?
    };

    Ok(Response {
        status,
        headers,
        body,
    })
}

async fn read_headers<S>(
    stream: &mut S,
    buf: &mut BytesMut,
    idle_timeout: Duration,
    read_timeout: Duration,
    max_headers: usize,
) -> Result<usize, ResponseError>
where
    S: tokio::io::AsyncRead + Unpin,
{
    loop {
        if let Some(pos) = find_headers_end(buf) {
            return Ok(pos);
        }
        if max_headers > 0 && buf.len() > max_headers {
            return Err(ResponseError::HeadersTooLarge);
        }
        let wait = if buf.is_empty() {
            idle_timeout
        } else {
            read_timeout
        };
        let n = read_more(stream, buf, wait, ResponseError::HeaderTimeout).await?;
        if n == 0 {
            return Err(ResponseError::ClosedDuringHeaders);
        }
    }
}

async fn read_more<S>(
    stream: &mut S,
    buf: &mut BytesMut,
    wait: Duration,
    on_timeout: ResponseError,
) -> Result<usize, ResponseError>
where
    S: tokio::io::AsyncRead + Unpin,
{
    let mut tmp = [0u8; 8192];
    let n = match timeout(wait, stream.read(&mut tmp)).await {
        Ok(res) => res?,
        Err(_) => return Err(on_timeout),
    };
    if n > 0 {
        buf.extend_from_slice(&tmp[..n]);
    }
    Ok(n)
}

fn find_headers_end(buf: &BytesMut) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

async fn read_content_length_body<S>(
    stream: &mut S,
    buf: &mut BytesMut,
    mut remaining: usize,
    read_timeout: Duration,
) -> Result<Vec<u8>, ResponseError>
where
    S: tokio::io::AsyncRead + Unpin,
{
    let mut body = Vec::with_capacity(remaining);
    while remaining > 0 {
        if buf.is_empty() {
            let n = read_more(stream, buf, read_timeout, ResponseError::BodyTimeout).await?;
            if n == 0 {
                return Err(ResponseError::ClosedDuringBody);
            }
        }
        let take = remaining.min(buf.len());
        body.extend_from_slice(&buf[..take]);
        buf.advance(take);
        remaining -= take;
    }
    Ok(body)
}

async fn read_until_eof<S>(
    stream: &mut S,
    buf: &mut BytesMut,
    read_timeout: Duration,
    max_body: usize,
) -> Result<Vec<u8>, ResponseError>
where
    S: tokio::io::AsyncRead + Unpin,
{
    let mut body = Vec::new();
    if !buf.is_empty() {
        body.extend_from_slice(buf);
        buf.advance(buf.len());
    }
    loop {
        if max_body > 0 && body.len() > max_body {
            return Err(ResponseError::BodyTooLarge);
        }
        let n = read_more(stream, buf, read_timeout, ResponseError::BodyTimeout).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(buf);
        buf.advance(buf.len());
    }
    Ok(body)
}

async fn read_chunked_body<S>(
    stream: &mut S,
    buf: &mut BytesMut,
    read_timeout: Duration,
    max_body: usize,
) -> Result<Vec<u8>, ResponseError>
where
    S: tokio::io::AsyncRead + Unpin,
{
    let mut body = Vec::new();
    loop {
        let line = read_line(stream, buf, read_timeout).await?;
        let line_str = std::str::from_utf8(&line).map_err(|_| ResponseError::MalformedChunk)?;
        let size_str = line_str
            .trim_end_matches("\r\n")
            .split(';')
            .next()
            .unwrap_or("")
            .trim();
        let chunk_size = usize::from_str_radix(size_str, 16)
            .map_err(|_| ResponseError::MalformedChunk)?;

        if chunk_size == 0 {
            loop {
                let trailer = read_line(stream, buf, read_timeout).await?;
                if trailer == b"\r\n" {
                    return Ok(body);
                }
            }
        }

        if max_body > 0 && body.len() + chunk_size > max_body {
            return Err(ResponseError::BodyTooLarge);
        }

        let chunk = read_exact_from_buf(stream, buf, read_timeout, chunk_size).await?;
        body.extend_from_slice(&chunk);
        // trailing CRLF after chunk data
        read_exact_from_buf(stream, buf, read_timeout, 2).await?;
    }
}

async fn read_line<S>(
    stream: &mut S,
    buf: &mut BytesMut,
    read_timeout: Duration,
) -> Result<Vec<u8>, ResponseError>
where
    S: tokio::io::AsyncRead + Unpin,
{
    loop {
        if let Some(pos) = buf.windows(2).position(|w| w == b"\r\n") {
            let line = buf.split_to(pos + 2);
            return Ok(line.to_vec());
        }
        let n = read_more(stream, buf, read_timeout, ResponseError::BodyTimeout).await?;
        if n == 0 {
            return Err(ResponseError::ClosedDuringBody);
        }
    }
}

async fn read_exact_from_buf<S>(
    stream: &mut S,
    buf: &mut BytesMut,
    read_timeout: Duration,
    mut remaining: usize,
) -> Result<Vec<u8>, ResponseError>
where
    S: tokio::io::AsyncRead + Unpin,
{
    let mut out = Vec::with_capacity(remaining);
    while remaining > 0 {
        if buf.is_empty() {
            let n = read_more(stream, buf, read_timeout, ResponseError::BodyTimeout).await?;
            if n == 0 {
                return Err(ResponseError::ClosedDuringBody);
            }
        }
        let take = remaining.min(buf.len());
        out.extend_from_slice(&buf[..take]);
        buf.advance(take);
        remaining -= take;
    }
    Ok(out)
}
