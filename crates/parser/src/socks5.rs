//! Wire encoding/decoding for the SOCKS5 handshake a proxy connection needs
//! before the actual HTTP request can be sent through it. Only the pieces
//! the crawler uses are implemented: no-auth negotiation and a CONNECT
//! request against a domain name (never an IP literal).

const VERSION: u8 = 0x05;
const NO_AUTH: u8 = 0x00;
const CMD_CONNECT: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const RESERVED: u8 = 0x00;

/// Bytes for the method-negotiation request: version 5, one method, no auth.
pub fn greeting() -> [u8; 3] {
    [VERSION, 0x01, NO_AUTH]
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("short socks5 reply")]
    ShortReply,
    #[error("unsupported socks5 version {0:#x}")]
    UnsupportedVersion(u8),
    #[error("proxy requires authentication we do not support")]
    AuthRequired,
    #[error("proxy rejected connect request (reply code {0:#x})")]
    ConnectRejected(u8),
    #[error("hostname too long for socks5 domain address ({0} bytes)")]
    HostnameTooLong(usize),
}

/// Validate the server's reply to [`greeting`]. `reply` must hold at least
/// the two bytes the server sends back.
pub fn parse_greeting_reply(reply: &[u8]) -> Result<(), HandshakeError> {
    if reply.len() < 2 {
        return Err(HandshakeError::ShortReply);
    }
    if reply[0] != VERSION {
        return Err(HandshakeError::UnsupportedVersion(reply[0]));
    }
    if reply[1] != NO_AUTH {
        return Err(HandshakeError::AuthRequired);
    }
    Ok(())
}

/// Build a CONNECT request for `host:port`, addressed by domain name.
pub fn connect_request(host: &str, port: u16) -> Result<Vec<u8>, HandshakeError> {
    if host.len() > u8::MAX as usize {
        return Err(HandshakeError::HostnameTooLong(host.len()));
    }
    let mut buf = Vec::with_capacity(7 + host.len());
    buf.push(VERSION);
    buf.push(CMD_CONNECT);
    buf.push(RESERVED);
    buf.push(ATYP_DOMAIN);
    buf.push(host.len() as u8);
    buf.extend_from_slice(host.as_bytes());
    buf.extend_from_slice(&port.to_be_bytes());
    Ok(buf)
}

/// Validate the server's reply to a [`connect_request`]. Only the second
/// byte (the reply code) matters to us; we never inspect the bound address.
/// `0x01` ("general SOCKS server failure") is the only code treated as
/// rejection — any other value counts as success, matching
/// `socks5_http_socket_base.hpp`'s `p1[1] == 0x01` check.
pub fn parse_connect_reply(reply: &[u8]) -> Result<(), HandshakeError> {
    if reply.len() < 2 {
        return Err(HandshakeError::ShortReply);
    }
    if reply[1] == 0x01 {
        return Err(HandshakeError::ConnectRejected(reply[1]));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_is_version_five_no_auth() {
        assert_eq!(greeting(), [0x05, 0x01, 0x00]);
    }

    #[test]
    fn parse_greeting_reply_accepts_no_auth() {
        assert!(parse_greeting_reply(&[0x05, 0x00]).is_ok());
    }

    #[test]
    fn parse_greeting_reply_rejects_auth_required() {
        assert_eq!(
            parse_greeting_reply(&[0x05, 0x02]),
            Err(HandshakeError::AuthRequired)
        );
    }

    #[test]
    fn parse_greeting_reply_rejects_short_buffer() {
        assert_eq!(parse_greeting_reply(&[0x05]), Err(HandshakeError::ShortReply));
    }

    #[test]
    fn connect_request_encodes_domain_and_port() {
        let req = connect_request("example.com", 80).unwrap();
        assert_eq!(req[0], 0x05);
        assert_eq!(req[1], 0x01);
        assert_eq!(req[2], 0x00);
        assert_eq!(req[3], 0x03);
        assert_eq!(req[4], 11);
        assert_eq!(&req[5..16], b"example.com");
        assert_eq!(&req[16..18], &80u16.to_be_bytes());
    }

    #[test]
    fn connect_request_rejects_oversized_hostname() {
        let host = "a".repeat(256);
        assert!(matches!(
            connect_request(&host, 80),
            Err(HandshakeError::HostnameTooLong(256))
        ));
    }

    #[test]
    fn parse_connect_reply_rejects_general_failure_code() {
        assert_eq!(
            parse_connect_reply(&[0x05, 0x01, 0x00, 0x01]),
            Err(HandshakeError::ConnectRejected(0x01))
        );
    }

    #[test]
    fn parse_connect_reply_accepts_nonstandard_nonzero_success_code() {
        // Only 0x01 counts as failure; some proxies reply with other
        // nonstandard-but-successful codes that must still be accepted.
        assert!(parse_connect_reply(&[0x05, 0x04, 0x00, 0x01]).is_ok());
    }
}
