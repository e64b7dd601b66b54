use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

/// Builds a `Basic` proxy-authorization header value from a username/password
/// pair, the way every site adapter does when a proxy replies 407.
pub fn basic_auth_header(username: &str, password: &str) -> String {
    let raw = format!("{username}:{password}");
    format!("Basic {}", STANDARD.encode(raw))
}
