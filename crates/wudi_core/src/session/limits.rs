//! Timeouts and retry budgets from spec.md §4.4, matching
//! `utilities::TimeoutMilliseconds` / `utilities::MaxRetries` in
//! `original_source/`.

use std::time::Duration;

pub const TCP_CONNECT_TIMEOUT: Duration = Duration::from_millis(3_000);
pub const SOCKS5_GREETING_TIMEOUT: Duration = Duration::from_millis(5_000);
pub const SOCKS5_CONNECT_TIMEOUT: Duration = Duration::from_millis(10_000);
pub const SEND_TIMEOUT_MIN: Duration = Duration::from_millis(3_000);
pub const SEND_TIMEOUT_MAX: Duration = Duration::from_millis(9_000);
pub const RECEIVE_TIMEOUT: Duration = Duration::from_millis(12_000);
pub const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(20_000);

/// Idle sessions (empty number stream) re-poll at this cadence rather than
/// terminating — DESIGN.md ambiguity resolution (a).
pub const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub const MAX_CONNECT_RETRIES: u32 = 2;
pub const MAX_SEND_RETRIES: u32 = 2;
pub const MAX_SOCKS5_FIRST_HANDSHAKE_RETRIES: u32 = 2;
pub const MAX_SOCKS5_SECOND_HANDSHAKE_RETRIES: u32 = 2;

pub const MAX_RESPONSE_HEADER_BYTES: usize = 64 * 1024;
pub const MAX_RESPONSE_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Scales the send timeout across retry attempts within the
/// [`SEND_TIMEOUT_MIN`]..=[`SEND_TIMEOUT_MAX`] range named in spec.md §4.4,
/// rather than using one fixed value for every attempt.
pub fn send_timeout_for_attempt(attempt: u32) -> Duration {
    let span = SEND_TIMEOUT_MAX.as_millis() - SEND_TIMEOUT_MIN.as_millis();
    let step = span / (MAX_SEND_RETRIES as u128 + 1);
    SEND_TIMEOUT_MIN + Duration::from_millis((step * attempt as u128) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_timeout_grows_with_attempt_and_stays_in_range() {
        let first = send_timeout_for_attempt(0);
        let last = send_timeout_for_attempt(MAX_SEND_RETRIES);
        assert_eq!(first, SEND_TIMEOUT_MIN);
        assert!(last <= SEND_TIMEOUT_MAX);
        assert!(last > first);
    }
}
