//! The per-site contract (spec.md §4.3): a request builder plus a response
//! classifier, kept deliberately stateless on `self` so one `Arc<dyn
//! SiteAdapter>` can be shared across every socket session checking that
//! site. Anything a site needs to remember between requests on the same
//! proxy (a session cookie, a per-proxy success counter) lives in
//! [`AdapterState`], owned by the calling socket session instead.

use wudi_http::{Request, Response};
use wudi_proxy::ProxyProperty;

/// Final classification of a number against a site, per spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Registered,
    Registered2,
    NotRegistered,
    Unknown,
    RequestStop,
}

/// What the socket session should do next after `classify` runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteOutcome {
    /// Terminal result for the current number; session returns to `Idle`.
    Classified(Classification),
    /// 407 Proxy Authentication Required: set the auth header and
    /// reconnect on the same proxy, without spending a retry or rotating.
    NeedsAuth,
    /// Rotate to a fresh proxy without emitting a classification,
    /// optionally first promoting the current proxy's liveness property.
    Rotate { mark: Option<ProxyProperty> },
}

/// Per-proxy, per-session scratch state a site adapter may need across
/// requests. Reset whenever the socket session rotates to a new proxy.
#[derive(Debug, Clone, Default)]
pub struct AdapterState {
    /// AutoHome's `rsessionid=...` cookie, set by the initial GET and
    /// reused by subsequent POSTs until it expires or the proxy rotates.
    pub session_cookie: Option<String>,
    /// Whether the in-flight request was the GET that fetches
    /// `session_cookie` (true) or a POST reusing it (false). Adapters that
    /// don't use a two-step session leave this unused.
    pub awaiting_cookie: bool,
    /// How many POSTs have reused `session_cookie` on this proxy, per
    /// spec.md §4.3 AutoHome's "up to 300 POSTs" cap.
    pub session_used_count: u32,
    /// How many times cookie acquisition has failed in a row; 5 strikes
    /// promotes the proxy to `Blocked` per spec.md §4.3.
    pub cookie_failures: u32,
    /// How many successful classifications have landed on the current
    /// proxy; used by adapters with a per-proxy quota (JJGames: 20).
    pub success_count: u32,
}

impl AdapterState {
    /// Called by the socket session right before it dials a fresh proxy.
    pub fn reset_for_new_proxy(&mut self) {
        *self = AdapterState::default();
    }
}

/// Per-target-site request builder and response classifier (spec.md §4.3).
pub trait SiteAdapter: Send + Sync {
    /// Numeric id this adapter is registered under in [`crate::registry`].
    fn site_id(&self) -> u32;

    /// Bare host for the TLS SNI / `Host` header.
    fn hostname(&self) -> &str;

    /// Whether this site is addressed over TLS. Determines both the
    /// transport the socket session upgrades to and the default port.
    fn is_tls(&self) -> bool {
        false
    }

    /// Target port, defaulting from [`Self::is_tls`].
    fn port(&self) -> u16 {
        if self.is_tls() { 443 } else { 80 }
    }

    /// An optional fixed per-proxy scan quota: after this many successful
    /// classifications on one proxy, the session voluntarily rotates
    /// rather than waiting for a failure (spec.md §4.3, JJGames variant).
    fn per_proxy_quota(&self) -> Option<u32> {
        None
    }

    /// Build the next outgoing request for `number`. `proxy_auth` carries
    /// the current proxy's username/password once a 407 response has asked
    /// for them; `None` builds a request with no proxy auth header.
    fn prepare_request(&self, number: &str, state: &mut AdapterState, proxy_auth: Option<(&str, &str)>) -> Request;

    /// Classify a response already read off the wire.
    fn classify(&self, status: u16, response: &Response, state: &mut AdapterState) -> SiteOutcome;
}

/// HTTP redirect codes that always mean "this proxy's IP got banned",
/// shared by every adapter's classify rule (spec.md §4.4 ban detection).
pub const REDIRECT_BAN_CODES: [u16; 9] = [300, 301, 302, 303, 304, 305, 306, 307, 308];

pub fn is_redirect_ban(status: u16) -> bool {
    REDIRECT_BAN_CODES.contains(&status)
}
