//! Grounded in `original_source/server-3.1/src/https/auto_home_socks5_sock.cpp`:
//! a two-step session against AutoHome's password-recovery flow. A GET
//! fetches a session cookie (`rsessionid=...`); up to 300 POSTs reuse it.
//! Per spec.md §9(c), "session expired" detection takes priority over the
//! not-registered phrase because the two substrings overlap.

use wudi_http::{Request, Response};

use crate::adapter::{AdapterState, Classification, SiteAdapter, SiteOutcome, is_redirect_ban};
use crate::phrases::body_contains_any;
use wudi_proxy::ProxyProperty;

pub struct AutoHomeAdapter;

const HOSTNAME: &str = "account.autohome.com.cn";
const MAX_SESSION_REUSE: u32 = 300;
const MAX_COOKIE_FAILURES: u32 = 5;

const NOT_FOUND: &str = "\"returncode\":2010203,\"message\":\"该用户名不存在\"";
const FOUND: &str = "\"returncode\":0";
const SESSION_EXPIRED: &str = "\"returncode\":2010203,\"message\":\"停留时长异常";

impl SiteAdapter for AutoHomeAdapter {
    fn site_id(&self) -> u32 {
        2
    }

    fn hostname(&self) -> &str {
        HOSTNAME
    }

    fn is_tls(&self) -> bool {
        true
    }

    fn prepare_request(&self, number: &str, state: &mut AdapterState, proxy_auth: Option<(&str, &str)>) -> Request {
        let mut request = if let Some(cookie) = state.session_cookie.clone() {
            state.awaiting_cookie = false;
            Request::post("/password/checkusername")
                .header(
                    "Referer",
                    "https://account.autohome.com.cn/password/find?backurl=https%253A%252F%252Fwww.autohome.com.cn%252Fbeijing%252F",
                )
                .header("Content-Type", "application/x-www-form-urlencoded; charset=UTF-8")
                .header("Cookie", cookie)
                .body(format!("username={number}&usertype=2&").into_bytes())
        } else {
            state.awaiting_cookie = true;
            Request::get("/password/find")
        };
        request = request
            .header("Connection", "keep-alive")
            .header("Host", HOSTNAME)
            .header("Accept", "*/*")
            .header("User-Agent", utils::agents::random_user_agent());
        if let Some((user, pass)) = proxy_auth {
            request = request.header("Proxy-Authorization", utils::auth::basic_auth_header(user, pass));
        }
        request
    }

    fn classify(&self, status: u16, response: &Response, state: &mut AdapterState) -> SiteOutcome {
        if is_redirect_ban(status) {
            return SiteOutcome::Rotate { mark: Some(ProxyProperty::Blocked) };
        }
        if status == 400 {
            return SiteOutcome::Rotate { mark: None };
        }
        if status == 407 {
            return SiteOutcome::NeedsAuth;
        }

        if state.awaiting_cookie {
            return self.process_get_response(response, state);
        }
        self.process_post_response(response, state)
    }
}

impl AutoHomeAdapter {
    fn process_get_response(&self, response: &Response, state: &mut AdapterState) -> SiteOutcome {
        let Some(set_cookie) = response.header("Set-Cookie") else {
            return self.reject_cookie(state);
        };
        let Some(idx) = set_cookie.find("rsessionid=") else {
            return self.reject_cookie(state);
        };
        let end = set_cookie[idx..].find(';').map(|p| idx + p).unwrap_or(set_cookie.len());
        state.session_cookie = Some(set_cookie[idx..end].to_string());
        state.cookie_failures = 0;
        SiteOutcome::Rotate { mark: None }
    }

    fn reject_cookie(&self, state: &mut AdapterState) -> SiteOutcome {
        state.session_cookie = None;
        state.cookie_failures += 1;
        if state.cookie_failures >= MAX_COOKIE_FAILURES {
            state.cookie_failures = 0;
            return SiteOutcome::Rotate { mark: Some(ProxyProperty::Blocked) };
        }
        SiteOutcome::Rotate { mark: None }
    }

    fn process_post_response(&self, response: &Response, state: &mut AdapterState) -> SiteOutcome {
        let body = response.body_str();
        // Session-expired detection must be checked first: its substring
        // overlaps with the not-registered phrase (spec.md §9(c)).
        if body_contains_any(&body, &[SESSION_EXPIRED]) {
            state.session_cookie = None;
            state.session_used_count = 0;
            return SiteOutcome::Rotate { mark: None };
        }

        let classification = if body_contains_any(&body, &[NOT_FOUND]) {
            Classification::NotRegistered
        } else if body_contains_any(&body, &[FOUND]) {
            Classification::Registered
        } else {
            Classification::Unknown
        };

        state.session_used_count += 1;
        if state.session_used_count >= MAX_SESSION_REUSE {
            state.session_cookie = None;
            state.session_used_count = 0;
        }
        SiteOutcome::Classified(classification)
    }
}
