//! Grounded in `original_source/server3/jjgames_socket.hpp`: a JSONP GET
//! against JJ Games' registration check, classified on a `REV`/`MSG` pair
//! whose "already registered" / "blocked" phrases are URL-encoded Chinese
//! text. Per spec.md §4.3, this adapter voluntarily rotates proxies after
//! 20 successful classifications rather than waiting for a failure.

use rand::Rng;
use wudi_http::{Request, Response};

use crate::adapter::{AdapterState, Classification, SiteAdapter, SiteOutcome, is_redirect_ban};
use crate::phrases::body_contains_any;
use wudi_proxy::ProxyProperty;

pub struct JjGamesAdapter;

const HOSTNAME: &str = "a4.srv.jj.cn";
const PER_PROXY_QUOTA: u32 = 20;

const ALREADY_REGISTERED: &str =
    "%E8%AF%A5%E6%89%8B%E6%9C%BA%E5%8F%B7%E5%B7%B2%E6%B3%A8%E5%86%8C%EF%BC%8C%E8%AF%B7%E6%9B%B4%E6%8D%A2";
const BLOCKED_1: &str = "%E6%93%8D%E4%BD%9C%E5%BC%82%E5%B8%B8%EF%BC%8C%E8%AF%B7%E7%A8%8D%E5%90%8E%E9%87%8D%E8%AF%95";
const BLOCKED_2: &str = "%E8%AE%BF%E9%97%AE%E5%BC%82%E5%B8%B8%EF%BC%8C%E8%AF%B7%E7%A8%8D%E5%90%8E%E5%86%8D%E8%AF%95";
const BLOCKED_3: &str = "%E7%99%BB%E5%BD%95%E5%90%8D%E9%9D%9E%E6%B3%95";

fn jsonp_callback_suffix() -> (u64, u64) {
    let current_time_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    let jitter: u64 = rand::thread_rng().gen_range(0..1000);
    (current_time_ms, current_time_ms + jitter)
}

impl SiteAdapter for JjGamesAdapter {
    fn site_id(&self) -> u32 {
        3
    }

    fn hostname(&self) -> &str {
        HOSTNAME
    }

    fn per_proxy_quota(&self) -> Option<u32> {
        Some(PER_PROXY_QUOTA)
    }

    fn prepare_request(&self, number: &str, _state: &mut AdapterState, proxy_auth: Option<(&str, &str)>) -> Request {
        let (current_time, callback_number) = jsonp_callback_suffix();
        let target = format!(
            "/reg/check_loginname.php?regtype=2&t={current_time}&n=1&loginname={number}&callback=JSONP_{callback_number}"
        );
        let mut request = Request::get(target)
            .header("Connection", "keep-alive")
            .header("Host", HOSTNAME)
            .header("User-Agent", utils::agents::random_user_agent())
            .header("sec-fetch-dest", "script")
            .header("Accept", "*/*")
            .header("Referer", "https://www.jj.cn/reg/reg.html?type=phone")
            .header("sec-fetch-site", "same-site")
            .header("sec-fetch-mode", "no-cors")
            .header("Accept-Language", "en-US,en;q=0.5")
            .header("Cache-Control", "no-cache");
        if let Some((user, pass)) = proxy_auth {
            request = request.header("Proxy-Authorization", utils::auth::basic_auth_header(user, pass));
        }
        request
    }

    fn classify(&self, status: u16, response: &Response, state: &mut AdapterState) -> SiteOutcome {
        if status == 407 {
            return SiteOutcome::NeedsAuth;
        }
        if is_redirect_ban(status) {
            return SiteOutcome::Rotate { mark: Some(ProxyProperty::Blocked) };
        }

        let body = response.body_str();
        let start = body.find('{');
        let end = body.rfind('}');
        let (Some(start), Some(end)) = (start, end) else {
            return SiteOutcome::Rotate { mark: None };
        };
        if end < start {
            return SiteOutcome::Rotate { mark: None };
        }
        let Ok(document) = serde_json::from_str::<serde_json::Value>(&body[start..=end]) else {
            return SiteOutcome::Rotate { mark: None };
        };

        let registered_ok = document.get("REV").and_then(|v| v.as_bool());
        let outcome = match registered_ok {
            Some(true) => SiteOutcome::Classified(Classification::NotRegistered),
            Some(false) => {
                let message = document.get("MSG").and_then(|v| v.as_str()).unwrap_or("");
                if body_contains_any(message, &[ALREADY_REGISTERED]) {
                    SiteOutcome::Classified(Classification::Registered)
                } else if body_contains_any(message, &[BLOCKED_1, BLOCKED_2, BLOCKED_3]) {
                    SiteOutcome::Rotate { mark: Some(ProxyProperty::Blocked) }
                } else {
                    SiteOutcome::Rotate { mark: None }
                }
            }
            None => SiteOutcome::Rotate { mark: None },
        };

        if matches!(outcome, SiteOutcome::Classified(_)) {
            state.success_count += 1;
        }
        outcome
    }
}
