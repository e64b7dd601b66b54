//! Grounded in `original_source/server-3.1/src/qunar_socket.cpp`: a POST
//! against Qunar's validator endpoint. Distinctive among the shipped
//! adapters in two ways: a 400 status is a terminal `RequestStop` rather
//! than a proxy rotation, and the rate-limit error code `21017` promotes
//! the proxy to `ToldToWait` (with a fresh timestamp) instead of `Blocked`.

use parser::json::field_as_i64;
use wudi_http::{Request, Response};

use crate::adapter::{AdapterState, Classification, SiteAdapter, SiteOutcome, is_redirect_ban};
use wudi_proxy::ProxyProperty;

pub struct QunarAdapter;

const HOSTNAME: &str = "user.qunar.com";
const RATE_LIMITED: i64 = 21017;
const NOT_REGISTERED: i64 = 21006;
const REGISTERED: i64 = 11009;

impl SiteAdapter for QunarAdapter {
    fn site_id(&self) -> u32 {
        4
    }

    fn hostname(&self) -> &str {
        HOSTNAME
    }

    fn prepare_request(&self, number: &str, _state: &mut AdapterState, proxy_auth: Option<(&str, &str)>) -> Request {
        let mut request = Request::post("/ajax/validator.jsp")
            .header("Connection", "keep-alive")
            .header("Host", HOSTNAME)
            .header("Cache-Control", "no-cache")
            .header("User-Agent", utils::agents::random_user_agent())
            .header("Accept", "application/json, text/javascript, */*; q=0.01")
            .header(
                "Referer",
                "https://user.qunar.com/passport/register.jsp?ret=https%3A%2F%2Fwww.qunar.com%2F%3Fex_track%3Dauto_4e0d874a",
            )
            .header("X-Requested-With", "XMLHttpRequest")
            .header("Content-Type", "application/x-www-form-urlencoded; charset=UTF-8")
            .body(format!("method={number}&prenum=86&vcode=null").into_bytes());
        if let Some((user, pass)) = proxy_auth {
            request = request.header("Proxy-Authorization", utils::auth::basic_auth_header(user, pass));
        }
        request
    }

    fn classify(&self, status: u16, response: &Response, _state: &mut AdapterState) -> SiteOutcome {
        if is_redirect_ban(status) {
            return SiteOutcome::Rotate { mark: Some(ProxyProperty::Blocked) };
        }
        if status == 400 {
            return SiteOutcome::Classified(Classification::RequestStop);
        }
        if status == 407 {
            return SiteOutcome::NeedsAuth;
        }

        let body = response.body_str();
        let Ok(document) = serde_json::from_str::<serde_json::Value>(&body) else {
            return SiteOutcome::Classified(Classification::Unknown);
        };
        let Some(error_code) = field_as_i64(&document, "errCode") else {
            return SiteOutcome::Classified(Classification::Unknown);
        };

        match error_code {
            RATE_LIMITED => SiteOutcome::Rotate { mark: Some(ProxyProperty::ToldToWait) },
            NOT_REGISTERED => SiteOutcome::Classified(Classification::NotRegistered),
            REGISTERED => SiteOutcome::Classified(Classification::Registered),
            _ => SiteOutcome::Classified(Classification::Unknown),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(body: &str) -> Response {
        Response { status: 200, headers: Vec::new(), body: body.as_bytes().to_vec() }
    }

    #[test]
    fn rate_limit_code_marks_proxy_told_to_wait() {
        let body = r#"{"errCode":21017}"#;
        let outcome = QunarAdapter.classify(200, &response(body), &mut AdapterState::default());
        assert_eq!(outcome, SiteOutcome::Rotate { mark: Some(ProxyProperty::ToldToWait) });
    }

    #[test]
    fn not_registered_code() {
        let body = r#"{"errCode":21006}"#;
        let outcome = QunarAdapter.classify(200, &response(body), &mut AdapterState::default());
        assert_eq!(outcome, SiteOutcome::Classified(Classification::NotRegistered));
    }

    #[test]
    fn registered_code() {
        let body = r#"{"errCode":11009}"#;
        let outcome = QunarAdapter.classify(200, &response(body), &mut AdapterState::default());
        assert_eq!(outcome, SiteOutcome::Classified(Classification::Registered));
    }

    #[test]
    fn status_400_is_terminal_request_stop() {
        let outcome = QunarAdapter.classify(400, &response(""), &mut AdapterState::default());
        assert_eq!(outcome, SiteOutcome::Classified(Classification::RequestStop));
    }
}
