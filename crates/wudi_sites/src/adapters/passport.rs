//! Grounded in `original_source/server2/pp_sports.hpp`: a JSONP GET against
//! PPTV's passport API, classified on an `errorCode`/`status` pair in a
//! body that is sometimes wrapped in extra prose around the JSON object.

use parser::json::{extract_last_json_object, field_as_str};
use serde_json::Value;
use wudi_http::{Request, Response};

use crate::adapter::{AdapterState, Classification, SiteAdapter, SiteOutcome, is_redirect_ban};
use wudi_proxy::ProxyProperty;

pub struct PassportAdapter;

const HOSTNAME: &str = "api.passport.pptv.com";

impl SiteAdapter for PassportAdapter {
    fn site_id(&self) -> u32 {
        1
    }

    fn hostname(&self) -> &str {
        HOSTNAME
    }

    fn prepare_request(&self, number: &str, _state: &mut AdapterState, proxy_auth: Option<(&str, &str)>) -> Request {
        let target = format!(
            "http://{HOSTNAME}/checkLogin?cb=checklogin&loginid={number}&sceneFlag=1&channel=208000103001&format=jsonp"
        );
        let mut request = Request::get(target)
            .header("Host", format!("{HOSTNAME}:80"))
            .header("Cache-Control", "no-cache")
            .header("User-Agent", utils::agents::random_user_agent())
            .header("Accept", "*/*")
            .header("Content-Type", "application/x-www-form-urlencoded; charset=UTF-8")
            .header("Connection", "keep-alive");
        if let Some((user, pass)) = proxy_auth {
            request = request.header("Proxy-Authorization", utils::auth::basic_auth_header(user, pass));
        }
        request
    }

    fn classify(&self, status: u16, response: &Response, _state: &mut AdapterState) -> SiteOutcome {
        if status == 407 {
            return SiteOutcome::NeedsAuth;
        }
        if is_redirect_ban(status) {
            return SiteOutcome::Rotate { mark: Some(ProxyProperty::Blocked) };
        }

        let body = response.body_str();
        let parsed: Option<Value> = serde_json::from_str(&body).ok().or_else(|| extract_last_json_object(&body));
        let Some(document) = parsed else {
            return SiteOutcome::Classified(Classification::Unknown);
        };

        let Some(error_code) = field_as_str(&document, "errorCode") else {
            return SiteOutcome::Classified(Classification::Unknown);
        };

        let classification = match error_code {
            "0" => match field_as_str(&document, "status") {
                Some("1") => Classification::Registered,
                Some(_) => Classification::Registered2,
                None => Classification::Registered,
            },
            "5" => Classification::NotRegistered,
            _ => Classification::Unknown,
        };
        SiteOutcome::Classified(classification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wudi_http::Response;

    fn response(status: u16, body: &str) -> Response {
        Response { status, headers: Vec::new(), body: body.as_bytes().to_vec() }
    }

    #[test]
    fn registered_when_error_code_zero_and_status_one() {
        let body = r#"{"errorCode":"0","status":"1"}"#;
        let outcome = PassportAdapter.classify(200, &response(200, body), &mut AdapterState::default());
        assert_eq!(outcome, SiteOutcome::Classified(Classification::Registered));
    }

    #[test]
    fn registered2_when_error_code_zero_and_other_status() {
        let body = r#"{"errorCode":"0","status":"2"}"#;
        let outcome = PassportAdapter.classify(200, &response(200, body), &mut AdapterState::default());
        assert_eq!(outcome, SiteOutcome::Classified(Classification::Registered2));
    }

    #[test]
    fn not_registered_when_error_code_five() {
        let body = r#"{"errorCode":"5"}"#;
        let outcome = PassportAdapter.classify(200, &response(200, body), &mut AdapterState::default());
        assert_eq!(outcome, SiteOutcome::Classified(Classification::NotRegistered));
    }

    #[test]
    fn unknown_on_unparseable_body() {
        let outcome = PassportAdapter.classify(200, &response(200, "not json at all"), &mut AdapterState::default());
        assert_eq!(outcome, SiteOutcome::Classified(Classification::Unknown));
    }

    #[test]
    fn tolerates_json_wrapped_in_prose() {
        let body = r#"checklogin({"errorCode":"5"})"#;
        let outcome = PassportAdapter.classify(200, &response(200, body), &mut AdapterState::default());
        assert_eq!(outcome, SiteOutcome::Classified(Classification::NotRegistered));
    }

    #[test]
    fn needs_auth_on_407() {
        let outcome = PassportAdapter.classify(407, &response(407, ""), &mut AdapterState::default());
        assert_eq!(outcome, SiteOutcome::NeedsAuth);
    }

    #[test]
    fn redirect_marks_proxy_blocked() {
        let outcome = PassportAdapter.classify(302, &response(302, ""), &mut AdapterState::default());
        assert_eq!(outcome, SiteOutcome::Rotate { mark: Some(ProxyProperty::Blocked) });
    }
}
