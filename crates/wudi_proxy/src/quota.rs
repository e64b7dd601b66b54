//! The proxy vendor's quota endpoint, queried before a bulk refresh. Mirrors
//! the tolerant field parsing the vendor's API demands: the same field shows
//! up as a JSON integer in one response and a numeric string in the next.

use parser::json::{extract_last_json_object, field_as_bool, field_as_i64};

use crate::error::ProxyRepositoryError;
use crate::vendor::vendor_get;

/// Remaining extraction allowance reported by the vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtractionQuota {
    pub expires_at: i64,
    pub connect_remaining: i64,
    pub extract_remaining: i64,
    pub product_remaining: i64,
    pub available: bool,
}

impl ExtractionQuota {
    /// A refresh is refused once the vendor says the account is unavailable
    /// or extraction has been exhausted.
    pub fn allows_refresh(&self) -> bool {
        self.available && self.extract_remaining > 0
    }
}

/// GET the vendor's `count_target` endpoint and parse the last entry of its
/// `data` array into an [`ExtractionQuota`]. Any non-200 status, parse
/// failure, or an empty/unavailable trailing entry is surfaced to the
/// caller so `get_more_proxies` can decide whether to abandon the refresh.
pub async fn fetch_quota(count_target: &str, user_agent: &str) -> Result<ExtractionQuota, ProxyRepositoryError> {
    let (status, body) = vendor_get(count_target, user_agent).await?;
    if status != 200 {
        return Err(ProxyRepositoryError::MalformedResponse(format!(
            "quota endpoint returned status {status}"
        )));
    }

    let value = extract_last_json_object(&body)
        .ok_or_else(|| ProxyRepositoryError::MalformedResponse("quota body has no JSON object".into()))?;

    let code = field_as_i64(&value, "code").unwrap_or(0);
    if code != 200 {
        return Err(ProxyRepositoryError::MalformedResponse(format!(
            "quota endpoint returned code {code}"
        )));
    }

    let data = value
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| ProxyRepositoryError::MalformedResponse("quota body has no data array".into()))?;

    let last = data
        .last()
        .ok_or_else(|| ProxyRepositoryError::MalformedResponse("quota data array is empty".into()))?;

    let available = field_as_bool(last, "is_available").unwrap_or(false);
    let connect_remaining = field_as_i64(last, "remain_connect").unwrap_or(0);
    let extract_remaining = field_as_i64(last, "remain_extract").unwrap_or(0);
    let product_remaining = field_as_i64(last, "remain").unwrap_or(0);

    Ok(ExtractionQuota {
        expires_at: 0,
        connect_remaining,
        extract_remaining,
        product_remaining,
        available,
    })
}
