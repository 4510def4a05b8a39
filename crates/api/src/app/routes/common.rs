use axum::http::HeaderMap;

use crate::app::errors::ApiError;

pub const SELLER_HEADER: &str = "x-seller-id";
pub const USER_HEADER: &str = "x-user-id";

/// Non-blank value of a required identity header.
pub fn required_header(headers: &HeaderMap, name: &str) -> Result<String, ApiError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::bad_request(format!("missing {name} header")))
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn blank_headers_count_as_missing() {
        let mut headers = HeaderMap::new();
        assert!(required_header(&headers, SELLER_HEADER).is_err());
        headers.insert(SELLER_HEADER, HeaderValue::from_static("  "));
        assert!(required_header(&headers, SELLER_HEADER).is_err());
        headers.insert(SELLER_HEADER, HeaderValue::from_static(" seller-1 "));
        assert_eq!(required_header(&headers, SELLER_HEADER).unwrap(), "seller-1");
    }
}
