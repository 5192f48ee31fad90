//! Header strategies and response validators.

use std::sync::Arc;

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use serde_json::Value;

/// Builds default headers for a call from its path and JSON content.
pub type HeaderStrategy = Arc<dyn Fn(&str, Option<&Value>) -> HeaderMap + Send + Sync>;

/// Decides whether a response status is acceptable.
pub type ResponseValidator = Arc<dyn Fn(StatusCode) -> bool + Send + Sync>;

/// Only a `content-type` header.
pub fn content_type_only(content_type: HeaderValue) -> HeaderStrategy {
    Arc::new(move |_path: &str, _content: Option<&Value>| {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, content_type.clone());
        headers
    })
}

/// The same headers on every call.
pub fn fixed(headers: HeaderMap) -> HeaderStrategy {
    Arc::new(move |_path: &str, _content: Option<&Value>| headers.clone())
}

/// Accept any 2xx status.
pub fn successful() -> ResponseValidator {
    Arc::new(|status: StatusCode| status.is_success())
}

/// Accept exactly the listed codes.
pub fn listed_codes(codes: &[u16]) -> ResponseValidator {
    let codes = codes.to_vec();
    Arc::new(move |status: StatusCode| codes.contains(&status.as_u16()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_strategies() {
        let json = content_type_only(HeaderValue::from_static("application/json"));
        assert_eq!(json("/a", None)[header::CONTENT_TYPE], "application/json");

        let mut preset = HeaderMap::new();
        preset.insert("x-api-key", HeaderValue::from_static("k"));
        let headers = fixed(preset)("/b", Some(&Value::Null));
        assert_eq!(headers["x-api-key"], "k");
        assert!(headers.get(header::CONTENT_TYPE).is_none());
    }

    #[test]
    fn test_validators() {
        assert!(successful()(StatusCode::NO_CONTENT));
        assert!(!successful()(StatusCode::NOT_FOUND));

        let listed = listed_codes(&[200, 404]);
        assert!(listed(StatusCode::NOT_FOUND));
        assert!(!listed(StatusCode::CREATED));
    }
}
