//! Turning resolved responses into hyper responses.

use crate::matcher::MultiMap;
use crate::redirect::is_hop_by_hop;
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderName, HeaderValue};
use hyper::{Response, StatusCode};
use serde_json::Value;
use tracing::debug;

/// Build a response with every declared header value.
///
/// Connection-level headers and `Content-Length` are dropped since hyper frames
/// the body itself; invalid names or values are skipped. Returns the headers
/// actually written alongside the response.
pub fn build_response(
    status: u16,
    headers: &MultiMap,
    body: impl Into<Bytes>,
) -> (Response<Full<Bytes>>, MultiMap) {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = StatusCode::from_u16(status).unwrap_or_else(|_| {
        debug!(status, "Invalid status code, answering 500");
        StatusCode::INTERNAL_SERVER_ERROR
    });

    let mut written = MultiMap::new();
    for (name, values) in headers {
        if is_hop_by_hop(name) {
            continue;
        }
        let Ok(header) = HeaderName::from_bytes(name.as_bytes()) else {
            debug!(header = %name, "Skipping invalid response header name");
            continue;
        };
        for value in values {
            match HeaderValue::from_str(value) {
                Ok(v) => {
                    response.headers_mut().append(header.clone(), v);
                    written.entry(name.clone()).or_default().push(value.clone());
                }
                Err(_) => debug!(header = %name, "Skipping invalid response header value"),
            }
        }
    }
    (response, written)
}

/// Headers and body of a JSON payload.
pub fn json_body(payload: &Value) -> (MultiMap, Bytes) {
    let mut headers = MultiMap::new();
    headers.insert(
        "Content-Type".to_string(),
        vec!["application/json".to_string()],
    );
    let body = serde_json::to_vec(payload).unwrap_or_default();
    (headers, Bytes::from(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::CONTENT_TYPE;
    use serde_json::json;

    #[test]
    fn test_build_response() {
        let mut headers = MultiMap::new();
        headers.insert("X-Multi".into(), vec!["a".into(), "b".into()]);
        headers.insert("Content-Length".into(), vec!["999".into()]);
        headers.insert("Transfer-Encoding".into(), vec!["chunked".into()]);
        headers.insert("X-Bad".into(), vec!["line\nbreak".into()]);

        let (response, written) = build_response(201, &headers, "hello");
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers().get_all("x-multi").iter().count(), 2);
        assert!(response.headers().get("content-length").is_none());
        assert!(response.headers().get("transfer-encoding").is_none());
        assert!(response.headers().get("x-bad").is_none());
        assert_eq!(written.len(), 1);
        assert_eq!(written["X-Multi"], vec!["a", "b"]);
    }

    #[test]
    fn test_sentinel_status_with_json_body() {
        let (headers, body) = json_body(&json!({"message": "x"}));
        let (response, written) = build_response(666, &headers, body.clone());
        assert_eq!(response.status().as_u16(), 666);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(written["Content-Type"], vec!["application/json"]);
        assert_eq!(&body[..], br#"{"message":"x"}"#);
    }
}
