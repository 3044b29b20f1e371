//! Normalized requests and recorded history entries.

use crate::matcher::{canonical_header_key, parse_query, MultiMap};
use chrono::{DateTime, Utc};
use hyper::http::request::Parts;
use hyper::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;

/// An inbound request, normalized for matching, engines and history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Path as received (still percent-encoded), without the query string.
    pub path: String,
    pub method: String,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub body_string: String,
    /// JSON-decoded body when it is a JSON object, otherwise the raw text.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub body: Value,
    #[serde(default, skip_serializing_if = "MultiMap::is_empty")]
    pub query_params: MultiMap,
    #[serde(default, skip_serializing_if = "MultiMap::is_empty")]
    pub headers: MultiMap,
    #[serde(default)]
    pub date: DateTime<Utc>,
}

impl Request {
    /// Build a normalized request from hyper request parts and the collected body.
    pub fn from_parts(parts: &Parts, body: &[u8], remote: SocketAddr) -> Self {
        let mut headers = header_multimap(&parts.headers);
        if !headers.contains_key("Host") {
            if let Some(authority) = parts.uri.authority() {
                headers.insert("Host".to_string(), vec![authority.to_string()]);
            }
        }

        let body_string = String::from_utf8_lossy(body).into_owned();
        let body = match serde_json::from_slice::<Value>(body) {
            Ok(v @ Value::Object(_)) => v,
            _ if body_string.is_empty() => Value::Null,
            _ => Value::String(body_string.clone()),
        };

        Self {
            path: parts.uri.path().to_string(),
            method: parts.method.to_string(),
            origin: client_origin(&headers, remote),
            body_string,
            body,
            query_params: parts.uri.query().map(parse_query).unwrap_or_default(),
            headers,
            date: Utc::now(),
        }
    }

    /// First value of a header, by canonical name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&canonical_header_key(name))
            .and_then(|v| v.first())
            .map(String::as_str)
    }
}

/// Header map flattened to canonical key to values.
pub fn header_multimap(headers: &HeaderMap) -> MultiMap {
    let mut map = MultiMap::new();
    for (name, value) in headers {
        map.entry(canonical_header_key(name.as_str()))
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    map
}

/// Right-most non-empty `X-Forwarded-For` entry, then `X-Real-Ip`, then the peer IP.
fn client_origin(headers: &MultiMap, remote: SocketAddr) -> String {
    let last_entry = |name: &str| {
        headers.get(name).and_then(|values| {
            values
                .iter()
                .flat_map(|v| v.split(','))
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .last()
                .map(str::to_string)
        })
    };
    last_entry("X-Forwarded-For")
        .or_else(|| last_entry("X-Real-Ip"))
        .unwrap_or_else(|| remote.ip().to_string())
}

/// Which response kind served a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MockType {
    Static,
    Dynamic,
    Proxy,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mock_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mock_type: Option<MockType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<String>,
}

/// The response actually written for a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    /// JSON-decoded body when the written body is JSON, otherwise the text.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub body: Value,
    #[serde(default, skip_serializing_if = "MultiMap::is_empty")]
    pub headers: MultiMap,
    #[serde(default)]
    pub date: DateTime<Utc>,
}

impl Response {
    pub fn new(status: u16, headers: MultiMap, body: &[u8]) -> Self {
        let body = match serde_json::from_slice::<Value>(body) {
            Ok(v) => v,
            Err(_) if body.is_empty() => Value::Null,
            Err(_) => Value::String(String::from_utf8_lossy(body).into_owned()),
        };
        Self {
            status,
            body,
            headers,
            date: Utc::now(),
        }
    }
}

/// One request/response pair recorded in a session's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub context: Context,
    pub request: Request,
    pub response: Response,
}

pub type History = Vec<Entry>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parts(builder: hyper::http::request::Builder) -> Parts {
        builder.body(()).unwrap().into_parts().0
    }

    fn remote() -> SocketAddr {
        "10.0.0.9:5555".parse().unwrap()
    }

    #[test]
    fn test_normalizes_request() {
        let p = parts(
            hyper::Request::builder()
                .method("POST")
                .uri("/users/a%20b?tag=x&tag=y+z")
                .header("host", "mock.local:8080")
                .header("x-trace", "1"),
        );
        let req = Request::from_parts(&p, br#"{"name":"joe"}"#, remote());

        assert_eq!(req.method, "POST");
        assert_eq!(req.path, "/users/a%20b");
        assert_eq!(req.query_params["tag"], vec!["x", "y z"]);
        assert_eq!(req.headers["Host"], vec!["mock.local:8080"]);
        assert_eq!(req.header("X-TRACE"), Some("1"));
        assert_eq!(req.body, json!({"name": "joe"}));
        assert_eq!(req.body_string, r#"{"name":"joe"}"#);
        assert_eq!(req.origin, "10.0.0.9");
    }

    #[test]
    fn test_non_object_body_kept_as_text() {
        let p = parts(hyper::Request::builder().uri("/"));
        assert_eq!(
            Request::from_parts(&p, b"[1,2]", remote()).body,
            Value::String("[1,2]".into())
        );
        assert_eq!(Request::from_parts(&p, b"", remote()).body, Value::Null);
    }

    #[test]
    fn test_origin_prefers_forwarding_headers() {
        let p = parts(
            hyper::Request::builder()
                .uri("/")
                .header("x-forwarded-for", "1.1.1.1, 2.2.2.2, ")
                .header("x-real-ip", "3.3.3.3"),
        );
        assert_eq!(Request::from_parts(&p, b"", remote()).origin, "2.2.2.2");

        let p = parts(hyper::Request::builder().uri("/").header("x-real-ip", "3.3.3.3"));
        assert_eq!(Request::from_parts(&p, b"", remote()).origin, "3.3.3.3");
    }

    #[test]
    fn test_response_body_decoding() {
        assert_eq!(Response::new(200, MultiMap::new(), b"[1]").body, json!([1]));
        assert_eq!(
            Response::new(200, MultiMap::new(), b"hello").body,
            json!("hello")
        );
    }

    #[test]
    fn test_context_serialization_omits_empty_fields() {
        let ctx = Context {
            mock_id: Some("abc".into()),
            mock_type: Some(MockType::Proxy),
            delay: None,
        };
        assert_eq!(
            serde_json::to_value(&ctx).unwrap(),
            json!({"mock_id": "abc", "mock_type": "proxy"})
        );
    }
}
