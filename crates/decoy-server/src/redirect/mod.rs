//! Proxy mocks: forward the request to a real upstream and relay its answer.

pub mod client;
pub mod tls;

pub use client::{create_http_client, HttpClient};

use crate::config::ProxyConfig;
use crate::history::{header_multimap, Request};
use crate::matcher::MultiMap;
use crate::mock::{MockProxy, MockResponse};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{HeaderName, HeaderValue, HOST, LOCATION};
use hyper::{HeaderMap, Method, StatusCode, Uri};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Headers that describe a single connection and are never forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "content-length",
];

#[derive(Debug, Error)]
pub enum RedirectError {
    #[error("invalid upstream url {url:?}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("invalid upstream request: {0}")]
    InvalidRequest(String),

    #[error("upstream request failed: {0}")]
    Network(String),

    #[error("failed to read upstream body: {0}")]
    Body(String),

    #[error("upstream did not answer within {0:?}")]
    Timeout(Duration),

    #[error("stopped after {0} redirects")]
    TooManyRedirects(usize),
}

/// Forwards requests for proxy mocks.
#[derive(Clone)]
pub struct Redirector {
    secure: HttpClient,
    insecure: HttpClient,
    timeout: Option<Duration>,
    max_redirects: usize,
}

impl Redirector {
    pub fn new(config: &ProxyConfig) -> Self {
        Self {
            secure: create_http_client(false),
            insecure: create_http_client(true),
            timeout: config.timeout(),
            max_redirects: config.max_redirects,
        }
    }

    /// Replay `request` against `proxy.host` and map the answer to a response
    /// carrying the proxy's delay.
    pub async fn redirect(
        &self,
        proxy: &MockProxy,
        request: &Request,
    ) -> Result<MockResponse, RedirectError> {
        let exchange = self.exchange(proxy, request);
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .map_err(|_| RedirectError::Timeout(limit))?,
            None => exchange.await,
        }
    }

    async fn exchange(
        &self,
        proxy: &MockProxy,
        request: &Request,
    ) -> Result<MockResponse, RedirectError> {
        let client = if proxy.skip_verify_tls {
            &self.insecure
        } else {
            &self.secure
        };
        let follow = proxy.follow_redirect && self.max_redirects > 0;

        let mut uri = target_uri(&proxy.host, &request.path, &request.query_params)?;
        let mut method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| RedirectError::InvalidRequest(e.to_string()))?;
        let mut body = Bytes::from(request.body_string.clone());
        let headers = outbound_headers(proxy, request);
        let mut hops = 0;

        loop {
            let mut outbound = hyper::Request::builder()
                .method(method.clone())
                .uri(uri.clone())
                .body(Full::new(body.clone()))
                .map_err(|e| RedirectError::InvalidRequest(e.to_string()))?;
            *outbound.headers_mut() = headers.clone();

            debug!(%method, %uri, "Redirecting request");
            let response = client
                .request(outbound)
                .await
                .map_err(|e| RedirectError::Network(e.to_string()))?;
            let status = response.status();

            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .filter(|_| follow && status.is_redirection())
                .map(str::to_string);
            if let Some(location) = location {
                if hops == self.max_redirects {
                    return Err(RedirectError::TooManyRedirects(self.max_redirects));
                }
                hops += 1;
                uri = resolve_location(&uri, &location)?;
                if matches!(
                    status,
                    StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::SEE_OTHER
                ) && method != Method::HEAD
                {
                    method = Method::GET;
                    body = Bytes::new();
                }
                continue;
            }

            let mut response_headers = header_multimap(response.headers());
            response_headers.retain(|name, _| !is_hop_by_hop(name));
            let bytes = response
                .into_body()
                .collect()
                .await
                .map_err(|e| RedirectError::Body(e.to_string()))?
                .to_bytes();

            return Ok(MockResponse {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
                headers: response_headers,
                delay: proxy.delay,
            });
        }
    }
}

pub(crate) fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// `host + path`, with the request query re-encoded in key order.
fn target_uri(host: &str, path: &str, query: &MultiMap) -> Result<Uri, RedirectError> {
    let mut target = format!("{}{}", host.trim_end_matches('/'), path);
    if !query.is_empty() {
        target.push('?');
        target.push_str(&encode_query(query));
    }
    let invalid = |message: String| RedirectError::InvalidUrl {
        url: target.clone(),
        message,
    };
    let uri: Uri = target
        .parse()
        .map_err(|e: hyper::http::uri::InvalidUri| invalid(e.to_string()))?;
    if uri.scheme().is_none() || uri.authority().is_none() {
        return Err(invalid("expected an absolute http(s) url".to_string()));
    }
    Ok(uri)
}

fn encode_query(query: &MultiMap) -> String {
    query
        .iter()
        .flat_map(|(key, values)| {
            values.iter().map(move |value| {
                format!(
                    "{}={}",
                    urlencoding::encode(key),
                    urlencoding::encode(value)
                )
            })
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Request headers minus hop-by-hop ones, with proxy overrides applied and the
/// inbound `Host` kept only when `keep_host` is set.
fn outbound_headers(proxy: &MockProxy, request: &Request) -> HeaderMap {
    let mut headers = HeaderMap::new();
    append_all(&mut headers, &request.headers, |name| {
        !is_hop_by_hop(name) && !name.eq_ignore_ascii_case("host")
    });

    for name in proxy.headers.keys() {
        if let Ok(name) = HeaderName::from_bytes(name.as_bytes()) {
            headers.remove(name);
        }
    }
    append_all(&mut headers, &proxy.headers, |_| true);

    if proxy.keep_host {
        if let Some(host) = request.header("Host").and_then(|h| HeaderValue::from_str(h).ok()) {
            headers.insert(HOST, host);
        }
    }
    headers
}

fn append_all(headers: &mut HeaderMap, source: &MultiMap, keep: impl Fn(&str) -> bool) {
    for (name, values) in source {
        if !keep(name) {
            continue;
        }
        let Ok(header) = HeaderName::from_bytes(name.as_bytes()) else {
            debug!(header = %name, "Skipping invalid header name");
            continue;
        };
        for value in values {
            match HeaderValue::from_str(value) {
                Ok(value) => {
                    headers.append(header.clone(), value);
                }
                Err(_) => debug!(header = %name, "Skipping invalid header value"),
            }
        }
    }
}

fn resolve_location(base: &Uri, location: &str) -> Result<Uri, RedirectError> {
    let invalid = |message: String| RedirectError::InvalidUrl {
        url: location.to_string(),
        message,
    };
    let candidate: Uri = location
        .parse()
        .map_err(|e: hyper::http::uri::InvalidUri| invalid(e.to_string()))?;
    if candidate.scheme().is_some() {
        return Ok(candidate);
    }

    let path_and_query = if location.starts_with('/') {
        location.to_string()
    } else {
        let dir = base.path().rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
        format!("{dir}/{location}")
    };
    let mut parts = base.clone().into_parts();
    parts.path_and_query = Some(
        path_and_query
            .parse()
            .map_err(|e: hyper::http::uri::InvalidUri| invalid(e.to_string()))?,
    );
    Uri::from_parts(parts).map_err(|e| invalid(e.to_string()))
}
