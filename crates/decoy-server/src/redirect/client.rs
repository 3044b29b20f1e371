//! Outbound HTTP clients used by proxy mocks.

use super::tls::insecure_client_config;
use bytes::Bytes;
use http_body_util::Full;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;
use tracing::warn;

/// Type alias for the HTTP client used by the redirector.
pub type HttpClient = Client<hyper_rustls::HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Create an HTTP/1.1 client for both `http` and `https` upstreams.
///
/// With `skip_tls_verify` the client accepts any server certificate. Otherwise
/// it trusts the platform roots; when those cannot be loaded only plain `http`
/// upstreams will be reachable.
pub fn create_http_client(skip_tls_verify: bool) -> HttpClient {
    let mut http_connector = HttpConnector::new();
    http_connector.set_keepalive(Some(Duration::from_secs(60)));
    http_connector.enforce_http(false);

    let builder = hyper_rustls::HttpsConnectorBuilder::new();
    let builder = if skip_tls_verify {
        builder.with_tls_config(insecure_client_config())
    } else {
        match hyper_rustls::HttpsConnectorBuilder::new().with_native_roots() {
            Ok(builder) => builder,
            Err(e) => {
                warn!("Failed to load native root certificates, https upstreams will fail: {e}");
                builder.with_tls_config(
                    rustls::ClientConfig::builder()
                        .with_root_certificates(rustls::RootCertStore::empty())
                        .with_no_client_auth(),
                )
            }
        }
    };
    let https_connector = builder
        .https_or_http()
        .enable_http1()
        .wrap_connector(http_connector);

    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(90))
        .build(https_connector)
}
