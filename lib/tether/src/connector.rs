//! Connector of the hyper adapter.

use std::time::Duration;

use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;

/// Create a connector for internal services.
///
/// Plain `http://` and `https://` URIs are both accepted, over HTTP/1.1 or
/// HTTP/2. TLS certificates are checked against the Mozilla root store.
/// Establishing the TCP connection is bounded by `connect_timeout`.
#[must_use]
pub fn https_connector(connect_timeout: Option<Duration>) -> HttpsConnector<HttpConnector> {
    let mut http = HttpConnector::new();
    http.enforce_http(false);
    http.set_nodelay(true);
    http.set_connect_timeout(connect_timeout);

    let roots: rustls::RootCertStore = webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect();
    let tls = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    HttpsConnectorBuilder::new()
        .with_tls_config(tls)
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .wrap_connector(http)
}
