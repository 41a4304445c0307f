//! Request logging middleware.
//!
//! Logs one DEBUG line per request with method, decoded URI, client IP,
//! duration, and status. Values of the `jwt` query parameter are masked.
//!
//! ```ignore
//! let app = default_pipeline(gate).layer(axum::middleware::from_fn(access_log));
//! ```

use std::borrow::Cow;
use std::net::SocketAddr;
use std::time::Instant;

use axum::extract::{ConnectInfo, Request};
use axum::http::Uri;
use axum::middleware::Next;
use axum::response::Response;
use percent_encoding::percent_decode_str;

const MASKED_PARAMS: &[&str] = &["jwt"];

pub async fn access_log(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = loggable_uri(request.uri());
    let client_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "-".to_string());

    let response = next.run(request).await;

    tracing::debug!(
        method = %method,
        uri = %uri,
        client_ip = %client_ip,
        duration = ?start.elapsed(),
        status = response.status().as_u16(),
        "request"
    );

    response
}

/// Percent-decoded path and query with sensitive parameters masked.
pub fn loggable_uri(uri: &Uri) -> String {
    let mut out = percent_decode_str(uri.path()).decode_utf8_lossy().into_owned();

    if let Some(query) = uri.query().filter(|q| !q.is_empty()) {
        let params: Vec<String> = url::form_urlencoded::parse(query.as_bytes())
            .map(|(key, value)| {
                let value = if MASKED_PARAMS.contains(&key.as_ref()) {
                    Cow::Borrowed("***")
                } else {
                    value
                };
                format!("{key}={value}")
            })
            .collect();
        out.push('?');
        out.push_str(&params.join("&"));
    }

    out
}
