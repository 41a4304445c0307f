//! Plaintext-to-HTTPS redirect pipeline.

use std::sync::Arc;

use axum::extract::State;
use axum::http::Uri;
use axum::response::Redirect;
use axum::Router;

/// A pipeline that answers every request with `307 Temporary Redirect` to
/// `base_url` followed by the original path and raw query.
pub fn redirect_pipeline(base_url: &str) -> Router {
    Router::new()
        .fallback(redirect_to_tls)
        .with_state(Arc::<str>::from(base_url))
}

async fn redirect_to_tls(State(base_url): State<Arc<str>>, uri: Uri) -> Redirect {
    Redirect::temporary(&redirect_target(&base_url, &uri))
}

fn redirect_target(base_url: &str, uri: &Uri) -> String {
    let mut target = format!("{base_url}{}", uri.path());
    if let Some(query) = uri.query().filter(|q| !q.is_empty()) {
        target.push('?');
        target.push_str(query);
    }
    target
}
