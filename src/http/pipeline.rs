//! Built-in pipeline used when the caller does not supply one.

use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use crate::http::readiness::{ReadinessGate, ReadinessLayer};

/// Path answered by the readiness gate.
pub const READINESS_PATH: &str = "/readiness";

/// `/ping` and `/liveness` always answer 200; `GET /readiness` follows the gate.
pub fn default_pipeline(readiness: ReadinessGate) -> Router {
    Router::new()
        .route("/ping", get(ok))
        .route("/liveness", get(ok))
        .layer(ReadinessLayer::new(READINESS_PATH, Some(readiness)))
}

async fn ok() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain")], ".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use tower::ServiceExt;

    async fn call(app: Router, method: Method, uri: &str) -> (StatusCode, Option<String>, String) {
        let response = app
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, content_type, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn health_endpoints_answer_dot() {
        for path in ["/ping", "/liveness"] {
            let (status, content_type, body) =
                call(default_pipeline(ReadinessGate::new(false)), Method::GET, path).await;
            assert_eq!(status, StatusCode::OK, "{path}");
            assert_eq!(content_type.as_deref(), Some("text/plain"));
            assert_eq!(body, ".");
        }
    }

    #[tokio::test]
    async fn readiness_follows_the_gate() {
        let gate = ReadinessGate::new(false);
        let app = default_pipeline(gate.clone());

        let (status, _, _) = call(app.clone(), Method::GET, READINESS_PATH).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        gate.set_ready(true);
        let (status, _, _) = call(app, Method::GET, READINESS_PATH).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_paths_are_not_found() {
        let (status, _, _) = call(default_pipeline(ReadinessGate::new(true)), Method::GET, "/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _, _) =
            call(default_pipeline(ReadinessGate::new(true)), Method::POST, READINESS_PATH).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
