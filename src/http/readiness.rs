//! Readiness gate for load-balancer probes.
//!
//! [`ReadinessGate`] is a shared flag: many concurrent readers, a rare
//! writer, last write wins. [`ReadinessLayer`] answers `GET` on one path from
//! that flag and forwards everything else untouched.

use std::future::{ready, Ready};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::http::{header, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::future::Either;
use tower::{Layer, Service};

/// Shared "ready for traffic" flag.
///
/// A fresh gate reports not ready until [`set_ready`](Self::set_ready) is called.
#[derive(Debug, Clone, Default)]
pub struct ReadinessGate {
    ready: Arc<AtomicBool>,
}

impl ReadinessGate {
    pub fn new(ready: bool) -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(ready)),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }
}

/// Layer that intercepts `GET <path>` (case-insensitive) and answers it
/// from a [`ReadinessGate`]. A missing gate counts as not ready.
#[derive(Debug, Clone)]
pub struct ReadinessLayer {
    path: Arc<str>,
    gate: Option<ReadinessGate>,
}

impl ReadinessLayer {
    pub fn new(path: &str, gate: Option<ReadinessGate>) -> Self {
        Self {
            path: Arc::from(path),
            gate,
        }
    }
}

impl<S> Layer<S> for ReadinessLayer {
    type Service = Readiness<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Readiness {
            inner,
            path: Arc::clone(&self.path),
            gate: self.gate.clone(),
        }
    }
}

/// Service produced by [`ReadinessLayer`].
#[derive(Debug, Clone)]
pub struct Readiness<S> {
    inner: S,
    path: Arc<str>,
    gate: Option<ReadinessGate>,
}

impl<S> Readiness<S> {
    fn intercepts<B>(&self, request: &Request<B>) -> bool {
        request.method() == Method::GET && request.uri().path().eq_ignore_ascii_case(&self.path)
    }

    fn is_ready(&self) -> bool {
        self.gate.as_ref().is_some_and(ReadinessGate::is_ready)
    }
}

impl<S, B> Service<Request<B>> for Readiness<S>
where
    S: Service<Request<B>, Response = Response>,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Either<Ready<Result<Response, S::Error>>, S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<B>) -> Self::Future {
        if self.intercepts(&request) {
            return Either::Left(ready(Ok(probe_response(self.is_ready()))));
        }
        Either::Right(self.inner.call(request))
    }
}

fn probe_response(ready: bool) -> Response {
    if ready {
        (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain")], ".").into_response()
    } else {
        StatusCode::SERVICE_UNAVAILABLE.into_response()
    }
}
