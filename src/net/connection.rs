//! Per-connection idle timeout.
//!
//! # Responsibilities
//! - Wrap every accepted stream before any protocol (TLS, HTTP) runs on it
//! - Close the connection once it has carried no bytes for the configured idle
//!   period while no request is being handled
//!
//! The idle clock is reset by every successful read or write and is paused
//! while a request is in flight, so it bounds keep-alive gaps and stalled
//! handshakes but never a slow handler. Request processing is bounded
//! separately by the write timeout.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum_server::accept::Accept;
use futures_util::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::{Instant, Sleep};
use tower::Service;

/// Requests currently being handled on one connection.
#[derive(Debug, Default)]
pub struct ConnectionActivity {
    in_flight: AtomicUsize,
}

impl ConnectionActivity {
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight() > 0
    }

    /// Mark one request as started until the returned guard is dropped.
    pub fn begin_request(self: &Arc<Self>) -> RequestGuard {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        RequestGuard {
            activity: Arc::clone(self),
        }
    }
}

/// Ends one in-flight request on drop.
#[derive(Debug)]
pub struct RequestGuard {
    activity: Arc<ConnectionActivity>,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.activity.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Acceptor that wraps each connection in an [`IdleTimeoutStream`] and its
/// service in [`TrackRequests`], both sharing one [`ConnectionActivity`].
#[derive(Debug, Clone, Copy)]
pub struct IdleTimeoutAcceptor {
    idle: Duration,
}

impl IdleTimeoutAcceptor {
    pub fn new(idle: Duration) -> Self {
        Self { idle }
    }
}

impl<I, S> Accept<I, S> for IdleTimeoutAcceptor
where
    I: AsyncRead + AsyncWrite + Unpin,
{
    type Stream = IdleTimeoutStream<I>;
    type Service = TrackRequests<S>;
    type Future = std::future::Ready<io::Result<(Self::Stream, Self::Service)>>;

    fn accept(&self, stream: I, service: S) -> Self::Future {
        let activity = Arc::new(ConnectionActivity::default());
        let stream = IdleTimeoutStream::new(stream, self.idle, Arc::clone(&activity));
        std::future::ready(Ok((stream, TrackRequests::new(service, activity))))
    }
}

/// Service wrapper that counts the requests a connection is handling.
///
/// A request counts as in flight from `call` until its response future
/// resolves; the response body is then covered by write activity.
#[derive(Debug, Clone)]
pub struct TrackRequests<S> {
    inner: S,
    activity: Arc<ConnectionActivity>,
}

impl<S> TrackRequests<S> {
    pub fn new(inner: S, activity: Arc<ConnectionActivity>) -> Self {
        Self { inner, activity }
    }
}

impl<S, R> Service<R> for TrackRequests<S>
where
    S: Service<R>,
    S::Future: Send + 'static,
    S::Response: 'static,
    S::Error: 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<S::Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: R) -> Self::Future {
        let guard = self.activity.begin_request();
        let response = self.inner.call(request);
        Box::pin(async move {
            let result = response.await;
            drop(guard);
            result
        })
    }
}

/// Stream that fails with `TimedOut` after a period without traffic.
#[derive(Debug)]
pub struct IdleTimeoutStream<I> {
    inner: I,
    idle: Duration,
    deadline: Pin<Box<Sleep>>,
    activity: Arc<ConnectionActivity>,
}

impl<I> IdleTimeoutStream<I> {
    pub fn new(inner: I, idle: Duration, activity: Arc<ConnectionActivity>) -> Self {
        Self {
            inner,
            idle,
            deadline: Box::pin(tokio::time::sleep(idle)),
            activity,
        }
    }

    fn touch(&mut self) {
        let next = Instant::now() + self.idle;
        self.deadline.as_mut().reset(next);
    }

    fn poll_expired(&mut self, cx: &mut Context<'_>) -> Poll<io::Error> {
        // A handler is running; the idle period restarts once it returns.
        if self.activity.is_busy() {
            self.touch();
            return Poll::Pending;
        }

        match self.deadline.as_mut().poll(cx) {
            Poll::Ready(()) => {
                tracing::debug!(idle = ?self.idle, "Closing idle connection");
                Poll::Ready(io::Error::new(io::ErrorKind::TimedOut, "connection idle timeout"))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<I: AsyncRead + Unpin> AsyncRead for IdleTimeoutStream<I> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();

        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(result) => {
                if buf.filled().len() > before {
                    this.touch();
                }
                Poll::Ready(result)
            }
            Poll::Pending => this.poll_expired(cx).map(Err),
        }
    }
}

impl<I: AsyncWrite + Unpin> AsyncWrite for IdleTimeoutStream<I> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();

        match Pin::new(&mut this.inner).poll_write(cx, buf) {
            Poll::Ready(Ok(n)) => {
                if n > 0 {
                    this.touch();
                }
                Poll::Ready(Ok(n))
            }
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Pending => this.poll_expired(cx).map(Err),
        }
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();

        match Pin::new(&mut this.inner).poll_write_vectored(cx, bufs) {
            Poll::Ready(Ok(n)) => {
                if n > 0 {
                    this.touch();
                }
                Poll::Ready(Ok(n))
            }
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Pending => this.poll_expired(cx).map(Err),
        }
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tower::ServiceExt;

    fn idle_stream<I>(inner: I, idle: Duration) -> (IdleTimeoutStream<I>, Arc<ConnectionActivity>) {
        let activity = Arc::new(ConnectionActivity::default());
        (IdleTimeoutStream::new(inner, idle, Arc::clone(&activity)), activity)
    }

    #[tokio::test(start_paused = true)]
    async fn silent_peer_times_out() {
        let (client, _server) = tokio::io::duplex(64);
        let (mut stream, _) = idle_stream(client, Duration::from_secs(5));

        let mut buf = [0u8; 8];
        let err = stream.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn traffic_resets_the_clock() {
        let (client, mut server) = tokio::io::duplex(64);
        let (mut stream, _) = idle_stream(client, Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(4)).await;
        server.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        // Past the original deadline but within the refreshed one.
        tokio::time::sleep(Duration::from_secs(4)).await;
        server.write_all(b"pong").await.unwrap();
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[tokio::test(start_paused = true)]
    async fn clock_is_paused_while_a_request_is_in_flight() {
        let (client, mut server) = tokio::io::duplex(64);
        let (mut stream, activity) = idle_stream(client, Duration::from_secs(5));
        let guard = activity.begin_request();

        // A handler twice as slow as the idle period.
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            server.write_all(b"late").await.unwrap();
            // Keep the peer open so the next read can only end by timeout.
            tokio::time::sleep(Duration::from_secs(3600)).await;
            drop(server);
        });

        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"late");

        // Back between requests: the idle period applies again.
        drop(guard);
        let err = stream.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn tracked_service_counts_in_flight_requests() {
        let activity = Arc::new(ConnectionActivity::default());
        let seen = Arc::clone(&activity);
        let svc = tower::service_fn(move |_req: ()| {
            let in_flight = seen.in_flight();
            async move { Ok::<_, Infallible>(in_flight) }
        });

        let in_flight = TrackRequests::new(svc, Arc::clone(&activity)).oneshot(()).await.unwrap();
        assert_eq!(in_flight, 1);
        assert_eq!(activity.in_flight(), 0);
    }

    #[tokio::test]
    async fn acceptor_wraps_service_and_stream() {
        let (client, _server) = tokio::io::duplex(8);
        let acceptor = IdleTimeoutAcceptor::new(Duration::from_secs(1));

        let (stream, service) = acceptor.accept(client, "svc").await.unwrap();
        assert_eq!(service.inner, "svc");
        assert_eq!(stream.idle, Duration::from_secs(1));
        assert!(Arc::ptr_eq(&stream.activity, &service.activity));
    }
}
