//! Response bodies relayed from a backend.
//!
//! [`RelayBody`] keeps the backend lease alive until the upstream body
//! ends, fails, or is dropped by the client. It also enforces the
//! request deadline on the body: a stalled stream is cut off with
//! [`PoolRouteError::UpstreamDeadline`].

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use bytes::Bytes;
use hyper::body::{Body as HttpBody, Frame, SizeHint};
use tokio::time::{Instant, Sleep};

use crate::error::PoolRouteError;
use crate::pool::backend_set::BackendLease;

pub struct RelayBody {
    inner: Body,
    deadline: Pin<Box<Sleep>>,
    lease: Option<BackendLease>,
    expired: bool,
}

impl RelayBody {
    #[must_use]
    pub fn new(inner: Body, lease: BackendLease, deadline: Instant) -> Self {
        Self {
            inner,
            deadline: Box::pin(tokio::time::sleep_until(deadline)),
            lease: Some(lease),
            expired: false,
        }
    }

    /// Wrap an upstream response's body.
    pub fn wrap<B>(
        response: hyper::Response<B>,
        lease: BackendLease,
        deadline: Instant,
    ) -> axum::http::Response<Body>
    where
        B: HttpBody<Data = Bytes> + Send + 'static,
        B::Error: Into<axum::BoxError>,
    {
        let (parts, body) = response.into_parts();
        axum::http::Response::from_parts(
            parts,
            Body::new(Self::new(Body::new(body), lease, deadline)),
        )
    }
}

impl HttpBody for RelayBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if this.expired {
            return Poll::Ready(None);
        }

        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => Poll::Ready(Some(Ok(frame))),
            Poll::Ready(other) => {
                this.lease = None;
                Poll::Ready(other)
            }
            Poll::Pending => {
                if this.deadline.as_mut().poll(cx).is_pending() {
                    return Poll::Pending;
                }
                if let Some(lease) = this.lease.take() {
                    tracing::warn!(
                        target = %lease.target,
                        "upstream body stalled past the deadline"
                    );
                }
                this.expired = true;
                Poll::Ready(Some(Err(axum::Error::new(PoolRouteError::UpstreamDeadline))))
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.expired || self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        if self.expired {
            SizeHint::with_exact(0)
        } else {
            self.inner.size_hint()
        }
    }
}
