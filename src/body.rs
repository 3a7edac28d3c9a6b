//! HTTP request and response body handling utilities for efficient data processing.
//!
//! This module provides `CoreBody`, a flexible wrapper around HTTP body implementations
//! that supports static content, streams, and dynamic generation. It integrates with
//! Hyper's body system while providing convenience methods for common use cases like
//! empty bodies, streaming data, and conversions from common input types.
//!
//! # Examples
//!
//! ```rust
//! use catzilla_core::body::CoreBody;
//! use bytes::Bytes;
//! use futures_util::stream;
//!
//! let empty = CoreBody::empty();
//! let text_body = CoreBody::from("Hello, World!");
//! let bytes_body = CoreBody::from(Bytes::from("Binary data"));
//!
//! let stream_data = stream::iter(vec![
//!     Ok(Bytes::from("chunk1")),
//!     Ok(Bytes::from("chunk2")),
//! ]);
//! let stream_body = CoreBody::from_stream(stream_data);
//! ```

use std::{
    fmt::Debug,
    pin::Pin,
    task::{Context, Poll},
};

use bytes::Bytes;

use anyhow::Result;
use futures_util::{Stream, TryStream, TryStreamExt};
use http_body_util::{BodyExt, Empty, StreamBody};
use hyper::body::{Body, Frame, SizeHint};

use crate::types::{BoxBody, BoxError};

/// HTTP body wrapper with streaming and conversion support.
pub struct CoreBody(BoxBody);

impl CoreBody {
    /// Wraps any `Body` implementation, erasing its concrete type.
    pub fn new<B>(body: B) -> Self
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        Self(body.map_err(|e| e.into()).boxed_unsync())
    }

    /// Builds a body from a stream of byte chunks, each possibly an error.
    pub fn from_stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<BoxError> + Debug + 'static,
    {
        let stream = stream.map_err(Into::into).map_ok(hyper::body::Frame::data);
        let body = StreamBody::new(stream).boxed_unsync();
        Self(body)
    }

    /// Builds a body directly from a stream of HTTP frames (data + trailers).
    pub fn from_try_stream<S, E>(stream: S) -> Self
    where
        S: TryStream<Ok = Frame<Bytes>, Error = E> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        let body = StreamBody::new(stream.map_err(Into::into)).boxed_unsync();
        Self(body)
    }

    /// An empty body that signals end-of-stream immediately.
    pub fn empty() -> Self {
        Self::new(Empty::new())
    }
}

impl Default for CoreBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<()> for CoreBody {
    fn from(_: ()) -> Self {
        Self::empty()
    }
}

impl From<&str> for CoreBody {
    fn from(buf: &str) -> Self {
        let owned = buf.to_owned();
        Self::new(http_body_util::Full::from(owned))
    }
}

macro_rules! body_from_impl {
    ($ty:ty) => {
        impl From<$ty> for CoreBody {
            fn from(buf: $ty) -> Self {
                Self::new(http_body_util::Full::from(buf))
            }
        }
    };
}

body_from_impl!(String);
body_from_impl!(Vec<u8>);
body_from_impl!(Bytes);

impl Body for CoreBody {
    type Data = Bytes;
    type Error = BoxError;

    #[inline]
    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Pin::new(&mut self.0).poll_frame(cx)
    }

    #[inline]
    fn size_hint(&self) -> SizeHint {
        self.0.size_hint()
    }

    #[inline]
    fn is_end_stream(&self) -> bool {
        self.0.is_end_stream()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_ends_immediately() {
        let body = CoreBody::empty();
        assert!(body.is_end_stream());
        assert_eq!(body.size_hint().exact(), Some(0));
    }

    #[test]
    fn string_body_is_not_empty() {
        let body = CoreBody::from("hello");
        assert!(!body.is_end_stream());
    }
}
