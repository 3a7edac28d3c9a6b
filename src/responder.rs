//! Response generation utilities and trait implementations for HTTP responses.
//!
//! The `Responder` trait lets handlers return strings, tuples, full responses,
//! or `Result<T, CoreError>` and have them converted into a uniform
//! `Response<CoreBody>`.

use std::{convert::Infallible, fmt::Display};

use bytes::Bytes;
use http::{HeaderName, HeaderValue, Response, StatusCode};
use http_body_util::Full;

use crate::body::CoreBody;

pub trait Responder {
    fn into_response(self) -> Response<CoreBody>;
}

impl Responder for Response<CoreBody> {
    fn into_response(self) -> Response<CoreBody> {
        self
    }
}

impl Responder for &'static str {
    fn into_response(self) -> Response<CoreBody> {
        Response::new(CoreBody::new(Full::from(Bytes::from_static(
            self.as_bytes(),
        ))))
    }
}

impl Responder for String {
    fn into_response(self) -> Response<CoreBody> {
        Response::new(CoreBody::new(Full::from(Bytes::from(self))))
    }
}

impl Responder for () {
    fn into_response(self) -> Response<CoreBody> {
        Response::new(CoreBody::empty())
    }
}

impl Responder for Infallible {
    fn into_response(self) -> Response<CoreBody> {
        match self {}
    }
}

/// Wrapper for static header name/value pairs, attached via a tuple responder.
pub struct StaticHeaders<const N: usize>(pub [(HeaderName, &'static str); N]);

impl<const N: usize> Responder for (StatusCode, StaticHeaders<N>) {
    fn into_response(self) -> Response<CoreBody> {
        let (status, StaticHeaders(headers)) = self;
        let mut res = Response::new(CoreBody::empty());
        *res.status_mut() = status;

        for (name, value) in headers {
            res.headers_mut()
                .append(name, HeaderValue::from_static(value));
        }
        res
    }
}

impl<R> Responder for (StatusCode, R)
where
    R: Display,
{
    fn into_response(self) -> Response<CoreBody> {
        let (status, body) = self;
        let mut res = Response::new(CoreBody::new(Full::from(Bytes::from(body.to_string()))));
        *res.status_mut() = status;
        res
    }
}

impl Responder for CoreBody {
    fn into_response(self) -> Response<CoreBody> {
        Response::new(self)
    }
}

impl Responder for anyhow::Error {
    fn into_response(self) -> Response<CoreBody> {
        (StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}

/// Lets handlers return `Result<R, E>` directly wherever both sides implement
/// `Responder` — the `Err` branch is rendered exactly like an `Ok` value
/// would be, just with whatever status the error type maps to.
impl<R, E> Responder for core::result::Result<R, E>
where
    R: Responder,
    E: Responder,
{
    fn into_response(self) -> Response<CoreBody> {
        match self {
            Ok(r) => r.into_response(),
            Err(e) => e.into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn str_responder_defaults_to_200() {
        let res = "ok".into_response();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[test]
    fn status_tuple_sets_status() {
        let res = (StatusCode::CREATED, "made it").into_response();
        assert_eq!(res.status(), StatusCode::CREATED);
    }
}
