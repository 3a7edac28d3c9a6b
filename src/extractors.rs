//! Request data extraction traits and built-in extractors.
//!
//! `FromRequest` is for extractors that need the body (JSON, multipart,
//! forms); `FromRequestParts` is for metadata-only extractors (path, query,
//! state) that don't consume the body, so several can run on the same
//! request.

use http::request::Parts;

pub mod json;
pub mod multipart;
pub mod params;
pub mod path;
pub mod query;
pub mod state;

pub trait FromRequest<'a>: Sized {
    type Error: crate::responder::Responder;

    fn from_request(
        req: &'a mut crate::types::Request,
    ) -> impl core::future::Future<Output = core::result::Result<Self, Self::Error>> + Send + 'a;
}

pub trait FromRequestParts<'a>: Sized {
    type Error: crate::responder::Responder;

    fn from_request_parts(
        parts: &'a mut Parts,
    ) -> impl core::future::Future<Output = core::result::Result<Self, Self::Error>> + Send + 'a;
}

/// Lets handlers take `&mut Request` directly as an extractor argument.
impl<'a> FromRequest<'a> for &'a mut crate::types::Request {
    type Error = core::convert::Infallible;

    fn from_request(
        req: &'a mut crate::types::Request,
    ) -> impl core::future::Future<Output = core::result::Result<Self, Self::Error>> + Send + 'a
    {
        std::future::ready(Ok(req))
    }
}
