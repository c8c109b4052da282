//! Request extractors whose rejections answer with the `{"detail": ..}` body.
//!
//! axum's stock `Json`, `Form`, `Query` and `Path` reject with plain text.
//! Handlers take these wrappers instead so malformed input is reported the
//! same way as every other error (422).

use axum::extract::{FromRequest, FromRequestParts};

use crate::error::ApiError;

#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

#[derive(Debug, FromRequest)]
#[from_request(via(axum::Form), rejection(ApiError))]
pub struct FormBody<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct QueryParams<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct PathParam<T>(pub T);

#[cfg(test)]
#[path = "extract_test.rs"]
mod tests;
