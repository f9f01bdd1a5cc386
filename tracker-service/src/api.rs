//! Request extractors and the success envelope shared by all handlers.

use axum::extract::{FromRequest, FromRequestParts};
use axum::Json;
use common_http_errors::ApiError;
use serde::Serialize;

/// JSON body whose rejection renders as an [`ApiError`].
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

/// `{ "success": true, ...payload }`
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(flatten)]
    pub payload: T,
}

pub fn ok<T: Serialize>(payload: T) -> Json<Envelope<T>> {
    Json(Envelope { success: true, payload })
}
