//! Response envelope.
//!
//! Every API response has the shape
//! `{ "data": ..., "meta": ..., "error": { "code": ..., "msg": ... } }`
//! with absent parts omitted. The HTTP status is derived from the error code,
//! so clients only ever see a fixed set of failures.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    AlreadyExists,
    Internal,
    InvalidArgument,
    MalformedRequest,
    MalformedResponse,
    NoContent,
    NotFound,
    OutOfRange,
    PermissionDenied,
    Stale,
    Unauthenticated,
    UnprocessableEntity,
}

impl ErrorCode {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorCode::AlreadyExists => StatusCode::CONFLICT,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorCode::MalformedRequest => StatusCode::BAD_REQUEST,
            ErrorCode::MalformedResponse => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::NoContent => StatusCode::NO_CONTENT,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::OutOfRange => StatusCode::BAD_REQUEST,
            ErrorCode::PermissionDenied => StatusCode::FORBIDDEN,
            ErrorCode::Stale => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorCode::UnprocessableEntity => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub msg: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: msg.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Envelope<D, M = ()> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<D>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<M>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl<D, M> Envelope<D, M> {
    pub fn ok(data: D, meta: Option<M>) -> Self {
        Self {
            data: Some(data),
            meta,
            error: None,
        }
    }
}

impl<D: Serialize, M: Serialize> IntoResponse for Envelope<D, M> {
    fn into_response(self) -> Response {
        let status = self
            .error
            .as_ref()
            .map_or(StatusCode::OK, |e| e.code.status());
        (status, Json(self)).into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        Envelope::<(), ()> {
            data: None,
            meta: None,
            error: Some(self),
        }
        .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::{json, Value};

    async fn body_json(res: Response) -> Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn error_sets_status_from_code() {
        let res = ApiError::new(ErrorCode::PermissionDenied, "outrageous input").into_response();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            body_json(res).await,
            json!({"error": {"code": "permission_denied", "msg": "outrageous input"}})
        );
    }

    #[tokio::test]
    async fn data_without_meta_omits_meta() {
        let res = Envelope::<_, ()>::ok(json!({"response": "hi"}), None).into_response();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await, json!({"data": {"response": "hi"}}));
    }

    #[test]
    fn codes_map_to_statuses() {
        assert_eq!(ErrorCode::InvalidArgument.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::MalformedRequest.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::Internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ErrorCode::AlreadyExists.status(), StatusCode::CONFLICT);
    }
}
