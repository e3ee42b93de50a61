use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts, Path, Query, Request,
    },
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::model::StateDecodeError;
use crate::reconcile::ReconcileError;

/// Error body returned by every endpoint on failure. Operators are shown
/// `message` verbatim.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// One of `VALIDATION_ERROR`, `NOT_FOUND`, `CONFLICT`, `UNAVAILABLE`,
    /// `INTERNAL_ERROR`.
    pub error: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    Validation(String),
    NotFound(String),
    Conflict(String),
    Unavailable(String),
    Internal(String),
}

impl ApiError {
    fn status_and_body(self) -> (StatusCode, ErrorBody) {
        match self {
            ApiError::Validation(message) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: "VALIDATION_ERROR",
                    message,
                },
            ),
            ApiError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    error: "NOT_FOUND",
                    message,
                },
            ),
            ApiError::Conflict(message) => (
                StatusCode::CONFLICT,
                ErrorBody {
                    error: "CONFLICT",
                    message,
                },
            ),
            ApiError::Unavailable(message) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorBody {
                    error: "UNAVAILABLE",
                    message,
                },
            ),
            ApiError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        error: "INTERNAL_ERROR",
                        message: "An unexpected error occurred".into(),
                    },
                )
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(format!("{:#}", err))
    }
}

impl From<StateDecodeError> for ApiError {
    fn from(err: StateDecodeError) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl From<ReconcileError> for ApiError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::MediaNotFound(_) | ReconcileError::AdvertiserNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            ReconcileError::Transition(t) => ApiError::Conflict(t.to_string()),
            ReconcileError::Storage(e) => e.into(),
        }
    }
}

/// `Json<T>` that rejects malformed bodies with a structured `ApiError`.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| ApiError::Validation(e.body_text()))?;
        Ok(ApiJson(value))
    }
}

/// `Path<T>` whose rejection is a structured `ApiError`.
pub struct ApiPath<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    Path<T>: FromRequestParts<S, Rejection = PathRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::Validation(e.body_text()))?;
        Ok(ApiPath(value))
    }
}

/// `Query<T>` whose rejection is a structured `ApiError`.
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    Query<T>: FromRequestParts<S, Rejection = QueryRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::Validation(e.body_text()))?;
        Ok(ApiQuery(value))
    }
}
