use axum::{
    body::Bytes,
    extract::{FromRequestParts, Path, Query},
    http::{header, request::Parts, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{de::DeserializeOwned, Deserialize};
use utoipa::IntoParams;

use crate::errors::ServiceError;

/// `Path` extractor whose rejection is the JSON error envelope
#[derive(Debug)]
pub struct ApiPath<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(ApiPath(value))
    }
}

/// `Query` extractor whose rejection is the JSON error envelope
#[derive(Debug)]
pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(ApiQuery(value))
    }
}

/// Decodes an optional JSON request body.
///
/// An empty body, whitespace, or a literal `null` all mean "no body".
pub fn optional_json_body<T: DeserializeOwned>(body: &Bytes) -> Result<Option<T>, ServiceError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice::<Option<T>>(body)
        .map_err(|e| ServiceError::BadRequest(format!("Invalid JSON body: {}", e)))
}

/// Converts a signed query value into a count, rejecting negatives
pub fn non_negative(value: Option<i64>, name: &str) -> Result<Option<usize>, ServiceError> {
    value
        .map(|v| {
            usize::try_from(v).map_err(|_| {
                ServiceError::ValidationError(format!("{} must not be negative", name))
            })
        })
        .transpose()
}

/// Query flag that is enabled only by the string `true`, ignoring case
pub fn truthy_flag(value: Option<&str>, default: bool) -> bool {
    value.map_or(default, |v| v.trim().eq_ignore_ascii_case("true"))
}

/// PNG bytes served as a file download
pub fn png_attachment(bytes: Vec<u8>, filename: &str) -> Response {
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("image/png")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response()
}

/// Result size for recommendation endpoints
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct CountQuery {
    /// Number of results to return (default: 5)
    #[param(minimum = 0, maximum = 100)]
    pub count: Option<i64>,
}

impl CountQuery {
    pub fn count(&self) -> Result<Option<usize>, ServiceError> {
        non_negative(self.count, "count")
    }
}
