use axum::{
    Json,
    response::{IntoResponse, Response},
};
use reqwest::StatusCode;

pub mod catalog;
pub mod live;

pub type ApiResult<T> = Result<T, ApiError>;
pub type ApiJsonResult<T> = ApiResult<Json<T>>;

pub struct ApiError(anyhow::Error);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        log::error!("ApiError: {:?}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Relay went wrong because service inner error".to_string(),
        )
            .into_response()
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
