use axum::{
    Json, Router,
    routing::{get, post},
};
use serde::Deserialize;

use crate::catalog::{self, LiveStream};
use crate::handler::ApiJsonResult;

pub fn catalog_router() -> Router {
    Router::new()
        .route("/create-stream", post(create_stream))
        .route("/streams", get(list_streams))
}

#[derive(Deserialize)]
struct CreateStreamRequest {
    name: String,
}

async fn create_stream(Json(req): Json<CreateStreamRequest>) -> ApiJsonResult<LiveStream> {
    let stream = catalog::client()?.create_stream(&req.name).await?;
    Ok(Json(stream))
}

async fn list_streams() -> ApiJsonResult<Vec<LiveStream>> {
    let streams = catalog::client()?.list_streams().await?;
    Ok(Json(streams))
}
