use super::AppContext;
use axum::{Json, extract::State, response::IntoResponse};

pub(crate) async fn stats(State(context): State<AppContext>) -> impl IntoResponse {
    Json(context.hub.stats())
}
