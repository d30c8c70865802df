use super::AppContext;
use crate::errors::hub_error::HubError;
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubscribeRequest {
    session_id: String,
    topics: Vec<String>,
}

pub(crate) async fn subscribe(
    State(context): State<AppContext>,
    payload: Result<Json<SubscribeRequest>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": rejection.body_text() })),
            )
                .into_response();
        }
    };

    match context
        .hub
        .subscribe(&payload.session_id, payload.topics)
        .await
    {
        Ok(outcome) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "subscribed": outcome.subscribed,
                "denied": outcome.denied,
            })),
        )
            .into_response(),
        Err(error @ HubError::UnknownSession(_)) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": error.to_string() })),
        )
            .into_response(),
    }
}
