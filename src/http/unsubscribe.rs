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
pub(crate) struct UnsubscribeRequest {
    session_id: String,
    topics: Vec<String>,
}

pub(crate) async fn unsubscribe(
    State(context): State<AppContext>,
    payload: Result<Json<UnsubscribeRequest>, JsonRejection>,
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

    match context.hub.unsubscribe(&payload.session_id, payload.topics) {
        Ok(unsubscribed) => (
            StatusCode::OK,
            Json(json!({ "success": true, "unsubscribed": unsubscribed })),
        )
            .into_response(),
        Err(error @ HubError::UnknownSession(_)) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": error.to_string() })),
        )
            .into_response(),
    }
}
