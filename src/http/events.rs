use super::AppContext;
use crate::hub::SseManager;
use axum::{
    Json,
    body::Body,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_stream::{Stream, wrappers::UnboundedReceiverStream};

pub(crate) async fn events(State(context): State<AppContext>, headers: HeaderMap) -> Response {
    let identity = match context.authenticator.authenticate(&headers).await {
        Ok(identity) => identity,
        Err(error) => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": error.to_string() })),
            )
                .into_response();
        }
    };

    let (session_id, rx) = context.hub.add_session(identity);

    let hub = Arc::clone(&context.hub);
    let snapshot_session = session_id.clone();
    tokio::spawn(async move {
        hub.send_initial_snapshot(&snapshot_session).await;
    });

    let stream = EventStream::new(rx, Arc::clone(&context.hub), session_id);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(Body::from_stream(stream))
        .expect("Could not build event stream response")
}

/// Frames queued for one session, as the response body. Dropping the body
/// (client hung up, server shutdown) tears the session down exactly once;
/// removal of an already-removed session is a no-op.
struct EventStream {
    frames: UnboundedReceiverStream<String>,
    hub: Arc<SseManager>,
    session_id: String,
}

impl EventStream {
    fn new(rx: UnboundedReceiver<String>, hub: Arc<SseManager>, session_id: String) -> Self {
        EventStream {
            frames: UnboundedReceiverStream::new(rx),
            hub,
            session_id,
        }
    }
}

impl Stream for EventStream {
    type Item = Result<String, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.frames)
            .poll_next(cx)
            .map(|frame| frame.map(Ok))
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.hub.remove_session(&self.session_id);
    }
}
