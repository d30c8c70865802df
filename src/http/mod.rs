use crate::hub::SseManager;
use crate::services::Authenticator;
use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use hyper::{Request, body::Incoming};
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server,
};
use log::{error, info};
use std::env;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_service::Service;

mod events;
mod stats;
mod subscribe;
mod unsubscribe;

#[derive(Clone)]
pub struct AppContext {
    pub hub: Arc<SseManager>,
    pub authenticator: Arc<dyn Authenticator>,
}

/// Starts the HTTP server with hyper so the long-lived event streams are
/// served connection-per-task.
pub async fn listen(context: AppContext) {
    let frontend_url = env::var("FRONTEND_URL").expect("FRONTEND_URL not set");
    let cors = CorsLayer::new().allow_origin(
        frontend_url
            .parse::<HeaderValue>()
            .expect("Could not convert FRONTEND_URL to header"),
    );

    let app = Router::new()
        .route("/events", get(events::events))
        .route("/subscribe", post(subscribe::subscribe))
        .route("/unsubscribe", post(unsubscribe::unsubscribe))
        .route("/stats", get(stats::stats))
        .layer(cors)
        .with_state(context);

    let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Could not bind HTTP server");

    info!("HTTP server listening on {bind_addr}");

    loop {
        let (socket, _remote_addr) = match listener.accept().await {
            Ok(l) => l,
            Err(error) => {
                error!("Could not get socket from accepted HTTP connection: {error}");
                continue;
            }
        };

        let tower_service = app.clone();
        tokio::spawn(async move {
            let socket = TokioIo::new(socket);
            let hyper_service = hyper::service::service_fn(move |request: Request<Incoming>| {
                tower_service.clone().call(request)
            });

            if let Err(err) = server::conn::auto::Builder::new(TokioExecutor::new())
                .serve_connection_with_upgrades(socket, hyper_service)
                .await
            {
                error!("Failed to serve connection: {err:#}");
            }
        });
    }
}
