use analysis_hub::config::HubConfig;
use analysis_hub::http::{self, AppContext};
use analysis_hub::hub::SseManager;
use analysis_hub::standalone::StandaloneDirectory;
use dotenvy::dotenv;
use env_logger::Env;
use log::info;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = HubConfig::from_env();
    let directory = Arc::new(StandaloneDirectory::from_env());

    let hub = SseManager::new(
        config,
        directory.clone(),
        directory.clone(),
        directory.clone(),
        directory.clone(),
    );

    info!("Analysis hub starting in standalone mode");

    http::listen(AppContext {
        hub,
        authenticator: directory,
    })
    .await;
}
