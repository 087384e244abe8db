use std::net::SocketAddr;

use aigate_app::{AppState, build_router, config::AppConfig};
use aigate_observability::{ObservabilityConfig, init_observability};
use tracing::info;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    init_observability("aigate-app", &ObservabilityConfig::from_env());

    let config = AppConfig::from_env().expect("configuration must be valid");
    let state = AppState::from_config(&config).expect("backend clients must initialize");
    let app = build_router(state);
    let addr: SocketAddr =
        format!("{}:{}", config.host, config.port).parse().expect("socket address must be valid");

    let listener = tokio::net::TcpListener::bind(addr).await.expect("listener must bind");
    info!(event = "server.listening", %addr);
    axum::serve(listener, app).await.expect("server must run");
}
