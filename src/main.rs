use license_api_rust::config::AppConfig;
use license_api_rust::server::app;
use license_api_rust::state::AppState;

#[tokio::main]
async fn main() {
    // Load .env if present so cargo run picks up DATABASE_URL, ADMIN_SECRET_CODE, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    let config = AppConfig::from_env();
    tracing::info!("starting license API with {:?} storage", config.store.backend);

    let state = match AppState::from_config(config).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("failed to initialize storage: {}", e);
            std::process::exit(1);
        }
    };

    let app = app(state);

    // Allow tests or deployments to override port via env
    let port = std::env::var("LICENSE_API_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(3000);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {}", bind_addr, e));

    tracing::info!("license API listening on http://{}", bind_addr);

    axum::serve(listener, app).await.expect("server");
}
