use coverdesk_api::config::config;
use coverdesk_api::middleware::PipelineConfig;
use coverdesk_api::{app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, CENTRAL_DOMAINS, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    let config = config();
    tracing::info!("Starting Coverdesk API in {:?} mode", config.environment);

    let pipeline = PipelineConfig::from_app_config(config);
    let state = match std::env::var("STORAGE").as_deref() {
        Ok("memory") => {
            tracing::warn!("STORAGE=memory: all data is process-local and volatile");
            AppState::in_memory(pipeline)
        }
        _ => AppState::postgres(pipeline),
    };

    let app = app(state);

    // Allow tests or deployments to override port via env
    let port = std::env::var("COVERDESK_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(3000);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    tracing::info!("Coverdesk API listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
