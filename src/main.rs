use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use backstage::ai::{gemini::GeminiClient, GenerativeModel};
use backstage::auth::jwt::JwtService;
use backstage::config::AppConfig;
use backstage::db;
use backstage::routes;
use backstage::s3::build_client;
use backstage::state::AppState;
use backstage::storage::{ObjectStorage, S3Storage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        server_host = %config.server_host,
        server_port = config.server_port,
        s3_bucket = %config.s3_bucket,
        gemini_model = %config.gemini_model,
        "loaded backstage configuration"
    );

    let pool = db::init_pool(&config.database_url, config.database_max_pool_size)?;
    let s3_client = build_client(&config).await?;
    let storage: Arc<dyn ObjectStorage> = Arc::new(S3Storage::new(s3_client, config.s3_bucket.clone()));
    let model: Arc<dyn GenerativeModel> = Arc::new(GeminiClient::from_config(&config)?);
    let jwt = JwtService::from_config(&config)?;

    let listen_addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port).parse()?;
    let state = AppState::new(pool, config, storage, model, jwt);
    let router = routes::create_router(state);

    let listener = TcpListener::bind(listen_addr).await?;
    tracing::info!("listening on {}", listen_addr);

    axum::serve(listener, router).await?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
