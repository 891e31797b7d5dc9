//! Parts fulfillment server binary

use std::{net::SocketAddr, sync::Arc, time::Duration};

use parts_fulfillment_backend::{
    config::{Config, StorageBackend},
    create_app,
    error::AppError,
    gateway::{InMemoryGateway, PersistenceGateway, PgGateway},
    services::{RandomIds, SystemClock},
    AppState,
};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "parts_server=debug,parts_fulfillment_backend=debug,tower_http=debug,sqlx=warn".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    tracing::info!("Starting Parts Fulfillment Server");
    tracing::info!("Environment: {}", config.environment);

    let gateway = connect_storage(&config).await?;

    // Create application state
    let state = AppState {
        gateway,
        clock: Arc::new(SystemClock),
        ids: Arc::new(RandomIds),
        config: Arc::new(config.clone()),
    };

    // Build application
    let app = create_app(state);

    // Start server
    let host: std::net::IpAddr = config
        .server
        .host
        .parse()
        .map_err(|_| AppError::Configuration(format!("invalid server.host '{}'", config.server.host)))?;
    let addr = SocketAddr::from((host, config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn connect_storage(config: &Config) -> anyhow::Result<Arc<dyn PersistenceGateway>> {
    match config.workflow.storage_backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            Ok(Arc::new(InMemoryGateway::new()))
        }
        StorageBackend::Postgres => {
            if config.database.url.is_empty() {
                return Err(AppError::Configuration("database.url is required".into()).into());
            }

            // Create database connection pool
            tracing::info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(config.database.max_connections)
                .min_connections(config.database.min_connections)
                .acquire_timeout(Duration::from_secs(30))
                .connect(&config.database.url)
                .await?;

            tracing::info!("Database connection established");

            // Run migrations in development
            if config.environment == "development" {
                tracing::info!("Running database migrations...");
                sqlx::migrate!("./migrations").run(&db_pool).await?;
                tracing::info!("Migrations completed");
            }

            Ok(Arc::new(PgGateway::new(db_pool)))
        }
    }
}
