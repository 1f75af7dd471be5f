use std::sync::Arc;

use grading_checkout::{
    checkout::{AuditLogger, CheckoutEngine, CheckoutMetrics, Stores},
    config::{AppConfig, GatewayConfig},
    create_router, db,
    payments::{PaymentGateway, SimulatedGateway, StripeConfig, StripeGateway},
    stores::{MemoryStore, PgStore},
    AppState,
};

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Initialize tracing subscriber; RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with_target(false)
        .with_level(true)
        .init();

    tracing::info!("Grading checkout service - Starting...");

    let config = AppConfig::from_env().expect("Invalid configuration");

    // Storage: PostgreSQL when configured, otherwise process memory
    let (stores, audit) = match &config.database_url {
        Some(database_url) => {
            tracing::info!("Connecting to database...");
            let pool = db::create_pool(database_url)
                .await
                .expect("Failed to create database pool");
            db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");

            let store = Arc::new(PgStore::new(pool.clone()));
            (Stores::shared(store), AuditLogger::new(Some(pool)))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory store");
            (Stores::shared(Arc::new(MemoryStore::new())), AuditLogger::new(None))
        }
    };

    let gateway: Arc<dyn PaymentGateway> = match &config.gateway {
        GatewayConfig::Stripe {
            secret_key,
            api_base,
        } => {
            tracing::info!("Using Stripe payment gateway at {}", api_base);
            Arc::new(StripeGateway::new(StripeConfig {
                secret_key: secret_key.clone(),
                api_base: api_base.clone(),
            }))
        }
        GatewayConfig::Simulated => {
            tracing::warn!("Using simulated payment gateway");
            Arc::new(SimulatedGateway::new())
        }
    };

    let engine = CheckoutEngine::new(
        stores,
        gateway,
        config.checkout_settings(),
        audit,
        CheckoutMetrics::new(),
    );
    let state = AppState::new(engine);
    let metrics = state.engine.metrics().clone();
    let app = create_router(state);

    // Start the Axum server
    let addr = config.bind_address();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Grading checkout service is running on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    metrics.log_summary();
    tracing::info!("Grading checkout service stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}
