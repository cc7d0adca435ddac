//! Stacks backend entry point

use std::net::SocketAddr;
use std::sync::Arc;

use stacks::app::{AppState, build_app};
use stacks::config::Config;
use stacks::db::Database;
use stacks::jobs;
use stacks::services::{Services, create_metrics_collector, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init_tracing();

    let config = Arc::new(Config::from_env()?);
    tracing::info!(port = config.port, "Starting Stacks backend");

    let db = Database::connect(&config.database_url, config.database_max_connections).await?;
    tracing::info!("Database connected");

    let services = Services::from_config(db.clone(), &config, create_metrics_collector());

    let _scheduler = if config.scheduler_enabled {
        Some(jobs::start_scheduler(services.clone()).await?)
    } else {
        tracing::info!("Job scheduler disabled");
        None
    };

    let state = AppState::new(config.clone(), db, services);
    let app = build_app(state);

    let host: std::net::IpAddr = config
        .host
        .as_deref()
        .unwrap_or("0.0.0.0")
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid HOST: {}", e))?;
    let addr = SocketAddr::new(host, config.port);
    tracing::info!("Listening on {}", addr);
    tracing::info!("GraphQL playground: http://localhost:{}/graphql", config.port);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
