// Rookery server binary

use std::sync::Arc;

use anyhow::{Context, Result};
use rookery_engine::{Controller, ControllerConfig};
use rookery_server::{router, ApiKeyIdentity, AppState, ServerConfig, Validator};
use rookery_storage::{InMemoryRepository, PostgresRepository, Repository};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rookery=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env().context("reading server configuration")?;

    let repo: Arc<dyn Repository> = match &config.database_url {
        Some(url) => {
            info!("using PostgreSQL repository");
            Arc::new(
                PostgresRepository::connect(url)
                    .await
                    .context("connecting to database")?,
            )
        }
        None => {
            info!("no DATABASE_URL set, using in-memory repository");
            Arc::new(InMemoryRepository::new())
        }
    };

    let controller_config = ControllerConfig::new()
        .with_sweeper_period(config.sweeper_period)
        .with_generator_period(config.generator_period)
        .with_cron_period(config.cron_period)
        .with_executor_reregister(config.allow_executor_reregister);
    let controller = Arc::new(Controller::new(Arc::clone(&repo), controller_config));

    let state = AppState {
        controller: Arc::clone(&controller),
        validator: Arc::new(Validator::new(repo, config.server_owner_id.clone())),
        recovery: Arc::new(ApiKeyIdentity),
    };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.addr)
        .await
        .with_context(|| format!("binding {}", config.addr))?;
    info!("listening on {}", config.addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving")?;

    controller.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
