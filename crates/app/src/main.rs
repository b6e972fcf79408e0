use std::{sync::Arc, time::Duration};

use migration::{Migrator, MigratorTrait};
use sea_orm::ConnectOptions;
use settings::Database;

mod settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let settings = settings::Settings::new()?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "campusride={level},server={level},engine={level},migration={level}",
            level = settings.app.level
        ))
        .init();

    let db = parse_database(&settings.server.database).await?;
    let engine = Arc::new(engine::Engine::builder().database(db).build().await?);

    let gateway = engine::HttpGateway::new(
        &settings.gateway.base_url,
        &settings.gateway.secret_key,
        settings.gateway.verify_timeout(),
    )?;
    let reconciler =
        engine::WebhookReconciler::new(engine.clone(), Arc::new(gateway), &settings.gateway.secret_key)
            .currency(&settings.gateway.currency)
            .verify_timeout(settings.gateway.verify_timeout());

    let bind = settings
        .server
        .bind
        .clone()
        .unwrap_or_else(|| "127.0.0.1".to_string());
    let listener = tokio::net::TcpListener::bind(format!("{}:{}", bind, settings.server.port)).await?;

    let state = server::ServerState::new(engine, reconciler);
    tokio::select! {
        result = server::run_with_listener(state, listener, settings.notifications.probe_interval()) => {
            if let Err(err) = result {
                tracing::error!("server failed: {err}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
        }
    }

    Ok(())
}

async fn parse_database(
    config: &Database,
) -> Result<sea_orm::DatabaseConnection, Box<dyn std::error::Error + Send + Sync>> {
    let url = match config {
        Database::Memory => String::from("sqlite::memory:"),
        Database::Sqlite(path) => format!("sqlite:{}?mode=rwc", path),
    };

    // SQLite has a single writer: one pooled connection keeps write
    // transactions from failing with SQLITE_BUSY on lock upgrade.
    let mut options = ConnectOptions::new(url);
    options
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .sqlx_logging(false);

    let database = sea_orm::Database::connect(options).await?;
    Migrator::up(&database, None).await?;
    tracing::info!("database ready");
    Ok(database)
}
