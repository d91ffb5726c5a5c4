use std::time::Duration;

use migration::{Migrator, MigratorTrait};

mod settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let settings = settings::Settings::new()?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "quest_shop={level},engine={level}",
            level = settings.app.level
        ))
        .init();

    let db = connect(&settings.database).await?;
    let engine = engine::Engine::builder()
        .database(db)
        .config(settings.engine.config())
        .build()
        .await?;
    tracing::info!(config = ?engine.config(), "engine ready");

    let period = Duration::from_secs(settings.maintenance.purge_interval_secs.max(1));
    let mut purge = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = purge.tick() => {
                if let Err(err) = engine.purge_expired_idempotency_keys().await {
                    tracing::error!("failed to purge idempotency keys: {err}");
                }
            }
            res = tokio::signal::ctrl_c() => {
                res?;
                tracing::info!("shutting down");
                break;
            }
        }
    }

    Ok(())
}

async fn connect(
    config: &settings::Database,
) -> Result<sea_orm::DatabaseConnection, Box<dyn std::error::Error + Send + Sync>> {
    let database = sea_orm::Database::connect(config.url()).await?;
    Migrator::up(&database, None).await?;
    Ok(database)
}
