use anyhow::Result;
use gslas_api::{create_app, start_mail_relay_task, Config, SpoolTransport};
use gslas_orchestrator::db::{backup_database, create_pool, run_migrations};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = gslas_logging::init_subscriber();

    info!("Starting gslas-api service...");

    let config = Config::from_env();
    info!(
        "Configuration loaded: bind_addr={}, db_path={}, admins={}",
        config.bind_addr,
        config.db_path.display(),
        config.admins.len()
    );

    let db_path = &config.db_path;

    // Backup before migrations
    if db_path.exists() {
        let backup_path = backup_database(db_path)?;
        info!("Database backed up to: {}", backup_path.display());
    }

    let pool = create_pool(db_path).await?;
    info!("Running database migrations...");
    run_migrations(&pool).await?;
    info!("Migrations complete");

    let transport = Arc::new(SpoolTransport::new(config.mail_spool.clone()));
    info!("Mail spool: {}", transport.dir().display());
    tokio::spawn(start_mail_relay_task(
        pool.clone(),
        transport,
        config.mail_from.clone(),
        config.mail_interval_secs,
    ));

    let bind_addr = config.bind_addr.clone();
    let app = create_app(pool, config).await?;

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
