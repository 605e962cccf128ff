use anyhow::Context;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use eservices::core::seed::{self, ADMIN_EMAIL};
use eservices::core::shared::utils::{create_conn, run_migrations};
use eservices::core::shared::DbPool;
use eservices::{AppConfig, AppState};

const USAGE: &str = "\
Usage: eservices [COMMAND]

Commands:
  serve          Run the web server (default)
  migrate        Apply pending database migrations
  seed-db        Populate departments, services, schools and canned responses
  create-admin   Create the default admin account
  --help, -h     Show this message";

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

fn migrate(pool: &DbPool) -> anyhow::Result<()> {
    run_migrations(pool).map_err(|e| anyhow::anyhow!("Migration failed: {e}"))
}

async fn blocking<T, F>(pool: DbPool, f: F) -> anyhow::Result<T>
where
    F: FnOnce(&DbPool) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&pool)).await?
}

async fn serve(config: AppConfig, pool: DbPool) -> anyhow::Result<()> {
    let pool = blocking(pool, |pool| {
        migrate(pool)?;
        Ok(pool.clone())
    })
    .await?;

    tokio::fs::create_dir_all(&config.uploads.dir)
        .await
        .with_context(|| format!("Cannot create upload directory {}", config.uploads.dir.display()))?;

    let addr = config.bind_address();
    let state = Arc::new(AppState::new(config, pool));
    let router = eservices::web::create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("eservices listening on http://{}", addr);
    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
        })
        .await?;
    Ok(())
}

async fn run(command: &str) -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    let pool = create_conn(&config.database.url, config.database.max_connections)
        .context("Failed to create database pool")?;

    match command {
        "serve" => serve(config, pool).await,
        "migrate" => {
            blocking(pool, migrate).await?;
            println!("Migrations applied.");
            Ok(())
        }
        "seed-db" => {
            let report = blocking(pool, |pool| {
                let mut conn = pool.get()?;
                Ok(seed::seed_database(&mut conn)?)
            })
            .await?;
            println!(
                "Database seeding complete! Added {} departments, {} services, {} schools, {} authorized emails and {} canned responses.",
                report.departments,
                report.services,
                report.schools,
                report.authorized_emails,
                report.canned_responses
            );
            Ok(())
        }
        "create-admin" => {
            let password = config.security.initial_admin_password.clone();
            let created = blocking(pool, move |pool| {
                let mut conn = pool.get()?;
                Ok(seed::create_admin(&mut conn, &password)?)
            })
            .await?;
            if created {
                println!("Admin user created successfully! (Email: {ADMIN_EMAIL})");
            } else {
                println!("Admin user already exists.");
            }
            Ok(())
        }
        other => anyhow::bail!("Unknown command: {other}\nRun 'eservices --help' for usage information"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("serve");
    if matches!(command, "--help" | "-h") {
        println!("{USAGE}");
        return Ok(());
    }

    dotenv().ok();
    init_tracing();

    if let Err(e) = run(command).await {
        error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}
