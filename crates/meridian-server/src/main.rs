use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use meridian_db::{Database, DatabaseConfig};
use meridian_server::routes;
use meridian_server::state::AppState;
use meridian_server::workers::WorkerOptions;

#[derive(Parser)]
#[command(name = "meridian-server", version, about = "Meridian job API and worker host")]
struct ServerArgs {
    /// Address to listen on
    #[arg(long, env = "MERIDIAN_BIND", default_value = "0.0.0.0:3000")]
    bind: String,

    /// Bearer token for the /v1 routes
    #[arg(long, env = "MERIDIAN_ADMIN_TOKEN", hide_env_values = true)]
    admin_token: Option<String>,

    /// Serve the API only, without an in-process worker pool
    #[arg(long, default_value_t = false)]
    no_workers: bool,

    #[command(flatten)]
    workers: WorkerOptions,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("meridian=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = ServerArgs::parse();

    let db = Database::connect(&DatabaseConfig::from_env()?).await?;
    db.migrate().await?;

    if args.admin_token.is_none() {
        tracing::warn!("MERIDIAN_ADMIN_TOKEN not set; /v1 routes will answer 403");
    }
    let mut state = AppState::new(db.clone(), args.admin_token);

    let pool = if args.no_workers {
        None
    } else {
        let pool = args.workers.start_pool(&db).await?;
        state = state.with_workers(pool.stats());
        Some(pool)
    };

    let app = routes::router(Arc::new(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!(bind = %args.bind, "Starting server");
    let listener = TcpListener::bind(&args.bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(pool) = pool {
        pool.shutdown().await;
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
