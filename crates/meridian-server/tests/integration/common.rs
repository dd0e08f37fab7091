use std::sync::Arc;

use axum::Router;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};

use meridian_core::PoolStats;
use meridian_db::Database;
use meridian_server::routes;
use meridian_server::state::AppState;

pub const TEST_ADMIN_TOKEN: &str = "test-admin-token";

/// Router plus handles tests inspect directly. Dropping `_container` stops PostgreSQL.
pub struct TestApp {
    pub router: Router,
    pub db: Database,
    pub stats: PoolStats,
    _container: ContainerAsync<GenericImage>,
}

pub async fn setup_test_app() -> TestApp {
    build_app(Some(TEST_ADMIN_TOKEN.to_string())).await
}

/// App started without `MERIDIAN_ADMIN_TOKEN`.
pub async fn setup_test_app_no_auth() -> TestApp {
    build_app(None).await
}

async fn build_app(admin_token: Option<String>) -> TestApp {
    let container = GenericImage::new("postgres", "16")
        .with_exposed_port(ContainerPort::Tcp(5432))
        .with_wait_for(WaitFor::message_on_stderr(
            "database system is ready to accept connections",
        ))
        .with_env_var("POSTGRES_PASSWORD", "postgres")
        .with_env_var("POSTGRES_DB", "meridian_test")
        .start()
        .await
        .expect("Failed to start PostgreSQL container");

    let host = container.get_host().await.expect("Failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("Failed to get port");

    let url = format!("postgresql://postgres:postgres@{host}:{port}/meridian_test");
    let db = Database::from_pool(retry_connect(&url).await);
    db.migrate().await.expect("Failed to run migrations");

    let stats = PoolStats::new();
    let state = AppState::new(db.clone(), admin_token).with_workers(stats.clone());

    TestApp {
        router: routes::router(Arc::new(state)),
        db,
        stats,
        _container: container,
    }
}

async fn retry_connect(url: &str) -> PgPool {
    for _ in 0..30 {
        if let Ok(pool) = PgPoolOptions::new().max_connections(5).connect(url).await {
            return pool;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    panic!("Failed to connect to test database");
}
