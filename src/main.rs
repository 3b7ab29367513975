use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use dotenvy::dotenv;
use log::{error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

mod api_router;
mod canvas;
mod directory;
mod shared;
pub mod tests;

use crate::shared::config::AppConfig;
use crate::shared::state::AppState;
use crate::shared::utils::create_conn;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[tokio::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            return Err(std::io::Error::other(e.to_string()));
        }
    };

    let pool = match create_conn(&config.database.url, config.database.max_connections) {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to create database pool: {}", e);
            return Err(std::io::Error::other(e.to_string()));
        }
    };

    {
        let mut conn = pool
            .get()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        match conn.run_pending_migrations(MIGRATIONS) {
            Ok(applied) if !applied.is_empty() => info!("Applied {} migrations", applied.len()),
            Ok(_) => {}
            Err(e) => {
                error!("Migration failure: {}", e);
                return Err(std::io::Error::other(e.to_string()));
            }
        }
    }

    let state = Arc::new(AppState::new(pool, config.clone()));

    let app = api_router::configure_api_routes()
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e: std::net::AddrParseError| std::io::Error::other(e.to_string()))?;

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(
                "Failed to bind to {}: {} - is another instance running?",
                addr, e
            );
            return Err(e);
        }
    };
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutting down");
}
