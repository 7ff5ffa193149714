//! Statuswire - Status-Page Management API
//!
//! CRUD over components, incidents, metrics, and metric points, backed by
//! SQLite.

mod config;
mod db;
mod validation;
mod web;

use config::ServerConfig;
use db::Store;
use web::Server;

use rand::Rng;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("statuswire=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting Statuswire on port {}...", cfg.http_port);
    tracing::info!("Using database at {}", cfg.db_path);

    // Initialize database
    let store = Arc::new(Store::new(&cfg.db_path)?);
    tracing::info!("Database initialized successfully");

    // Seed an admin user so the API is usable out of the box
    if store.count_users()? == 0 {
        let api_key = cfg.bootstrap_token.clone().unwrap_or_else(generate_api_key);
        let user = store.create_user("admin", &api_key)?;
        tracing::info!("Seeded user '{}' with API token: {}", user.username, api_key);
    }

    // Start web server
    let server = Server::new(cfg, store);
    server.start().await?;

    Ok(())
}

/// Generate a random 20-character API key.
fn generate_api_key() -> String {
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(20)
        .map(char::from)
        .collect()
}
