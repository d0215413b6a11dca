/// Chat Server - real-time group/private chat
///
/// Main server entry point. Handles:
/// - Command-line argument parsing
/// - Database initialization
/// - HTTP and WebSocket server startup
use actix_web::web;
use anyhow::Context;
use chat_server::config::Config;
use chat_server::handlers::ChatServer;
use chat_server::{db, server};
use std::fs;
use std::process;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_default_env()
        .format_timestamp_millis()
        .init();

    let config = Config::from_args();

    log::info!("Starting Chat Server");
    log::info!("Database: {:?}", config.database);
    log::info!("Bind address: {}", config.bind_addr());

    // Write PID file if specified
    if let Some(pidfile) = &config.pidfile {
        let pid = process::id().to_string();
        fs::write(pidfile, pid).context("Failed to write PID file")?;
        log::info!("PID file written to: {:?}", pidfile);
    }

    // Initialize database
    let pool = db::create_pool(
        config
            .database
            .to_str()
            .context("Database path is not valid UTF-8")?,
    )
    .context("Failed to create database pool")?;

    log::info!("Database initialized");

    let pool_data = web::Data::new(pool.clone());
    let chat_server = web::Data::new(ChatServer::new(pool));

    let bind_addr = config.bind_addr();
    log::info!("Starting HTTP server on {}", bind_addr);

    let http_server = server::create_http_server(pool_data, chat_server, &bind_addr)?;
    http_server.await?;
    Ok(())
}
