/// HTTP server factory and configuration.
/// Provides a reusable function to create and configure the HTTP server
/// for use in both the main binary and tests.

use crate::db::DbPool;
use crate::handlers::{
    create_group, get_profile, health, list_user_chats, list_user_groups, list_users, login,
    register, ws_connect, ChatServer,
};
use actix_web::{middleware, web, App, HttpServer};

/// Create a configured HTTP server
///
/// Takes a database pool, chat server state, and bind address, then returns
/// a fully configured `HttpServer` ready to be run.
pub fn create_http_server(
    pool: web::Data<DbPool>,
    chat_server: web::Data<ChatServer>,
    bind_addr: &str,
) -> std::io::Result<actix_web::dev::Server> {
    let pool_clone = pool.clone();
    let chat_server_clone = chat_server.clone();

    let server = HttpServer::new(move || {
        App::new()
            .app_data(pool_clone.clone())
            .app_data(chat_server_clone.clone())
            .wrap(middleware::Logger::default())
            // REST endpoints
            .route("/health", web::get().to(health))
            .route("/register", web::post().to(register))
            .route("/login", web::post().to(login))
            .route("/users", web::get().to(list_users))
            .route("/users/{username}", web::get().to(get_profile))
            .route("/users/{username}/chats", web::get().to(list_user_chats))
            .route("/users/{username}/groups", web::get().to(list_user_groups))
            .route("/groups", web::post().to(create_group))
            // WebSocket endpoint
            .route("/ws/{username}", web::get().to(ws_connect))
    })
    .bind(bind_addr)?
    .run();

    Ok(server)
}

/// Create a test HTTP server with an in-memory database, bound to a random
/// available port. Returns the server and its bind address.
pub fn create_test_http_server() -> std::io::Result<(actix_web::dev::Server, String)> {
    let pool = crate::db::create_test_pool();
    let pool_data = web::Data::new(pool.clone());
    let chat_server = web::Data::new(ChatServer::new(pool));

    let bind_addr = "127.0.0.1:0";
    let pool_clone = pool_data.clone();
    let chat_server_clone = chat_server.clone();

    let server = HttpServer::new(move || {
        App::new()
            .app_data(pool_clone.clone())
            .app_data(chat_server_clone.clone())
            .wrap(middleware::Logger::default())
            // REST endpoints
            .route("/health", web::get().to(health))
            .route("/register", web::post().to(register))
            .route("/login", web::post().to(login))
            .route("/users", web::get().to(list_users))
            .route("/users/{username}", web::get().to(get_profile))
            .route("/users/{username}/chats", web::get().to(list_user_chats))
            .route("/users/{username}/groups", web::get().to(list_user_groups))
            .route("/groups", web::post().to(create_group))
            // WebSocket endpoint
            .route("/ws/{username}", web::get().to(ws_connect))
    })
    .bind(bind_addr)?;

    let addrs = server.addrs();
    let addr_str = addrs
        .first()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "No bind address found"))?
        .to_string();

    let server = server.run();

    Ok((server, addr_str))
}
