/// REST API handlers for HTTP endpoints.
/// Handles registration, login, user listings, profiles, and group creation.

use crate::auth;
use crate::db::{models::*, Database, DbPool};
use actix_web::{web, HttpResponse, Result as ActixResult};
use serde_json::json;

const MIN_USERNAME_LEN: usize = 3;
const MIN_PASSWORD_LEN: usize = 6;

/// Register a new user
/// POST /register
pub async fn register(
    pool: web::Data<DbPool>,
    req: web::Json<RegisterRequest>,
) -> ActixResult<HttpResponse> {
    let username = req.username.trim();

    if username.len() < MIN_USERNAME_LEN {
        return Ok(HttpResponse::BadRequest().json(json!({
            "error": "Username must be at least 3 characters"
        })));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Ok(HttpResponse::BadRequest().json(json!({
            "error": "Password must be at least 6 characters"
        })));
    }

    let password_hash = match auth::hash_password(&req.password) {
        Ok(h) => h,
        Err(e) => {
            log::error!("Failed to hash password: {}", e);
            return Ok(HttpResponse::InternalServerError().json(json!({
                "error": "Failed to register user"
            })));
        }
    };

    match Database::create_user(&pool, username, &password_hash).await {
        Ok(true) => Ok(HttpResponse::Created().json(json!({
            "username": username
        }))),
        Ok(false) => Ok(HttpResponse::Conflict().json(json!({
            "error": "Username already taken"
        }))),
        Err(e) => {
            log::error!("Failed to register user: {}", e);
            Ok(HttpResponse::InternalServerError().json(json!({
                "error": "Failed to register user"
            })))
        }
    }
}

/// Verify a username/password pair
/// POST /login
pub async fn login(
    pool: web::Data<DbPool>,
    req: web::Json<LoginRequest>,
) -> ActixResult<HttpResponse> {
    let username = req.username.trim();

    if username.is_empty() || req.password.is_empty() {
        return Ok(HttpResponse::BadRequest().json(json!({
            "error": "Username and password are required"
        })));
    }

    match Database::verify_user(&pool, username, &req.password).await {
        Ok(true) => Ok(HttpResponse::Ok().json(json!({
            "username": username
        }))),
        Ok(false) => Ok(HttpResponse::Unauthorized().json(json!({
            "error": "Invalid username or password"
        }))),
        Err(e) => {
            log::error!("Failed to verify user: {}", e);
            Ok(HttpResponse::InternalServerError().json(json!({
                "error": "Failed to verify user"
            })))
        }
    }
}

/// List all registered users for contact pickers
/// GET /users
pub async fn list_users(pool: web::Data<DbPool>) -> ActixResult<HttpResponse> {
    match Database::list_users(&pool).await {
        Ok(users) => Ok(HttpResponse::Ok().json(users)),
        Err(e) => {
            log::error!("Failed to list users: {}", e);
            Ok(HttpResponse::InternalServerError().json(json!({
                "error": "Failed to list users"
            })))
        }
    }
}

/// Profile summary for one user
/// GET /users/:username
pub async fn get_profile(
    pool: web::Data<DbPool>,
    username: web::Path<String>,
) -> ActixResult<HttpResponse> {
    let user = match Database::get_user(&pool, &username).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            return Ok(HttpResponse::NotFound().json(json!({
                "error": "User not found"
            })))
        }
        Err(e) => {
            log::error!("Database error: {}", e);
            return Ok(HttpResponse::InternalServerError().json(json!({
                "error": "Failed to retrieve user"
            })));
        }
    };

    let chats = match Database::list_user_private_chats(&pool, &username).await {
        Ok(c) => c,
        Err(e) => {
            log::error!("Database error: {}", e);
            return Ok(HttpResponse::InternalServerError().json(json!({
                "error": "Failed to retrieve user"
            })));
        }
    };
    let groups = match Database::list_user_groups(&pool, &username).await {
        Ok(g) => g,
        Err(e) => {
            log::error!("Database error: {}", e);
            return Ok(HttpResponse::InternalServerError().json(json!({
                "error": "Failed to retrieve user"
            })));
        }
    };

    let mut contacts: Vec<&str> = chats.iter().map(|c| c.other_user.as_str()).collect();
    contacts.sort();
    contacts.dedup();

    let response = ProfileResponse {
        username: user.username,
        joined_date: user.joined_date,
        last_seen: user.last_seen,
        private_chats_count: chats.len(),
        groups_count: groups.len(),
        contacts_count: contacts.len(),
    };
    Ok(HttpResponse::Ok().json(response))
}

/// Private chat summaries for one user
/// GET /users/:username/chats
pub async fn list_user_chats(
    pool: web::Data<DbPool>,
    username: web::Path<String>,
) -> ActixResult<HttpResponse> {
    match Database::list_user_private_chats(&pool, &username).await {
        Ok(chats) => Ok(HttpResponse::Ok().json(chats)),
        Err(e) => {
            log::error!("Failed to list chats: {}", e);
            Ok(HttpResponse::InternalServerError().json(json!({
                "error": "Failed to list chats"
            })))
        }
    }
}

/// Group summaries for one user
/// GET /users/:username/groups
pub async fn list_user_groups(
    pool: web::Data<DbPool>,
    username: web::Path<String>,
) -> ActixResult<HttpResponse> {
    match Database::list_user_groups(&pool, &username).await {
        Ok(groups) => Ok(HttpResponse::Ok().json(groups)),
        Err(e) => {
            log::error!("Failed to list groups: {}", e);
            Ok(HttpResponse::InternalServerError().json(json!({
                "error": "Failed to list groups"
            })))
        }
    }
}

/// Create a group with an initial member roster
/// POST /groups
pub async fn create_group(
    pool: web::Data<DbPool>,
    req: web::Json<CreateGroupRequest>,
) -> ActixResult<HttpResponse> {
    let name = req.name.trim();

    if name.is_empty() {
        return Ok(HttpResponse::BadRequest().json(json!({
            "error": "Group name is required"
        })));
    }

    match Database::create_group(&pool, name, &req.admin, &req.members).await {
        Ok(group_id) => Ok(HttpResponse::Created().json(CreateGroupResponse { group_id })),
        Err(e) => {
            log::error!("Failed to create group: {}", e);
            Ok(HttpResponse::InternalServerError().json(json!({
                "error": "Failed to create group"
            })))
        }
    }
}

/// Health check endpoint
/// GET /health
pub async fn health() -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({
        "status": "ok"
    })))
}
