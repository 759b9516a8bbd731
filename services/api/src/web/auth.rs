//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for user signup, login, logout and account
//! deletion. Sessions are database-backed bearer tokens returned in the
//! response body.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use book_discovery_core::domain::AuthSession;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::middleware::bearer_token;
use crate::web::protocol::{
    error_response, port_error_response, ApiEnvelope, ErrorResponse, FieldErrors,
};
use crate::web::state::AppState;

/// How long an issued token stays valid.
const SESSION_LIFETIME_DAYS: i64 = 30;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthData {
    pub user_id: Uuid,
    pub email: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

fn validate_credentials(email: &str, password: &str) -> Result<(), ErrorResponse> {
    let mut errors = FieldErrors::default();
    if !email.contains('@') {
        errors.push("email", "A valid email address is required");
    }
    if password.len() < 8 {
        errors.push("password", "Password must be at least 8 characters");
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.into_response())
    }
}

async fn issue_session(
    state: &AppState,
    user_id: Uuid,
) -> Result<AuthSession, ErrorResponse> {
    let session = AuthSession {
        token: Uuid::new_v4().to_string(),
        user_id,
        expires_at: Utc::now() + Duration::days(SESSION_LIFETIME_DAYS),
    };
    state
        .users
        .create_auth_session(&session)
        .await
        .map_err(|e| {
            error!("Failed to create auth session: {:?}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create session")
        })?;
    Ok(session)
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/signup - Create a new user account
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created successfully", body = ApiEnvelope<AuthData>),
        (status = 409, description = "Email already registered"),
        (status = 422, description = "Invalid email or password")
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, ErrorResponse> {
    validate_credentials(&req.email, &req.password)?;

    // 1. Hash the password
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to hash password")
        })?
        .to_string();

    // 2. Create user in database
    let user = state
        .users
        .create_user_with_email(&req.email, &password_hash)
        .await
        .map_err(port_error_response)?;

    // 3. Issue the bearer token
    let session = issue_session(&state, user.user_id).await?;

    let response = AuthData {
        user_id: user.user_id,
        email: user.email.unwrap_or_default(),
        token: session.token,
        expires_at: session.expires_at,
    };
    Ok((StatusCode::CREATED, Json(ApiEnvelope::data(response))))
}

/// POST /auth/login - Login with existing account
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = ApiEnvelope<AuthData>),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ErrorResponse> {
    // 1. Get user by email
    let user_creds = state
        .users
        .get_user_by_email(&req.email)
        .await
        .map_err(|e| {
            error!("Failed to get user: {:?}", e);
            error_response(StatusCode::UNAUTHORIZED, "Invalid email or password")
        })?;

    // 2. Verify password
    let parsed_hash = PasswordHash::new(&user_creds.hashed_password).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Authentication error")
    })?;

    let valid = Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .is_ok();

    if !valid {
        return Err(error_response(
            StatusCode::UNAUTHORIZED,
            "Invalid email or password",
        ));
    }

    // 3. Issue the bearer token
    let session = issue_session(&state, user_creds.user_id).await?;

    let response = AuthData {
        user_id: user_creds.user_id,
        email: user_creds.email,
        token: session.token,
        expires_at: session.expires_at,
    };
    Ok((StatusCode::OK, Json(ApiEnvelope::data(response))))
}

/// POST /auth/logout - Invalidate the presented token
#[utoipa::path(
    post,
    path = "/auth/logout",
    security(("bearer_token" = [])),
    responses(
        (status = 200, description = "Logout successful"),
        (status = 401, description = "No token presented")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ErrorResponse> {
    let token = bearer_token(&headers)
        .ok_or_else(|| error_response(StatusCode::UNAUTHORIZED, "No session found"))?;

    state
        .users
        .delete_auth_session(token)
        .await
        .map_err(|e| {
            error!("Failed to delete auth session: {:?}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to logout")
        })?;

    Ok(Json(ApiEnvelope::<serde_json::Value>::message(
        "Logged out",
    )))
}

/// DELETE /auth/account - Delete the authenticated account.
///
/// Favorites and sessions cascade with it. Unlike the read paths, this
/// mutation surfaces failures explicitly: silently "succeeding" at an
/// account deletion would be misleading.
#[utoipa::path(
    delete,
    path = "/auth/account",
    security(("bearer_token" = [])),
    responses(
        (status = 200, description = "Account deleted"),
        (status = 401, description = "Missing or invalid token"),
        (status = 500, description = "Deletion failed")
    )
)]
pub async fn delete_account_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, ErrorResponse> {
    state
        .users
        .delete_user(user_id)
        .await
        .map_err(port_error_response)?;

    Ok(Json(ApiEnvelope::<serde_json::Value>::message(
        "Account deleted",
    )))
}
