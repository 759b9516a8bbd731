//! services/api/src/web/favorites.rs
//!
//! Authenticated favorites endpoints: list, strict add/remove, and the
//! idempotent toggle. The authenticated user id arrives via request
//! extensions from the auth middleware.

use crate::web::protocol::{port_error_response, ApiEnvelope, ErrorResponse};
use crate::web::rest::BookPayload;
use crate::web::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct FavoriteRequest {
    pub book_id: i64,
}

#[derive(Serialize, ToSchema)]
pub struct FavoriteData {
    pub book_id: i64,
    pub favorited: bool,
}

#[derive(Serialize, ToSchema)]
pub struct FavoriteEntry {
    pub book: BookPayload,
    pub favorited_at: DateTime<Utc>,
}

#[derive(Serialize, ToSchema)]
pub struct FavoritesListData {
    pub favorites: Vec<FavoriteEntry>,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET /favorites - The authenticated user's favorites, newest first.
#[utoipa::path(
    get,
    path = "/favorites",
    security(("bearer_token" = [])),
    responses(
        (status = 200, description = "The user's favorites", body = ApiEnvelope<FavoritesListData>),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub async fn list_favorites_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let favorites = app_state
        .favorites
        .list(user_id)
        .await
        .map_err(port_error_response)?;

    let data = FavoritesListData {
        favorites: favorites
            .into_iter()
            .map(|f| FavoriteEntry {
                book: BookPayload::from(f.book),
                favorited_at: f.favorited_at,
            })
            .collect(),
    };
    Ok(Json(ApiEnvelope::data(data)))
}

/// POST /favorites - Add a favorite; a duplicate is a conflict, not a no-op.
#[utoipa::path(
    post,
    path = "/favorites",
    request_body = FavoriteRequest,
    security(("bearer_token" = [])),
    responses(
        (status = 201, description = "Favorite added", body = ApiEnvelope<FavoriteData>),
        (status = 404, description = "Unknown book"),
        (status = 409, description = "Already favorited"),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub async fn add_favorite_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<FavoriteRequest>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let favorite = app_state
        .favorites
        .add(user_id, req.book_id)
        .await
        .map_err(port_error_response)?;

    Ok((
        StatusCode::CREATED,
        Json(ApiEnvelope::data(FavoriteData {
            book_id: favorite.book_id,
            favorited: true,
        })),
    ))
}

/// POST /favorites/toggle - Flip the favorite state, reporting the result.
#[utoipa::path(
    post,
    path = "/favorites/toggle",
    request_body = FavoriteRequest,
    security(("bearer_token" = [])),
    responses(
        (status = 200, description = "The resulting favorite state", body = ApiEnvelope<FavoriteData>),
        (status = 404, description = "Unknown book"),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub async fn toggle_favorite_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<FavoriteRequest>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let favorited = app_state
        .favorites
        .toggle(user_id, req.book_id)
        .await
        .map_err(port_error_response)?;

    Ok(Json(ApiEnvelope::data(FavoriteData {
        book_id: req.book_id,
        favorited,
    })))
}

/// DELETE /favorites/{book_id} - Remove a favorite.
#[utoipa::path(
    delete,
    path = "/favorites/{book_id}",
    params(
        ("book_id" = i64, Path, description = "Internal id of the favorited book.")
    ),
    security(("bearer_token" = [])),
    responses(
        (status = 200, description = "Favorite removed"),
        (status = 404, description = "Not favorited or unknown book"),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub async fn remove_favorite_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(book_id): Path<i64>,
) -> Result<impl IntoResponse, ErrorResponse> {
    app_state
        .favorites
        .remove(user_id, book_id)
        .await
        .map_err(port_error_response)?;

    Ok(Json(ApiEnvelope::<serde_json::Value>::message(
        "Favorite removed",
    )))
}
