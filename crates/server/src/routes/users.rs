use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};

use crate::{
    error::Result,
    middleware::auth::AuthUser,
    query::Page,
    services::users::{self, UpdateProfileRequest, UserResponse, UserSearchQuery, UserSearchResponse},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/me", get(me).patch(update_me))
        .route("/search", get(search))
}

async fn me(State(state): State<AppState>, user: AuthUser) -> Result<Json<UserResponse>> {
    let profile = users::get_profile(&state.db.pool, &user).await?;
    Ok(Json(profile))
}

async fn update_me(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>> {
    let profile = users::update_profile(&state.db.pool, &user, body).await?;
    Ok(Json(profile))
}

async fn search(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<UserSearchQuery>,
) -> Result<Json<Page<UserSearchResponse>>> {
    let page = users::search_users(&state.db.pool, &user, query).await?;
    Ok(Json(page))
}
