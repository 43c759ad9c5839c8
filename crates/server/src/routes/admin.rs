use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware as axum_middleware,
    routing::get,
    Json, Router,
};

use crate::{
    error::Result,
    middleware::auth::require_admin,
    query::Page,
    services::users::{self, AdminUserPageQuery, UserResponse},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/:id", axum::routing::delete(delete_user))
        .route_layer(axum_middleware::from_fn(require_admin))
}

async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<AdminUserPageQuery>,
) -> Result<Json<Page<UserResponse>>> {
    let page = users::list_users_for_admin(&state.db.pool, query).await?;
    Ok(Json(page))
}

async fn delete_user(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode> {
    users::admin_delete_user(&state.db.pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
