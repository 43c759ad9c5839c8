use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

use crate::{
    error::Result,
    middleware::auth::AuthUser,
    query::Page,
    services::collaborate::{
        self, AddCollaboratorRequest, CollaboratorPageQuery, CollaboratorResponse,
    },
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_collaborators).post(add_collaborator))
        .route("/responsible", get(get_responsible))
        .route("/:user_id", axum::routing::delete(remove_collaborator))
}

async fn add_collaborator(
    State(state): State<AppState>,
    user: AuthUser,
    Path(task_id): Path<i64>,
    Json(body): Json<AddCollaboratorRequest>,
) -> Result<(StatusCode, Json<CollaboratorResponse>)> {
    let collaborator =
        collaborate::add_or_update_collaborator(&state.db.pool, &user, task_id, body).await?;
    Ok((StatusCode::CREATED, Json(collaborator)))
}

async fn list_collaborators(
    State(state): State<AppState>,
    user: AuthUser,
    Path(task_id): Path<i64>,
    Query(query): Query<CollaboratorPageQuery>,
) -> Result<Json<Page<CollaboratorResponse>>> {
    let page = collaborate::list_collaborators(&state.db.pool, &user, task_id, query).await?;
    Ok(Json(page))
}

async fn get_responsible(
    State(state): State<AppState>,
    user: AuthUser,
    Path(task_id): Path<i64>,
) -> Result<Json<CollaboratorResponse>> {
    let responsible = collaborate::get_responsible(&state.db.pool, &user, task_id).await?;
    Ok(Json(responsible))
}

async fn remove_collaborator(
    State(state): State<AppState>,
    user: AuthUser,
    Path((task_id, user_id)): Path<(i64, i64)>,
) -> Result<StatusCode> {
    collaborate::remove_collaborator(&state.db.pool, &user, task_id, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
