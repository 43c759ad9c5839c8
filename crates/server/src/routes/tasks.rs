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
    services::tasks::{self, CreateTaskRequest, TaskPageQuery, TaskResponse, UpdateTaskRequest},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", axum::routing::post(create_task))
        .route("/page", get(list_tasks))
        .route("/:id", get(get_task).patch(update_task).delete(delete_task))
}

async fn create_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<i64>,
    Json(body): Json<CreateTaskRequest>,
) -> Result<Json<TaskResponse>> {
    let task = tasks::create_task(&state.db.pool, &user, project_id, body).await?;
    Ok(Json(task))
}

async fn list_tasks(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<i64>,
    Query(query): Query<TaskPageQuery>,
) -> Result<Json<Page<TaskResponse>>> {
    let page = tasks::list_tasks(&state.db.pool, &user, project_id, query).await?;
    Ok(Json(page))
}

async fn get_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path((project_id, id)): Path<(i64, i64)>,
) -> Result<Json<TaskResponse>> {
    let task = tasks::get_task(&state.db.pool, &user, project_id, id).await?;
    Ok(Json(task))
}

async fn update_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path((project_id, id)): Path<(i64, i64)>,
    Json(body): Json<UpdateTaskRequest>,
) -> Result<Json<TaskResponse>> {
    let task = tasks::update_task(&state.db.pool, &user, project_id, id, body).await?;
    Ok(Json(task))
}

async fn delete_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path((project_id, id)): Path<(i64, i64)>,
) -> Result<StatusCode> {
    tasks::delete_task(&state.db.pool, &user, project_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
