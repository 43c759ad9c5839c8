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
    services::projects::{
        self, CreateProjectRequest, ProjectPageQuery, ProjectResponse, UpdateProjectRequest,
    },
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", axum::routing::post(create_project))
        .route("/page", get(list_projects))
        .route(
            "/:id",
            get(get_project).patch(update_project).delete(delete_project),
        )
}

async fn create_project(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CreateProjectRequest>,
) -> Result<Json<ProjectResponse>> {
    let project = projects::create_project(&state.db.pool, &user, body).await?;
    Ok(Json(project))
}

async fn list_projects(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ProjectPageQuery>,
) -> Result<Json<Page<ProjectResponse>>> {
    let page = projects::list_projects(&state.db.pool, &user, query).await?;
    Ok(Json(page))
}

async fn get_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ProjectResponse>> {
    let project = projects::get_project(&state.db.pool, &user, id).await?;
    Ok(Json(project))
}

async fn update_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateProjectRequest>,
) -> Result<Json<ProjectResponse>> {
    let project = projects::update_project(&state.db.pool, &user, id, body).await?;
    Ok(Json(project))
}

async fn delete_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    projects::delete_project(&state.db.pool, &user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
