use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

use crate::{
    error::{AppError, Result},
    middleware::auth::AuthUser,
    query::Page,
    services::files::{self, FilePageQuery, FileResponse, MAX_FILE_SIZE_BYTES},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", axum::routing::post(upload_file))
        .route("/page", get(list_files))
        .route("/:file_id", get(get_file).delete(delete_file))
        // Transport ceiling: bodies beyond this never reach the service and
        // surface as 413. Slack above the service limit covers multipart
        // framing, so the exact 2 MiB boundary stays a service decision.
        .layer(DefaultBodyLimit::max(MAX_FILE_SIZE_BYTES + 64 * 1024))
}

async fn upload_file(
    State(state): State<AppState>,
    user: AuthUser,
    Path(task_id): Path<i64>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<FileResponse>)> {
    let field = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Failed to read multipart field: {e}")))?
        .ok_or_else(|| AppError::Validation("Missing file part.".to_string()))?;

    let filename = field
        .file_name()
        .map(|name| name.to_string())
        .ok_or_else(|| AppError::Validation("File field missing filename.".to_string()))?;
    let content_type = field.content_type().map(|ct| ct.to_string());

    let data = field
        .bytes()
        .await
        .map_err(|e| AppError::Validation(format!("Failed to read file {filename}: {e}")))?;

    let file = files::upload_file(
        &state.db.pool,
        &user,
        task_id,
        &filename,
        content_type,
        &data,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(file)))
}

async fn list_files(
    State(state): State<AppState>,
    user: AuthUser,
    Path(task_id): Path<i64>,
    Query(query): Query<FilePageQuery>,
) -> Result<Json<Page<FileResponse>>> {
    let page = files::list_files(&state.db.pool, &user, task_id, query).await?;
    Ok(Json(page))
}

async fn get_file(
    State(state): State<AppState>,
    user: AuthUser,
    Path((task_id, file_id)): Path<(i64, i64)>,
) -> Result<Json<FileResponse>> {
    let file = files::get_file(&state.db.pool, &user, task_id, file_id).await?;
    Ok(Json(file))
}

async fn delete_file(
    State(state): State<AppState>,
    user: AuthUser,
    Path((task_id, file_id)): Path<(i64, i64)>,
) -> Result<StatusCode> {
    files::delete_file(&state.db.pool, &user, task_id, file_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
