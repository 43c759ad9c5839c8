use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::StoredFile;
use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::query::{resolve_sort_field, Filter, Page, PageRequest, QuerySpec, SortDirection};
use crate::services::ownership;

pub const MAX_FILE_SIZE_BYTES: usize = 2 * 1024 * 1024;

const SORT_FIELDS: &[(&str, &str)] = &[("filename", "filename")];

const COLUMNS: &str = "id, task_id, filename, file_url, content_type";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePageQuery {
    #[serde(default)]
    pub page: i64,
    #[serde(default = "default_size")]
    pub size: i64,
    #[serde(default = "default_sort")]
    pub sort_by: String,
    #[serde(default = "default_direction")]
    pub direction: String,
    pub filename: Option<String>,
}

fn default_size() -> i64 {
    20
}

fn default_sort() -> String {
    "filename".to_string()
}

fn default_direction() -> String {
    "ASC".to_string()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResponse {
    pub id: i64,
    pub filename: String,
    pub file_url: String,
    pub content_type: Option<String>,
}

impl From<StoredFile> for FileResponse {
    fn from(file: StoredFile) -> Self {
        Self {
            id: file.id,
            filename: file.filename,
            file_url: file.file_url,
            content_type: file.content_type,
        }
    }
}

fn ensure_in_task(file: &StoredFile, task_id: i64) -> Result<()> {
    if file.task_id != task_id {
        return Err(AppError::Validation(
            "File does not belong to the specified task.".to_string(),
        ));
    }
    Ok(())
}

/// Records upload metadata under an owned task. The payload checks run before
/// ownership resolution; bytes themselves live in blob storage, the service
/// only keeps the opaque reference.
pub async fn upload_file(
    pool: &SqlitePool,
    user: &AuthUser,
    task_id: i64,
    filename: &str,
    content_type: Option<String>,
    data: &[u8],
) -> Result<FileResponse> {
    if data.is_empty() {
        return Err(AppError::Validation("File is empty.".to_string()));
    }
    if data.len() > MAX_FILE_SIZE_BYTES {
        return Err(AppError::Validation(
            "File exceeds maximum size of 2MB.".to_string(),
        ));
    }

    let task = ownership::owned_task(pool, user, task_id).await?;

    let file_url = format!("/blob/tasks/{}/{}/{}", task.id, Uuid::new_v4(), filename);

    let id = sqlx::query(
        "INSERT INTO files (task_id, filename, file_url, content_type) VALUES (?, ?, ?, ?)",
    )
    .bind(task.id)
    .bind(filename)
    .bind(&file_url)
    .bind(&content_type)
    .execute(pool)
    .await?
    .last_insert_rowid();

    Ok(FileResponse {
        id,
        filename: filename.to_string(),
        file_url,
        content_type,
    })
}

pub async fn list_files(
    pool: &SqlitePool,
    user: &AuthUser,
    task_id: i64,
    query: FilePageQuery,
) -> Result<Page<FileResponse>> {
    let page = PageRequest::new(query.page, query.size)?;
    let sort_column = resolve_sort_field(SORT_FIELDS, &query.sort_by)?;
    let direction = SortDirection::parse(&query.direction)?;

    let task = ownership::owned_task(pool, user, task_id).await?;

    let spec = QuerySpec::scoped(
        Filter::EqInt {
            column: "task_id",
            value: task.id,
        },
        page,
    )
    .order_by(sort_column, direction)
    .filter(Filter::contains("filename", query.filename.as_deref()));

    let result = spec.fetch_page::<StoredFile>(pool, "files", COLUMNS).await?;
    Ok(result.map(FileResponse::from))
}

pub async fn get_file(
    pool: &SqlitePool,
    user: &AuthUser,
    task_id: i64,
    file_id: i64,
) -> Result<FileResponse> {
    let task = ownership::owned_task(pool, user, task_id).await?;

    let file = sqlx::query_as::<_, StoredFile>(&format!(
        "SELECT {COLUMNS} FROM files WHERE id = ?"
    ))
    .bind(file_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("File not found.".to_string()))?;

    ensure_in_task(&file, task.id)?;
    Ok(file.into())
}

pub async fn delete_file(
    pool: &SqlitePool,
    user: &AuthUser,
    task_id: i64,
    file_id: i64,
) -> Result<()> {
    let task = ownership::owned_task(pool, user, task_id).await?;

    let file = sqlx::query_as::<_, StoredFile>(&format!(
        "SELECT {COLUMNS} FROM files WHERE id = ?"
    ))
    .bind(file_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("File not found.".to_string()))?;

    ensure_in_task(&file, task.id)?;

    sqlx::query("DELETE FROM files WHERE id = ?")
        .bind(file_id)
        .execute(pool)
        .await?;

    Ok(())
}
