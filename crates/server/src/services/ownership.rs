//! Ownership resolution: loads a target entity and proves the acting principal
//! sits at the root of its ownership chain. Every call re-reads persisted
//! state; ownership is never cached.

use sqlx::SqlitePool;

use crate::db::models::{Project, Task};
use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;

/// Loads a project and enforces owner-only access.
pub async fn owned_project(
    pool: &SqlitePool,
    user: &AuthUser,
    project_id: i64,
) -> Result<Project> {
    let project = sqlx::query_as::<_, Project>(
        "SELECT id, owner_id, project_name, status, start_date, end_date \
         FROM projects WHERE id = ?",
    )
    .bind(project_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Project not found.".to_string()))?;

    if project.owner_id != user.id {
        return Err(AppError::Forbidden(
            "Access denied: project does not belong to current user.".to_string(),
        ));
    }

    Ok(project)
}

/// Loads a task and enforces ownership transitively through its parent project.
pub async fn owned_task(pool: &SqlitePool, user: &AuthUser, task_id: i64) -> Result<Task> {
    let task = sqlx::query_as::<_, Task>(
        "SELECT id, project_id, task_name, status, due_date, description \
         FROM tasks WHERE id = ?",
    )
    .bind(task_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Task not found.".to_string()))?;

    let owner_id: i64 = sqlx::query_scalar("SELECT owner_id FROM projects WHERE id = ?")
        .bind(task.project_id)
        .fetch_one(pool)
        .await?;

    if owner_id != user.id {
        return Err(AppError::Forbidden(
            "Access denied: task does not belong to a project of current user.".to_string(),
        ));
    }

    Ok(task)
}
