//! Collaborator assignments and the single-responsible rule: per task at most
//! one collaborator carries `responsible = true`, and responsibility only
//! transfers through an explicit promote-then-remove protocol.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::db::models::Collaborate;
use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::query::{resolve_sort_field, Filter, Page, PageRequest, QuerySpec, SortDirection};
use crate::services::ownership;

// Public API fields map to the joined user's columns.
const SORT_FIELDS: &[(&str, &str)] = &[("username", "u.username"), ("email", "u.email")];

const FROM: &str = "collaborations c JOIN users u ON u.id = c.user_id";
const COLUMNS: &str =
    "c.user_id AS user_id, u.username AS username, u.email AS email, c.responsible AS responsible";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCollaboratorRequest {
    pub user_id: i64,
    pub responsible: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollaboratorPageQuery {
    #[serde(default)]
    pub page: i64,
    #[serde(default = "default_size")]
    pub size: i64,
    #[serde(default = "default_sort")]
    pub sort_by: String,
    #[serde(default = "default_direction")]
    pub direction: String,
    pub username: Option<String>,
    pub email: Option<String>,
}

fn default_size() -> i64 {
    20
}

fn default_sort() -> String {
    "username".to_string()
}

fn default_direction() -> String {
    "ASC".to_string()
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CollaboratorResponse {
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub responsible: bool,
}

async fn collaborator_identity(pool: &SqlitePool, user_id: i64) -> Result<(String, String)> {
    sqlx::query_as::<_, (String, String)>("SELECT username, email FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Collaborator user not found.".to_string()))
}

/// Adds or updates a collaborator on an owned task. Promotion demotes the
/// current responsible row and promotes the target inside one transaction, so
/// no committed state ever holds two responsible rows.
pub async fn add_or_update_collaborator(
    pool: &SqlitePool,
    user: &AuthUser,
    task_id: i64,
    request: AddCollaboratorRequest,
) -> Result<CollaboratorResponse> {
    let task = ownership::owned_task(pool, user, task_id).await?;
    let (username, email) = collaborator_identity(pool, request.user_id).await?;

    let mut tx = pool.begin().await?;

    let existing = sqlx::query_as::<_, Collaborate>(
        "SELECT id, task_id, user_id, responsible FROM collaborations \
         WHERE task_id = ? AND user_id = ?",
    )
    .bind(task.id)
    .bind(request.user_id)
    .fetch_optional(&mut *tx)
    .await?;

    if request.responsible && existing.as_ref().is_some_and(|c| c.responsible) {
        // A stale client view; rejected rather than silently accepted.
        return Err(AppError::Conflict(
            "User is already responsible for this task.".to_string(),
        ));
    }

    if request.responsible {
        sqlx::query(
            "UPDATE collaborations SET responsible = 0 \
             WHERE task_id = ? AND responsible = 1 AND user_id <> ?",
        )
        .bind(task.id)
        .bind(request.user_id)
        .execute(&mut *tx)
        .await?;
    }

    match existing {
        Some(row) => {
            sqlx::query("UPDATE collaborations SET responsible = ? WHERE id = ?")
                .bind(request.responsible)
                .bind(row.id)
                .execute(&mut *tx)
                .await?;
        }
        None => {
            sqlx::query(
                "INSERT INTO collaborations (task_id, user_id, responsible) VALUES (?, ?, ?)",
            )
            .bind(task.id)
            .bind(request.user_id)
            .bind(request.responsible)
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;

    Ok(CollaboratorResponse {
        user_id: request.user_id,
        username,
        email,
        responsible: request.responsible,
    })
}

pub async fn list_collaborators(
    pool: &SqlitePool,
    user: &AuthUser,
    task_id: i64,
    query: CollaboratorPageQuery,
) -> Result<Page<CollaboratorResponse>> {
    let page = PageRequest::new(query.page, query.size)?;
    let sort_column = resolve_sort_field(SORT_FIELDS, &query.sort_by)?;
    let direction = SortDirection::parse(&query.direction)?;

    let task = ownership::owned_task(pool, user, task_id).await?;

    let spec = QuerySpec::scoped(
        Filter::EqInt {
            column: "c.task_id",
            value: task.id,
        },
        page,
    )
    .order_by(sort_column, direction)
    .tie_break("c.id")
    .filter(Filter::contains("u.username", query.username.as_deref()))
    .filter(Filter::contains("u.email", query.email.as_deref()));

    spec.fetch_page::<CollaboratorResponse>(pool, FROM, COLUMNS)
        .await
}

pub async fn get_responsible(
    pool: &SqlitePool,
    user: &AuthUser,
    task_id: i64,
) -> Result<CollaboratorResponse> {
    let task = ownership::owned_task(pool, user, task_id).await?;

    sqlx::query_as::<_, CollaboratorResponse>(&format!(
        "SELECT {COLUMNS} FROM {FROM} WHERE c.task_id = ? AND c.responsible = 1"
    ))
    .bind(task.id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| {
        AppError::NotFound("No responsible collaborator defined for this task.".to_string())
    })
}

/// Removes a collaborator. The responsible row cannot be removed without a
/// replacement, and the single-responsible invariant means a replacement can
/// never already exist; callers must promote first, then remove. The read,
/// the responsibility check and the delete share one transaction so a
/// concurrent promotion cannot land between check and delete.
pub async fn remove_collaborator(
    pool: &SqlitePool,
    user: &AuthUser,
    task_id: i64,
    collaborator_id: i64,
) -> Result<()> {
    let task = ownership::owned_task(pool, user, task_id).await?;
    collaborator_identity(pool, collaborator_id).await?;

    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, Collaborate>(
        "SELECT id, task_id, user_id, responsible FROM collaborations \
         WHERE task_id = ? AND user_id = ?",
    )
    .bind(task.id)
    .bind(collaborator_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound("Collaborator not found for this task.".to_string()))?;

    if row.responsible {
        let replacement: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM collaborations \
             WHERE task_id = ? AND responsible = 1 AND user_id <> ?",
        )
        .bind(task.id)
        .bind(collaborator_id)
        .fetch_optional(&mut *tx)
        .await?;

        if replacement.is_none() {
            return Err(AppError::Conflict(
                "Cannot remove the responsible collaborator without assigning another responsible first."
                    .to_string(),
            ));
        }
    }

    sqlx::query("DELETE FROM collaborations WHERE id = ?")
        .bind(row.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}
