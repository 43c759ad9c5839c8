use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::db::models::{Task, TaskStatus};
use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::query::{resolve_sort_field, Filter, Page, PageRequest, QuerySpec, SortDirection};
use crate::services::ownership;

const SORT_FIELDS: &[(&str, &str)] = &[("taskName", "task_name"), ("dueDate", "due_date")];

const COLUMNS: &str = "id, project_id, task_name, status, due_date, description";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub task_name: String,
    pub status: TaskStatus,
    pub due_date: NaiveDate,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    pub task_name: Option<String>,
    pub status: Option<TaskStatus>,
    pub due_date: Option<NaiveDate>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPageQuery {
    #[serde(default)]
    pub page: i64,
    #[serde(default = "default_size")]
    pub size: i64,
    #[serde(default = "default_sort")]
    pub sort_by: String,
    #[serde(default = "default_direction")]
    pub direction: String,
    pub task_name: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub status: Option<String>,
}

fn default_size() -> i64 {
    20
}

fn default_sort() -> String {
    "taskName".to_string()
}

fn default_direction() -> String {
    "ASC".to_string()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResponse {
    pub id: i64,
    pub task_name: String,
    pub status: TaskStatus,
    pub due_date: NaiveDate,
    pub description: Option<String>,
    pub project_id: i64,
}

impl From<Task> for TaskResponse {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            task_name: task.task_name,
            status: task.status,
            due_date: task.due_date,
            description: task.description,
            project_id: task.project_id,
        }
    }
}

/// Guards against id confusion: the leaf may be owned, yet named under a
/// sibling parent in the path.
fn ensure_in_project(task: &Task, project_id: i64) -> Result<()> {
    if task.project_id != project_id {
        return Err(AppError::Validation(
            "Task does not belong to the specified project.".to_string(),
        ));
    }
    Ok(())
}

pub async fn create_task(
    pool: &SqlitePool,
    user: &AuthUser,
    project_id: i64,
    request: CreateTaskRequest,
) -> Result<TaskResponse> {
    let mut fields = BTreeMap::new();
    if request.task_name.trim().is_empty() {
        fields.insert("taskName".to_string(), "must not be blank".to_string());
    } else if request.task_name.len() > 100 {
        fields.insert(
            "taskName".to_string(),
            "length must be at most 100".to_string(),
        );
    }
    if request.due_date < Utc::now().date_naive() {
        fields.insert(
            "dueDate".to_string(),
            "must be today or in the future".to_string(),
        );
    }
    if let Some(description) = &request.description {
        if description.len() > 1000 {
            fields.insert(
                "description".to_string(),
                "length must be at most 1000".to_string(),
            );
        }
    }
    if !fields.is_empty() {
        return Err(AppError::FieldValidation(fields));
    }

    let project = ownership::owned_project(pool, user, project_id).await?;

    let id = sqlx::query(
        "INSERT INTO tasks (project_id, task_name, status, due_date, description) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(project.id)
    .bind(&request.task_name)
    .bind(request.status)
    .bind(request.due_date)
    .bind(&request.description)
    .execute(pool)
    .await?
    .last_insert_rowid();

    Ok(TaskResponse {
        id,
        task_name: request.task_name,
        status: request.status,
        due_date: request.due_date,
        description: request.description,
        project_id: project.id,
    })
}

pub async fn list_tasks(
    pool: &SqlitePool,
    user: &AuthUser,
    project_id: i64,
    query: TaskPageQuery,
) -> Result<Page<TaskResponse>> {
    let page = PageRequest::new(query.page, query.size)?;
    let sort_column = resolve_sort_field(SORT_FIELDS, &query.sort_by)?;
    let direction = SortDirection::parse(&query.direction)?;

    let status = query
        .status
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(TaskStatus::parse)
        .transpose()?;

    let project = ownership::owned_project(pool, user, project_id).await?;

    // Scope to the resolved owned project; filters cannot widen it.
    let spec = QuerySpec::scoped(
        Filter::EqInt {
            column: "project_id",
            value: project.id,
        },
        page,
    )
    .order_by(sort_column, direction)
    .filter(Filter::contains("task_name", query.task_name.as_deref()))
    .filter(query.due_date.map(|value| Filter::EqDate {
        column: "due_date",
        value,
    }))
    .filter(status.map(|s| Filter::EqText {
        column: "status",
        value: s.as_str().to_string(),
    }));

    let result = spec.fetch_page::<Task>(pool, "tasks", COLUMNS).await?;
    Ok(result.map(TaskResponse::from))
}

pub async fn get_task(
    pool: &SqlitePool,
    user: &AuthUser,
    project_id: i64,
    task_id: i64,
) -> Result<TaskResponse> {
    let project = ownership::owned_project(pool, user, project_id).await?;
    let task = ownership::owned_task(pool, user, task_id).await?;
    ensure_in_project(&task, project.id)?;
    Ok(task.into())
}

pub async fn update_task(
    pool: &SqlitePool,
    user: &AuthUser,
    project_id: i64,
    task_id: i64,
    request: UpdateTaskRequest,
) -> Result<TaskResponse> {
    let project = ownership::owned_project(pool, user, project_id).await?;
    let current = ownership::owned_task(pool, user, task_id).await?;
    ensure_in_project(&current, project.id)?;

    let mut fields = BTreeMap::new();
    if let Some(name) = &request.task_name {
        if name.trim().len() < 3 || name.len() > 255 {
            fields.insert(
                "taskName".to_string(),
                "length must be between 3 and 255".to_string(),
            );
        }
    }
    if let Some(due_date) = request.due_date {
        if due_date < Utc::now().date_naive() {
            fields.insert(
                "dueDate".to_string(),
                "must be today or in the future".to_string(),
            );
        }
    }
    if let Some(description) = &request.description {
        if description.len() > 1000 {
            fields.insert(
                "description".to_string(),
                "length must be at most 1000".to_string(),
            );
        }
    }
    if !fields.is_empty() {
        return Err(AppError::FieldValidation(fields));
    }

    let next_name = request.task_name.unwrap_or(current.task_name);
    let next_status = request.status.unwrap_or(current.status);
    let next_due = request.due_date.unwrap_or(current.due_date);
    let next_description = request.description.or(current.description);

    sqlx::query(
        "UPDATE tasks SET task_name = ?, status = ?, due_date = ?, description = ? WHERE id = ?",
    )
    .bind(&next_name)
    .bind(next_status)
    .bind(next_due)
    .bind(&next_description)
    .bind(task_id)
    .execute(pool)
    .await?;

    Ok(TaskResponse {
        id: task_id,
        task_name: next_name,
        status: next_status,
        due_date: next_due,
        description: next_description,
        project_id: current.project_id,
    })
}

/// Deletes a task together with its files and collaborator rows in one
/// transaction; a partial cascade must never become visible.
pub async fn delete_task(
    pool: &SqlitePool,
    user: &AuthUser,
    project_id: i64,
    task_id: i64,
) -> Result<()> {
    let project = ownership::owned_project(pool, user, project_id).await?;
    let task = ownership::owned_task(pool, user, task_id).await?;
    ensure_in_project(&task, project.id)?;

    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM files WHERE task_id = ?")
        .bind(task_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM collaborations WHERE task_id = ?")
        .bind(task_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM tasks WHERE id = ?")
        .bind(task_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Role;
    use crate::db::test_pool;
    use crate::services::testutil::{seed_project, seed_task, seed_user};

    fn page_query() -> TaskPageQuery {
        TaskPageQuery {
            page: 0,
            size: 20,
            sort_by: "taskName".to_string(),
            direction: "ASC".to_string(),
            task_name: None,
            due_date: None,
            status: None,
        }
    }

    #[tokio::test]
    async fn path_mismatch_is_distinct_from_foreign_ownership() {
        let pool = test_pool().await;
        let alice = seed_user(&pool, "alice", Role::User).await;
        let bob = seed_user(&pool, "bob", Role::User).await;

        let first = seed_project(&pool, alice.id, "first").await;
        let second = seed_project(&pool, alice.id, "second").await;
        let task_in_second = seed_task(&pool, second, "t").await;

        let bobs_project = seed_project(&pool, bob.id, "bobs").await;
        let bobs_task = seed_task(&pool, bobs_project, "bt").await;

        // Owned leaf named under the wrong (but owned) parent: bad request.
        let err = get_task(&pool, &alice, first, task_in_second)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(err.to_string().contains("does not belong to the specified"));

        // Leaf owned by someone else entirely: access denied.
        let err = get_task(&pool, &alice, first, bobs_task).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn listing_filters_by_status_case_insensitively() {
        let pool = test_pool().await;
        let alice = seed_user(&pool, "alice", Role::User).await;
        let project = seed_project(&pool, alice.id, "alpha").await;
        seed_task(&pool, project, "write docs").await;
        let done = seed_task(&pool, project, "ship it").await;
        sqlx::query("UPDATE tasks SET status = 'DONE' WHERE id = ?")
            .bind(done)
            .execute(&pool)
            .await
            .unwrap();

        let mut query = page_query();
        query.status = Some("done".to_string());
        let page = list_tasks(&pool, &alice, project, query).await.unwrap();
        assert_eq!(page.total_elements, 1);
        assert_eq!(page.content[0].id, done);

        let mut query = page_query();
        query.status = Some("archived".to_string());
        let err = list_tasks(&pool, &alice, project, query).await.unwrap_err();
        assert!(err.to_string().contains("TODO, IN_PROGRESS, DONE"));
    }

    #[tokio::test]
    async fn update_patches_only_present_fields() {
        let pool = test_pool().await;
        let alice = seed_user(&pool, "alice", Role::User).await;
        let project = seed_project(&pool, alice.id, "alpha").await;
        let task_id = seed_task(&pool, project, "original name").await;

        let updated = update_task(
            &pool,
            &alice,
            project,
            task_id,
            UpdateTaskRequest {
                status: Some(TaskStatus::InProgress),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.task_name, "original name");
        assert_eq!(updated.status, TaskStatus::InProgress);
    }

    #[tokio::test]
    async fn delete_removes_files_and_collaborations() {
        let pool = test_pool().await;
        let alice = seed_user(&pool, "alice", Role::User).await;
        let carol = seed_user(&pool, "carol", Role::User).await;
        let project = seed_project(&pool, alice.id, "alpha").await;
        let task_id = seed_task(&pool, project, "t").await;

        sqlx::query(
            "INSERT INTO files (task_id, filename, file_url, content_type) \
             VALUES (?, 'a.txt', '/blob/x', NULL)",
        )
        .bind(task_id)
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO collaborations (task_id, user_id, responsible) VALUES (?, ?, 0)")
            .bind(task_id)
            .bind(carol.id)
            .execute(&pool)
            .await
            .unwrap();

        delete_task(&pool, &alice, project, task_id).await.unwrap();

        let files: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files")
            .fetch_one(&pool)
            .await
            .unwrap();
        let collabs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM collaborations")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!((files, collabs), (0, 0));
    }
}
