use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::db::models::{Project, ProjectStatus};
use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::query::{resolve_sort_field, Filter, Page, PageRequest, QuerySpec, SortDirection};
use crate::services::ownership;

const SORT_FIELDS: &[(&str, &str)] = &[
    ("projectName", "project_name"),
    ("startDate", "start_date"),
    ("endDate", "end_date"),
];

const COLUMNS: &str = "id, owner_id, project_name, status, start_date, end_date";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    pub project_name: String,
    pub status: ProjectStatus,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProjectRequest {
    pub project_name: Option<String>,
    pub status: Option<ProjectStatus>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectPageQuery {
    #[serde(default)]
    pub page: i64,
    #[serde(default = "default_size")]
    pub size: i64,
    #[serde(default = "default_sort")]
    pub sort_by: String,
    #[serde(default = "default_direction")]
    pub direction: String,
    pub project_name: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: Option<String>,
}

fn default_size() -> i64 {
    20
}

fn default_sort() -> String {
    "projectName".to_string()
}

fn default_direction() -> String {
    "ASC".to_string()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectResponse {
    pub id: i64,
    pub project_name: String,
    pub status: ProjectStatus,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

impl From<Project> for ProjectResponse {
    fn from(project: Project) -> Self {
        Self {
            id: project.id,
            project_name: project.project_name,
            status: project.status,
            start_date: project.start_date,
            end_date: project.end_date,
        }
    }
}

pub async fn create_project(
    pool: &SqlitePool,
    user: &AuthUser,
    request: CreateProjectRequest,
) -> Result<ProjectResponse> {
    let mut fields = BTreeMap::new();
    if request.project_name.trim().is_empty() {
        fields.insert("projectName".to_string(), "must not be blank".to_string());
    } else if request.project_name.len() > 100 {
        fields.insert(
            "projectName".to_string(),
            "length must be at most 100".to_string(),
        );
    }
    if request.start_date < Utc::now().date_naive() {
        fields.insert(
            "startDate".to_string(),
            "must be today or in the future".to_string(),
        );
    }
    if !fields.is_empty() {
        return Err(AppError::FieldValidation(fields));
    }

    if let Some(end_date) = request.end_date {
        if end_date < request.start_date {
            return Err(AppError::Validation(
                "End date must be on or after start date.".to_string(),
            ));
        }
    }

    let id = sqlx::query(
        "INSERT INTO projects (owner_id, project_name, status, start_date, end_date) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(user.id)
    .bind(&request.project_name)
    .bind(request.status)
    .bind(request.start_date)
    .bind(request.end_date)
    .execute(pool)
    .await?
    .last_insert_rowid();

    let project = ownership::owned_project(pool, user, id).await?;
    Ok(project.into())
}

pub async fn list_projects(
    pool: &SqlitePool,
    user: &AuthUser,
    query: ProjectPageQuery,
) -> Result<Page<ProjectResponse>> {
    let page = PageRequest::new(query.page, query.size)?;
    let sort_column = resolve_sort_field(SORT_FIELDS, &query.sort_by)?;
    let direction = SortDirection::parse(&query.direction)?;

    let status = query
        .status
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(ProjectStatus::parse)
        .transpose()?;

    // The owner scope is the security boundary; caller filters AND onto it.
    let spec = QuerySpec::scoped(
        Filter::EqInt {
            column: "owner_id",
            value: user.id,
        },
        page,
    )
    .order_by(sort_column, direction)
    .filter(Filter::contains("project_name", query.project_name.as_deref()))
    .filter(query.start_date.map(|value| Filter::EqDate {
        column: "start_date",
        value,
    }))
    .filter(query.end_date.map(|value| Filter::EqDate {
        column: "end_date",
        value,
    }))
    .filter(status.map(|s| Filter::EqText {
        column: "status",
        value: s.as_str().to_string(),
    }));

    let result = spec.fetch_page::<Project>(pool, "projects", COLUMNS).await?;
    Ok(result.map(ProjectResponse::from))
}

pub async fn get_project(
    pool: &SqlitePool,
    user: &AuthUser,
    project_id: i64,
) -> Result<ProjectResponse> {
    let project = ownership::owned_project(pool, user, project_id).await?;
    Ok(project.into())
}

pub async fn update_project(
    pool: &SqlitePool,
    user: &AuthUser,
    project_id: i64,
    request: UpdateProjectRequest,
) -> Result<ProjectResponse> {
    let current = ownership::owned_project(pool, user, project_id).await?;

    let mut fields = BTreeMap::new();
    if let Some(name) = &request.project_name {
        if name.trim().len() < 3 || name.len() > 255 {
            fields.insert(
                "projectName".to_string(),
                "length must be between 3 and 255".to_string(),
            );
        }
    }
    if let Some(start_date) = request.start_date {
        if start_date < Utc::now().date_naive() {
            fields.insert(
                "startDate".to_string(),
                "must be today or in the future".to_string(),
            );
        }
    }
    if !fields.is_empty() {
        return Err(AppError::FieldValidation(fields));
    }

    // Effective values first, so cross-field rules hold for partial payloads.
    let next_start = request.start_date.unwrap_or(current.start_date);
    let next_end = request.end_date.or(current.end_date);

    if let Some(end_date) = next_end {
        if end_date < next_start {
            return Err(AppError::Validation(
                "End date must be on or after start date.".to_string(),
            ));
        }
    }

    let next_name = request.project_name.unwrap_or(current.project_name);
    let next_status = request.status.unwrap_or(current.status);

    sqlx::query(
        "UPDATE projects SET project_name = ?, status = ?, start_date = ?, end_date = ? \
         WHERE id = ?",
    )
    .bind(&next_name)
    .bind(next_status)
    .bind(next_start)
    .bind(next_end)
    .bind(project_id)
    .execute(pool)
    .await?;

    Ok(ProjectResponse {
        id: project_id,
        project_name: next_name,
        status: next_status,
        start_date: next_start,
        end_date: next_end,
    })
}

/// Deletes a project with its tasks, their files and collaborator rows.
/// The cascade is an explicit ordered multi-delete inside one transaction.
pub async fn delete_project(pool: &SqlitePool, user: &AuthUser, project_id: i64) -> Result<()> {
    ownership::owned_project(pool, user, project_id).await?;

    let mut tx = pool.begin().await?;

    sqlx::query(
        "DELETE FROM files WHERE task_id IN (SELECT id FROM tasks WHERE project_id = ?)",
    )
    .bind(project_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "DELETE FROM collaborations WHERE task_id IN (SELECT id FROM tasks WHERE project_id = ?)",
    )
    .bind(project_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM tasks WHERE project_id = ?")
        .bind(project_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM projects WHERE id = ?")
        .bind(project_id)
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

    fn page_query() -> ProjectPageQuery {
        ProjectPageQuery {
            page: 0,
            size: 20,
            sort_by: "projectName".to_string(),
            direction: "ASC".to_string(),
            project_name: None,
            start_date: None,
            end_date: None,
            status: None,
        }
    }

    fn future(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn create_rejects_end_before_start() {
        let pool = test_pool().await;
        let alice = seed_user(&pool, "alice", Role::User).await;

        let err = create_project(
            &pool,
            &alice,
            CreateProjectRequest {
                project_name: "alpha".to_string(),
                status: ProjectStatus::Active,
                start_date: future(2031, 5, 10),
                end_date: Some(future(2031, 5, 1)),
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn partial_update_validates_effective_dates() {
        let pool = test_pool().await;
        let alice = seed_user(&pool, "alice", Role::User).await;

        let created = create_project(
            &pool,
            &alice,
            CreateProjectRequest {
                project_name: "alpha".to_string(),
                status: ProjectStatus::Active,
                start_date: future(2031, 5, 10),
                end_date: None,
            },
        )
        .await
        .unwrap();

        // Patching only an end date earlier than the stored start date fails.
        let err = update_project(
            &pool,
            &alice,
            created.id,
            UpdateProjectRequest {
                end_date: Some(future(2031, 5, 1)),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        // A consistent end date is accepted and visible on read-back.
        update_project(
            &pool,
            &alice,
            created.id,
            UpdateProjectRequest {
                end_date: Some(future(2031, 6, 1)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let fetched = get_project(&pool, &alice, created.id).await.unwrap();
        assert_eq!(fetched.end_date, Some(future(2031, 6, 1)));
    }

    #[tokio::test]
    async fn listing_is_owner_scoped_and_stably_ordered() {
        let pool = test_pool().await;
        let alice = seed_user(&pool, "alice", Role::User).await;
        let bob = seed_user(&pool, "bob", Role::User).await;

        // Two projects with the same name exercise the id tie-break.
        seed_project(&pool, alice.id, "same").await;
        seed_project(&pool, alice.id, "same").await;
        seed_project(&pool, bob.id, "bobs").await;

        let first = list_projects(&pool, &alice, page_query()).await.unwrap();
        assert_eq!(first.total_elements, 2);
        assert!(first.content.iter().all(|p| p.project_name == "same"));

        let second = list_projects(&pool, &alice, page_query()).await.unwrap();
        let ids: Vec<i64> = first.content.iter().map(|p| p.id).collect();
        let ids_again: Vec<i64> = second.content.iter().map(|p| p.id).collect();
        assert_eq!(ids, ids_again);
        // Equal sort keys fall back to id DESC.
        assert!(ids[0] > ids[1]);
    }

    #[tokio::test]
    async fn list_rejects_unknown_sort_field() {
        let pool = test_pool().await;
        let alice = seed_user(&pool, "alice", Role::User).await;

        let mut query = page_query();
        query.sort_by = "ownerId".to_string();
        let err = list_projects(&pool, &alice, query).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid sort field. Allowed: projectName, startDate, endDate."
        );
    }

    #[tokio::test]
    async fn delete_cascades_tasks_and_children() {
        let pool = test_pool().await;
        let alice = seed_user(&pool, "alice", Role::User).await;
        let carol = seed_user(&pool, "carol", Role::User).await;
        let project_id = seed_project(&pool, alice.id, "alpha").await;
        let task_id = seed_task(&pool, project_id, "t1").await;

        sqlx::query(
            "INSERT INTO files (task_id, filename, file_url, content_type) \
             VALUES (?, 'a.txt', '/blob/x', 'text/plain')",
        )
        .bind(task_id)
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO collaborations (task_id, user_id, responsible) VALUES (?, ?, 1)")
            .bind(task_id)
            .bind(carol.id)
            .execute(&pool)
            .await
            .unwrap();

        delete_project(&pool, &alice, project_id).await.unwrap();

        for table in ["projects", "tasks", "files", "collaborations"] {
            let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
                .fetch_one(&pool)
                .await
                .unwrap();
            assert_eq!(count, 0, "{table} not emptied");
        }
    }
}
