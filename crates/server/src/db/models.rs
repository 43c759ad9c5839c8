use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    /// Parses free-case filter input; request convenience, storage stays canonical.
    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value.trim().to_uppercase().as_str() {
            "USER" => Ok(Role::User),
            "ADMIN" => Ok(Role::Admin),
            _ => Err(AppError::Validation(
                "Invalid role value. Allowed: USER, ADMIN.".to_string(),
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectStatus {
    Active,
    Paused,
    Completed,
}

impl ProjectStatus {
    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value.trim().to_uppercase().as_str() {
            "ACTIVE" => Ok(ProjectStatus::Active),
            "PAUSED" => Ok(ProjectStatus::Paused),
            "COMPLETED" => Ok(ProjectStatus::Completed),
            _ => Err(AppError::Validation(
                "Invalid status value. Allowed: ACTIVE, PAUSED, COMPLETED.".to_string(),
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Active => "ACTIVE",
            ProjectStatus::Paused => "PAUSED",
            ProjectStatus::Completed => "COMPLETED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
}

impl TaskStatus {
    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value.trim().to_uppercase().as_str() {
            "TODO" => Ok(TaskStatus::Todo),
            "IN_PROGRESS" => Ok(TaskStatus::InProgress),
            "DONE" => Ok(TaskStatus::Done),
            _ => Err(AppError::Validation(
                "Invalid status value. Allowed: TODO, IN_PROGRESS, DONE.".to_string(),
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "TODO",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Done => "DONE",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub role: Role,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub creation_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Project {
    pub id: i64,
    pub owner_id: i64,
    pub project_name: String,
    pub status: ProjectStatus,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Task {
    pub id: i64,
    pub project_id: i64,
    pub task_name: String,
    pub status: TaskStatus,
    pub due_date: NaiveDate,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoredFile {
    pub id: i64,
    pub task_id: i64,
    pub filename: String,
    pub file_url: String,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Collaborate {
    pub id: i64,
    pub task_id: i64,
    pub user_id: i64,
    pub responsible: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parsing_is_case_insensitive() {
        assert_eq!(ProjectStatus::parse("active").unwrap(), ProjectStatus::Active);
        assert_eq!(ProjectStatus::parse(" Paused ").unwrap(), ProjectStatus::Paused);
        assert_eq!(TaskStatus::parse("in_progress").unwrap(), TaskStatus::InProgress);
        assert_eq!(Role::parse("admin").unwrap(), Role::Admin);
    }

    #[test]
    fn unknown_values_name_the_allowed_set() {
        let err = ProjectStatus::parse("archived").unwrap_err();
        assert!(err.to_string().contains("ACTIVE, PAUSED, COMPLETED"));
        let err = TaskStatus::parse("blocked").unwrap_err();
        assert!(err.to_string().contains("TODO, IN_PROGRESS, DONE"));
        let err = Role::parse("root").unwrap_err();
        assert!(err.to_string().contains("USER, ADMIN"));
    }
}
