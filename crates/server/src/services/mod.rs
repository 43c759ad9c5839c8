pub mod collaborate;
pub mod files;
pub mod ownership;
pub mod projects;
pub mod tasks;
pub mod users;

#[cfg(test)]
pub(crate) mod testutil {
    use chrono::{NaiveDate, Utc};
    use sqlx::SqlitePool;

    use crate::db::models::Role;
    use crate::middleware::auth::AuthUser;

    pub async fn seed_user(pool: &SqlitePool, username: &str, role: Role) -> AuthUser {
        let email = format!("{username}@example.com");
        let id = sqlx::query(
            "INSERT INTO users (role, username, email, password_hash, creation_date) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(role)
        .bind(username)
        .bind(&email)
        .bind("$argon2$test-hash")
        .bind(Utc::now())
        .execute(pool)
        .await
        .expect("insert user")
        .last_insert_rowid();

        AuthUser {
            id,
            username: username.to_string(),
            role,
        }
    }

    pub async fn seed_project(pool: &SqlitePool, owner_id: i64, name: &str) -> i64 {
        sqlx::query(
            "INSERT INTO projects (owner_id, project_name, status, start_date, end_date) \
             VALUES (?, ?, 'ACTIVE', ?, NULL)",
        )
        .bind(owner_id)
        .bind(name)
        .bind(NaiveDate::from_ymd_opt(2030, 1, 1).unwrap())
        .execute(pool)
        .await
        .expect("insert project")
        .last_insert_rowid()
    }

    pub async fn seed_task(pool: &SqlitePool, project_id: i64, name: &str) -> i64 {
        sqlx::query(
            "INSERT INTO tasks (project_id, task_name, status, due_date, description) \
             VALUES (?, ?, 'TODO', ?, NULL)",
        )
        .bind(project_id)
        .bind(name)
        .bind(NaiveDate::from_ymd_opt(2030, 6, 1).unwrap())
        .execute(pool)
        .await
        .expect("insert task")
        .last_insert_rowid()
    }
}
