use std::collections::BTreeMap;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::db::models::{Role, User};
use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::query::{resolve_sort_field, Filter, Page, PageRequest, QuerySpec, SortDirection};

const ADMIN_SORT_FIELDS: &[(&str, &str)] = &[
    ("username", "username"),
    ("email", "email"),
    ("creationDate", "creation_date"),
];

const COLUMNS: &str = "id, role, username, email, password_hash, creation_date";

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSearchQuery {
    #[serde(default)]
    pub page: i64,
    #[serde(default = "default_size")]
    pub size: i64,
    pub username: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUserPageQuery {
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
    pub creation_date: Option<NaiveDate>,
    pub role: Option<String>,
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

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: Role,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role,
        }
    }
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct UserSearchResponse {
    pub username: String,
    pub email: String,
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|_| AppError::Internal("Failed to hash password".to_string()))
}

fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

fn password_meets_policy(password: &str) -> bool {
    let len_ok = (8..=100).contains(&password.len());
    let lower = password.chars().any(|c| c.is_ascii_lowercase());
    let upper = password.chars().any(|c| c.is_ascii_uppercase());
    let digit = password.chars().any(|c| c.is_ascii_digit());
    let special = password
        .chars()
        .any(|c| "@$!%*?&#.^()-_=+".contains(c));
    len_ok && lower && upper && digit && special
}

fn validate_registration(request: &RegisterRequest) -> Result<()> {
    let mut fields = BTreeMap::new();

    let username = request.username.trim();
    if username.len() < 3 || username.len() > 50 {
        fields.insert(
            "username".to_string(),
            "length must be between 3 and 50".to_string(),
        );
    }
    if request.email.len() > 254 || !request.email.contains('@') {
        fields.insert(
            "email".to_string(),
            "must be a well-formed email address".to_string(),
        );
    }
    if !password_meets_policy(&request.password) {
        fields.insert(
            "password".to_string(),
            "Password must contain upper and lower case letters, a digit and a special character."
                .to_string(),
        );
    }

    if fields.is_empty() {
        Ok(())
    } else {
        Err(AppError::FieldValidation(fields))
    }
}

/// Registers a USER account after uniqueness checks and password hashing.
/// Username is checked before email, so a duplicate of both reports the
/// username conflict.
pub async fn register_user(pool: &SqlitePool, request: RegisterRequest) -> Result<UserResponse> {
    validate_registration(&request)?;

    let username_taken: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE username = ?")
        .bind(&request.username)
        .fetch_one(pool)
        .await?;
    if username_taken > 0 {
        return Err(AppError::Conflict("Username is already taken.".to_string()));
    }

    let email_taken: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ?")
        .bind(&request.email)
        .fetch_one(pool)
        .await?;
    if email_taken > 0 {
        return Err(AppError::Conflict("Email is already in use.".to_string()));
    }

    let password_hash = hash_password(&request.password)?;

    let id = sqlx::query(
        "INSERT INTO users (role, username, email, password_hash, creation_date) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(Role::User)
    .bind(&request.username)
    .bind(&request.email)
    .bind(&password_hash)
    .bind(Utc::now())
    .execute(pool)
    .await?
    .last_insert_rowid();

    Ok(UserResponse {
        id,
        username: request.username,
        email: request.email,
        role: Role::User,
    })
}

/// Authenticates by username first, then email fallback. Absent principal and
/// hash mismatch collapse into the same error so neither leaks which failed.
pub async fn authenticate(pool: &SqlitePool, identifier: &str, password: &str) -> Result<User> {
    let invalid = || AppError::Validation("Invalid username/email or password.".to_string());

    let mut user = sqlx::query_as::<_, User>(&format!(
        "SELECT {COLUMNS} FROM users WHERE username = ?"
    ))
    .bind(identifier)
    .fetch_optional(pool)
    .await?;

    if user.is_none() {
        user = sqlx::query_as::<_, User>(&format!("SELECT {COLUMNS} FROM users WHERE email = ?"))
            .bind(identifier)
            .fetch_optional(pool)
            .await?;
    }

    let user = user.ok_or_else(invalid)?;

    if !verify_password(password, &user.password_hash)? {
        return Err(invalid());
    }

    Ok(user)
}

pub async fn get_profile(pool: &SqlitePool, user: &AuthUser) -> Result<UserResponse> {
    let user = sqlx::query_as::<_, User>(&format!("SELECT {COLUMNS} FROM users WHERE id = ?"))
        .bind(user.id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found.".to_string()))?;
    Ok(user.into())
}

/// Only the email attribute is editable; it must differ from the current
/// value and stay globally unique.
pub async fn update_profile(
    pool: &SqlitePool,
    user: &AuthUser,
    request: UpdateProfileRequest,
) -> Result<UserResponse> {
    let mut current = sqlx::query_as::<_, User>(&format!("SELECT {COLUMNS} FROM users WHERE id = ?"))
        .bind(user.id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found.".to_string()))?;

    if let Some(email) = request.email {
        if email.len() > 254 || !email.contains('@') {
            return Err(AppError::FieldValidation(BTreeMap::from([(
                "email".to_string(),
                "must be a well-formed email address".to_string(),
            )])));
        }
        if email == current.email {
            return Err(AppError::Validation(
                "New email must be different from current email.".to_string(),
            ));
        }
        let taken: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ?")
            .bind(&email)
            .fetch_one(pool)
            .await?;
        if taken > 0 {
            return Err(AppError::Conflict("Email is already in use.".to_string()));
        }

        sqlx::query("UPDATE users SET email = ? WHERE id = ?")
            .bind(&email)
            .bind(user.id)
            .execute(pool)
            .await?;
        current.email = email;
    }

    Ok(current.into())
}

/// Searches other users by username/email substring; the caller is excluded
/// and ordering is fixed to `username ASC` with the id tie-break.
pub async fn search_users(
    pool: &SqlitePool,
    user: &AuthUser,
    query: UserSearchQuery,
) -> Result<Page<UserSearchResponse>> {
    let page = PageRequest::new(query.page, query.size)?;

    let spec = QuerySpec::scoped(
        Filter::NeInt {
            column: "id",
            value: user.id,
        },
        page,
    )
    .order_by("username", SortDirection::Asc)
    .filter(Filter::contains("username", query.username.as_deref()))
    .filter(Filter::contains("email", query.email.as_deref()));

    spec.fetch_page::<UserSearchResponse>(pool, "users", "username, email")
        .await
}

/// Admin listing over all accounts; the admin role itself is enforced by the
/// route layer, not here.
pub async fn list_users_for_admin(
    pool: &SqlitePool,
    query: AdminUserPageQuery,
) -> Result<Page<UserResponse>> {
    let page = PageRequest::new(query.page, query.size)?;
    let sort_column = resolve_sort_field(ADMIN_SORT_FIELDS, &query.sort_by)?;
    let direction = SortDirection::parse(&query.direction)?;

    let role = query
        .role
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(Role::parse)
        .transpose()?;

    let creation_window = query.creation_date.map(|date| {
        // Match accounts created during the requested UTC day.
        let from = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap());
        let to = Utc.from_utc_datetime(&(date + chrono::Days::new(1)).and_hms_opt(0, 0, 0).unwrap());
        Filter::TimestampWithin {
            column: "creation_date",
            from,
            to,
        }
    });

    let spec = QuerySpec::unscoped(page)
        .order_by(sort_column, direction)
        .filter(Filter::contains("username", query.username.as_deref()))
        .filter(Filter::contains("email", query.email.as_deref()))
        .filter(creation_window)
        .filter(role.map(|r| Filter::EqText {
            column: "role",
            value: r.as_str().to_string(),
        }));

    let result = spec.fetch_page::<User>(pool, "users", COLUMNS).await?;
    Ok(result.map(UserResponse::from))
}

/// Deletes a non-admin account and everything the account owns.
pub async fn admin_delete_user(pool: &SqlitePool, user_id: i64) -> Result<()> {
    let user = sqlx::query_as::<_, User>(&format!("SELECT {COLUMNS} FROM users WHERE id = ?"))
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found.".to_string()))?;

    if user.role == Role::Admin {
        return Err(AppError::Conflict(
            "Admin accounts cannot be deleted.".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    sqlx::query(
        "DELETE FROM files WHERE task_id IN \
         (SELECT t.id FROM tasks t JOIN projects p ON p.id = t.project_id WHERE p.owner_id = ?)",
    )
    .bind(user_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "DELETE FROM collaborations WHERE task_id IN \
         (SELECT t.id FROM tasks t JOIN projects p ON p.id = t.project_id WHERE p.owner_id = ?)",
    )
    .bind(user_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "DELETE FROM tasks WHERE project_id IN (SELECT id FROM projects WHERE owner_id = ?)",
    )
    .bind(user_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM projects WHERE owner_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    // Rows where the account participates as a collaborator on foreign tasks.
    sqlx::query("DELETE FROM collaborations WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::services::testutil::{seed_project, seed_task, seed_user};

    fn register(username: &str, email: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: "Str0ng&Pass".to_string(),
        }
    }

    #[tokio::test]
    async fn registration_reports_username_conflict_before_email() {
        let pool = test_pool().await;

        register_user(&pool, register("alice", "alice@example.com"))
            .await
            .unwrap();

        let err = register_user(&pool, register("bob", "alice@example.com"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Email is already in use.");

        let err = register_user(&pool, register("alice", "other@example.com"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Username is already taken.");
    }

    #[tokio::test]
    async fn weak_passwords_are_rejected_with_a_field_error() {
        let pool = test_pool().await;
        let mut request = register("alice", "alice@example.com");
        request.password = "alllowercase1".to_string();

        let err = register_user(&pool, request).await.unwrap_err();
        match err {
            AppError::FieldValidation(fields) => assert!(fields.contains_key("password")),
            other => panic!("expected field validation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn authentication_falls_back_to_email_and_never_leaks_which_failed() {
        let pool = test_pool().await;
        register_user(&pool, register("alice", "alice@example.com"))
            .await
            .unwrap();

        let by_username = authenticate(&pool, "alice", "Str0ng&Pass").await.unwrap();
        let by_email = authenticate(&pool, "alice@example.com", "Str0ng&Pass")
            .await
            .unwrap();
        assert_eq!(by_username.id, by_email.id);

        let missing = authenticate(&pool, "nobody", "Str0ng&Pass")
            .await
            .unwrap_err();
        let wrong = authenticate(&pool, "alice", "Wrong&Pass1").await.unwrap_err();
        assert_eq!(missing.to_string(), wrong.to_string());
    }

    #[tokio::test]
    async fn profile_email_change_must_differ_and_stay_unique() {
        let pool = test_pool().await;
        let alice = register_user(&pool, register("alice", "alice@example.com"))
            .await
            .unwrap();
        register_user(&pool, register("bob", "bob@example.com"))
            .await
            .unwrap();

        let principal = AuthUser {
            id: alice.id,
            username: "alice".to_string(),
            role: Role::User,
        };

        let err = update_profile(
            &pool,
            &principal,
            UpdateProfileRequest {
                email: Some("alice@example.com".to_string()),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = update_profile(
            &pool,
            &principal,
            UpdateProfileRequest {
                email: Some("bob@example.com".to_string()),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let updated = update_profile(
            &pool,
            &principal,
            UpdateProfileRequest {
                email: Some("new@example.com".to_string()),
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.email, "new@example.com");
    }

    #[tokio::test]
    async fn search_excludes_the_caller() {
        let pool = test_pool().await;
        let alice = seed_user(&pool, "alice", Role::User).await;
        seed_user(&pool, "alicia", Role::User).await;
        seed_user(&pool, "bob", Role::User).await;

        let page = search_users(
            &pool,
            &alice,
            UserSearchQuery {
                page: 0,
                size: 20,
                username: Some("ali".to_string()),
                email: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(page.total_elements, 1);
        assert_eq!(page.content[0].username, "alicia");
    }

    #[tokio::test]
    async fn admin_delete_refuses_admin_accounts_and_cascades_user_data() {
        let pool = test_pool().await;
        let admin = seed_user(&pool, "root", Role::Admin).await;
        let victim = seed_user(&pool, "victim", Role::User).await;
        let project = seed_project(&pool, victim.id, "p").await;
        seed_task(&pool, project, "t").await;

        let err = admin_delete_user(&pool, admin.id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        assert!(matches!(
            admin_delete_user(&pool, 9999).await,
            Err(AppError::NotFound(_))
        ));

        admin_delete_user(&pool, victim.id).await.unwrap();
        let projects: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM projects")
            .fetch_one(&pool)
            .await
            .unwrap();
        let tasks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!((projects, tasks), (0, 0));
    }

    #[tokio::test]
    async fn admin_listing_filters_by_role_and_creation_day() {
        let pool = test_pool().await;
        seed_user(&pool, "root", Role::Admin).await;
        seed_user(&pool, "alice", Role::User).await;

        let query = AdminUserPageQuery {
            page: 0,
            size: 20,
            sort_by: "username".to_string(),
            direction: "ASC".to_string(),
            username: None,
            email: None,
            creation_date: Some(Utc::now().date_naive()),
            role: Some("admin".to_string()),
        };
        let page = list_users_for_admin(&pool, query).await.unwrap();
        assert_eq!(page.total_elements, 1);
        assert_eq!(page.content[0].username, "root");

        let query = AdminUserPageQuery {
            page: 0,
            size: 20,
            sort_by: "password".to_string(),
            direction: "ASC".to_string(),
            username: None,
            email: None,
            creation_date: None,
            role: None,
        };
        let err = list_users_for_admin(&pool, query).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid sort field. Allowed: username, email, creationDate."
        );
    }
}
