use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use super::{with_deadline, DataError, DataResult};
use crate::validator::{matches_email, Validator};

/// A bcrypt password hash. The plaintext is never kept.
#[derive(Clone)]
pub struct Password {
    hash: String,
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}

impl Password {
    pub fn from_hash(hash: String) -> Self {
        Self { hash }
    }

    pub fn hash_str(&self) -> &str {
        &self.hash
    }

    /// Hashes `plaintext` on the blocking pool.
    pub async fn set(plaintext: &str, cost: u32) -> anyhow::Result<Self> {
        let plaintext = plaintext.to_owned();
        let hash = tokio::task::spawn_blocking(move || bcrypt::hash(plaintext, cost)).await??;
        Ok(Self { hash })
    }

    pub async fn matches(&self, plaintext: &str) -> anyhow::Result<bool> {
        let plaintext = plaintext.to_owned();
        let hash = self.hash.clone();
        let ok = tokio::task::spawn_blocking(move || bcrypt::verify(plaintext, &hash)).await??;
        Ok(ok)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password: Password,
    pub activated: bool,
    #[serde(skip)]
    pub version: i64,
}

/// Fields needed to create a user row.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: Password,
    pub activated: bool,
}

pub fn validate_email(v: &mut Validator, email: &str) {
    v.check(email.is_empty(), "email", "must be provided");
    v.check(!matches_email(email), "email", "must be a valid email address");
}

pub fn validate_password_plaintext(v: &mut Validator, password: &str) {
    v.check(password.is_empty(), "password", "must be provided");
    v.check(password.len() < 8, "password", "must be at least 8 bytes long");
    v.check(password.len() > 72, "password", "must not be more than 72 bytes long");
}

pub fn validate_user(v: &mut Validator, name: &str, email: &str, password: &str) {
    v.check(name.is_empty(), "name", "must be provided");
    v.check(name.len() > 500, "name", "must not be more than 500 bytes long");
    validate_email(v, email);
    validate_password_plaintext(v, password);
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: NewUser) -> DataResult<User>;
    async fn get(&self, id: i64) -> DataResult<User>;
    async fn get_by_email(&self, email: &str) -> DataResult<User>;
    /// Optimistic update keyed on `user.version`; bumps the version on success.
    async fn update(&self, user: &mut User) -> DataResult<()>;
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    created_at: DateTime<Utc>,
    name: String,
    email: String,
    password_hash: String,
    activated: bool,
    version: i64,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            created_at: row.created_at,
            name: row.name,
            email: row.email,
            password: Password::from_hash(row.password_hash),
            activated: row.activated,
            version: row.version,
        }
    }
}

const USER_COLUMNS: &str = "id, created_at, name, email, password_hash, activated, version";

fn map_unique(err: DataError) -> DataError {
    match err {
        DataError::Sqlx(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            DataError::DuplicateEmail
        }
        other => other,
    }
}

#[derive(Clone)]
pub struct UserModel {
    db: SqlitePool,
}

impl UserModel {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for UserModel {
    async fn insert(&self, user: NewUser) -> DataResult<User> {
        let query = format!(
            "INSERT INTO users (name, email, password_hash, activated) VALUES (?1, ?2, ?3, ?4) RETURNING {}",
            USER_COLUMNS
        );
        let row = with_deadline(
            sqlx::query_as::<_, UserRow>(&query)
                .bind(&user.name)
                .bind(&user.email)
                .bind(user.password.hash_str())
                .bind(user.activated)
                .fetch_one(&self.db),
        )
        .await
        .map_err(map_unique)?;
        Ok(row.into())
    }

    async fn get(&self, id: i64) -> DataResult<User> {
        if id < 1 {
            return Err(DataError::RecordNotFound);
        }
        let query = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
        let row = with_deadline(sqlx::query_as::<_, UserRow>(&query).bind(id).fetch_one(&self.db)).await?;
        Ok(row.into())
    }

    async fn get_by_email(&self, email: &str) -> DataResult<User> {
        let query = format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS);
        let row =
            with_deadline(sqlx::query_as::<_, UserRow>(&query).bind(email).fetch_one(&self.db)).await?;
        Ok(row.into())
    }

    async fn update(&self, user: &mut User) -> DataResult<()> {
        let version: Option<i64> = with_deadline(
            sqlx::query_scalar(
                r#"UPDATE users
                   SET name = ?1, email = ?2, password_hash = ?3, activated = ?4, version = version + 1
                   WHERE id = ?5 AND version = ?6
                   RETURNING version"#,
            )
            .bind(&user.name)
            .bind(&user.email)
            .bind(user.password.hash_str())
            .bind(user.activated)
            .bind(user.id)
            .bind(user.version)
            .fetch_optional(&self.db),
        )
        .await
        .map_err(map_unique)?;

        match version {
            Some(v) => {
                user.version = v;
                Ok(())
            }
            None => Err(DataError::EditConflict),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_validation_collects_one_message_per_field() {
        let mut v = Validator::new();
        validate_user(&mut v, "", "nope", "short");
        let errors = v.into_errors();
        assert_eq!(errors["name"], "must be provided");
        assert_eq!(errors["email"], "must be a valid email address");
        assert_eq!(errors["password"], "must be at least 8 bytes long");
    }

    #[test]
    fn empty_password_reports_missing_first() {
        let mut v = Validator::new();
        validate_password_plaintext(&mut v, "");
        assert_eq!(v.errors()["password"], "must be provided");
    }

    #[tokio::test]
    async fn password_round_trip() {
        let password = Password::set("pa55word-long", 4).await.unwrap();
        assert!(password.matches("pa55word-long").await.unwrap());
        assert!(!password.matches("something-else").await.unwrap());
        assert_eq!(format!("{:?}", password), "Password(<redacted>)");
    }
}
