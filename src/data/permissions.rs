use async_trait::async_trait;
use sqlx::SqlitePool;

use super::{with_deadline, DataResult};

/// Permission codes held by a user, e.g. `songs:create`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permissions(Vec<String>);

impl Permissions {
    pub fn includes(&self, code: &str) -> bool {
        self.0.iter().any(|c| c == code)
    }
}

impl From<Vec<String>> for Permissions {
    fn from(codes: Vec<String>) -> Self {
        Self(codes)
    }
}

#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn get_all_for_user(&self, user_id: i64) -> DataResult<Permissions>;
    async fn add_for_user(&self, user_id: i64, codes: &[&str]) -> DataResult<()>;
}

#[derive(Clone)]
pub struct PermissionModel {
    db: SqlitePool,
}

impl PermissionModel {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PermissionStore for PermissionModel {
    async fn get_all_for_user(&self, user_id: i64) -> DataResult<Permissions> {
        let codes: Vec<String> = with_deadline(
            sqlx::query_scalar(
                r#"SELECT permissions.code FROM permissions
                   INNER JOIN users_permissions ON users_permissions.permission_id = permissions.id
                   WHERE users_permissions.user_id = ?1
                   ORDER BY permissions.code"#,
            )
            .bind(user_id)
            .fetch_all(&self.db),
        )
        .await?;
        Ok(Permissions(codes))
    }

    async fn add_for_user(&self, user_id: i64, codes: &[&str]) -> DataResult<()> {
        let db = self.db.clone();
        let codes: Vec<String> = codes.iter().map(|c| c.to_string()).collect();
        with_deadline(async move {
            let mut tx = db.begin().await?;
            for code in &codes {
                sqlx::query(
                    r#"INSERT OR IGNORE INTO users_permissions (user_id, permission_id)
                       SELECT ?1, id FROM permissions WHERE code = ?2"#,
                )
                .bind(user_id)
                .bind(code)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await
        })
        .await
    }
}
