//! Opaque bearer tokens.
//!
//! A token is 16 random bytes rendered as unpadded base-32 (26 characters).
//! Only the SHA-256 of the plaintext is stored; the plaintext is returned to the
//! caller once, at issue time. The scope keeps activation and authentication
//! tokens from being replayed as one another.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use data_encoding::BASE32_NOPAD;
use rand::{rngs::OsRng, RngCore};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use thiserror::Error;

use super::{with_deadline, DataError, DataResult, User, UserStore};
use crate::error::AppError;
use crate::validator::Validator;

pub const TOKEN_PLAINTEXT_LEN: usize = 26;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Activation,
    Authentication,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Activation => "activation",
            Scope::Authentication => "authentication",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Serialize)]
pub struct Token {
    #[serde(rename = "token")]
    pub plaintext: String,
    #[serde(skip)]
    pub hash: [u8; 32],
    #[serde(skip)]
    pub user_id: i64,
    pub expiry: DateTime<Utc>,
    #[serde(skip)]
    pub scope: Scope,
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("plaintext", &"<redacted>")
            .field("user_id", &self.user_id)
            .field("expiry", &self.expiry)
            .field("scope", &self.scope)
            .finish()
    }
}

impl Token {
    pub fn generate(user_id: i64, ttl: Duration, scope: Scope) -> anyhow::Result<Self> {
        let mut bytes = [0u8; 16];
        OsRng
            .try_fill_bytes(&mut bytes)
            .context("failed to read from the OS randomness source")?;
        let plaintext = BASE32_NOPAD.encode(&bytes);
        let expiry = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .context("token ttl out of range")?;

        Ok(Self {
            hash: hash_plaintext(&plaintext),
            plaintext,
            user_id,
            expiry,
            scope,
        })
    }
}

pub fn hash_plaintext(plaintext: &str) -> [u8; 32] {
    Sha256::digest(plaintext.as_bytes()).into()
}

pub fn validate_plaintext(v: &mut Validator, plaintext: &str) {
    v.check(plaintext.is_empty(), "token", "must be provided");
    v.check(plaintext.len() != TOKEN_PLAINTEXT_LEN, "token", "must be 26 bytes long");
}

/// Storage view of a token row.
#[derive(Debug, Clone)]
pub struct StoredToken {
    pub user_id: i64,
    pub expiry: DateTime<Utc>,
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert(&self, token: &Token) -> DataResult<()>;
    /// Exact match on the full hash and scope, restricted to unexpired rows.
    async fn find_unexpired(&self, hash: &[u8; 32], scope: Scope) -> DataResult<StoredToken>;
    async fn delete_all_for_user(&self, scope: Scope, user_id: i64) -> DataResult<()>;
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token plaintext is malformed")]
    Malformed(BTreeMap<String, String>),
    #[error("no unexpired token matches")]
    NotFound,
    #[error(transparent)]
    Data(DataError),
    #[error(transparent)]
    Generate(anyhow::Error),
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Malformed(errors) => AppError::FailedValidation(errors),
            TokenError::NotFound => AppError::NotFound,
            TokenError::Data(e) => e.into(),
            TokenError::Generate(e) => AppError::Internal(e),
        }
    }
}

/// Issues, resolves and revokes tokens on top of the token and user stores.
#[derive(Clone)]
pub struct Tokens {
    store: Arc<dyn TokenStore>,
    users: Arc<dyn UserStore>,
}

impl Tokens {
    pub fn new(store: Arc<dyn TokenStore>, users: Arc<dyn UserStore>) -> Self {
        Self { store, users }
    }

    pub async fn issue(&self, user_id: i64, ttl: Duration, scope: Scope) -> Result<Token, TokenError> {
        let token = Token::generate(user_id, ttl, scope).map_err(TokenError::Generate)?;
        self.store.insert(&token).await.map_err(TokenError::Data)?;
        Ok(token)
    }

    /// Returns the owner of an unexpired `scope` token with this plaintext.
    ///
    /// Shape failures are reported before any storage lookup.
    pub async fn resolve(&self, scope: Scope, plaintext: &str) -> Result<User, TokenError> {
        let mut v = Validator::new();
        validate_plaintext(&mut v, plaintext);
        if !v.valid() {
            return Err(TokenError::Malformed(v.into_errors()));
        }

        let hash = hash_plaintext(plaintext);
        let stored = match self.store.find_unexpired(&hash, scope).await {
            Ok(stored) => stored,
            Err(DataError::RecordNotFound) => return Err(TokenError::NotFound),
            Err(e) => return Err(TokenError::Data(e)),
        };
        if stored.expiry <= Utc::now() {
            return Err(TokenError::NotFound);
        }

        match self.users.get(stored.user_id).await {
            Ok(user) => Ok(user),
            Err(DataError::RecordNotFound) => Err(TokenError::NotFound),
            Err(e) => Err(TokenError::Data(e)),
        }
    }

    pub async fn revoke_all(&self, scope: Scope, user_id: i64) -> DataResult<()> {
        self.store.delete_all_for_user(scope, user_id).await
    }
}

#[derive(Clone)]
pub struct TokenModel {
    db: SqlitePool,
}

impl TokenModel {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TokenStore for TokenModel {
    async fn insert(&self, token: &Token) -> DataResult<()> {
        with_deadline(
            sqlx::query("INSERT INTO tokens (hash, user_id, expiry, scope) VALUES (?1, ?2, ?3, ?4)")
                .bind(&token.hash[..])
                .bind(token.user_id)
                .bind(token.expiry.timestamp_millis())
                .bind(token.scope.as_str())
                .execute(&self.db),
        )
        .await?;
        Ok(())
    }

    async fn find_unexpired(&self, hash: &[u8; 32], scope: Scope) -> DataResult<StoredToken> {
        let (user_id, expiry_ms): (i64, i64) = with_deadline(
            sqlx::query_as(
                "SELECT user_id, expiry FROM tokens WHERE hash = ?1 AND scope = ?2 AND expiry > ?3",
            )
            .bind(&hash[..])
            .bind(scope.as_str())
            .bind(Utc::now().timestamp_millis())
            .fetch_one(&self.db),
        )
        .await?;

        let expiry = Utc
            .timestamp_millis_opt(expiry_ms)
            .single()
            .ok_or(DataError::RecordNotFound)?;
        Ok(StoredToken { user_id, expiry })
    }

    async fn delete_all_for_user(&self, scope: Scope, user_id: i64) -> DataResult<()> {
        with_deadline(
            sqlx::query("DELETE FROM tokens WHERE scope = ?1 AND user_id = ?2")
                .bind(scope.as_str())
                .bind(user_id)
                .execute(&self.db),
        )
        .await?;
        Ok(())
    }
}
