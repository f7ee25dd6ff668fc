//! Storage collaborators.
//!
//! Users, permissions and tokens sit behind object-safe traits so the
//! authentication pipeline can be exercised against wrapped or substituted
//! stores. Songs and playlists are plain SQLite models used only by their
//! handlers.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use thiserror::Error;

pub mod filters;
pub mod permissions;
pub mod playlists;
pub mod songs;
pub mod tokens;
pub mod users;

pub use filters::{Filters, Metadata};
pub use permissions::{PermissionModel, PermissionStore, Permissions};
pub use playlists::{Playlist, PlaylistModel};
pub use songs::{Song, SongModel};
pub use tokens::{Scope, Token, TokenModel, TokenStore, Tokens};
pub use users::{Password, User, UserModel, UserStore};

/// Deadline applied to every storage call.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum DataError {
    #[error("record not found")]
    RecordNotFound,
    #[error("edit conflict")]
    EditConflict,
    #[error("duplicate email")]
    DuplicateEmail,
    #[error("query exceeded the {0:?} deadline")]
    Timeout(Duration),
    #[error(transparent)]
    Sqlx(sqlx::Error),
}

impl From<sqlx::Error> for DataError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DataError::RecordNotFound,
            other => DataError::Sqlx(other),
        }
    }
}

pub type DataResult<T> = Result<T, DataError>;

/// Runs a query under [`QUERY_TIMEOUT`]. The query future is dropped when the
/// deadline elapses, which abandons the in-flight statement.
pub(crate) async fn with_deadline<T, F>(query: F) -> DataResult<T>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(QUERY_TIMEOUT, query).await {
        Ok(result) => result.map_err(DataError::from),
        Err(_) => Err(DataError::Timeout(QUERY_TIMEOUT)),
    }
}

/// All storage handles used by the handlers.
#[derive(Clone)]
pub struct Models {
    pub songs: SongModel,
    pub playlists: PlaylistModel,
    pub users: Arc<dyn UserStore>,
    pub permissions: Arc<dyn PermissionStore>,
}

impl Models {
    pub fn new(db: SqlitePool) -> Self {
        Self {
            songs: SongModel::new(db.clone()),
            playlists: PlaylistModel::new(db.clone()),
            users: Arc::new(UserModel::new(db.clone())),
            permissions: Arc::new(PermissionModel::new(db)),
        }
    }
}
