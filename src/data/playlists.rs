use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use super::{with_deadline, DataError, DataResult, Song};
use crate::validator::Validator;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Playlist {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub user_id: i64,
    pub version: i64,
}

pub fn validate_name(v: &mut Validator, name: &str) {
    v.check(name.is_empty(), "name", "must be provided");
    v.check(name.len() > 50, "name", "must not be more than 50 bytes long");
}

const PLAYLIST_COLUMNS: &str = "id, created_at, name, user_id, version";

/// Playlists are always addressed through their owner; rows owned by someone
/// else behave as if they did not exist.
#[derive(Clone)]
pub struct PlaylistModel {
    db: SqlitePool,
}

impl PlaylistModel {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn insert(&self, name: &str, user_id: i64) -> DataResult<Playlist> {
        let query = format!(
            "INSERT INTO playlists (name, user_id) VALUES (?1, ?2) RETURNING {}",
            PLAYLIST_COLUMNS
        );
        with_deadline(
            sqlx::query_as::<_, Playlist>(&query).bind(name).bind(user_id).fetch_one(&self.db),
        )
        .await
    }

    pub async fn get(&self, id: i64, user_id: i64) -> DataResult<Playlist> {
        if id < 1 {
            return Err(DataError::RecordNotFound);
        }
        let query = format!("SELECT {} FROM playlists WHERE id = ?1 AND user_id = ?2", PLAYLIST_COLUMNS);
        with_deadline(sqlx::query_as::<_, Playlist>(&query).bind(id).bind(user_id).fetch_one(&self.db)).await
    }

    pub async fn list(&self, user_id: i64) -> DataResult<Vec<Playlist>> {
        let query = format!("SELECT {} FROM playlists WHERE user_id = ?1 ORDER BY id", PLAYLIST_COLUMNS);
        with_deadline(sqlx::query_as::<_, Playlist>(&query).bind(user_id).fetch_all(&self.db)).await
    }

    pub async fn delete(&self, id: i64, user_id: i64) -> DataResult<()> {
        if id < 1 {
            return Err(DataError::RecordNotFound);
        }
        let result = with_deadline(
            sqlx::query("DELETE FROM playlists WHERE id = ?1 AND user_id = ?2")
                .bind(id)
                .bind(user_id)
                .execute(&self.db),
        )
        .await?;
        if result.rows_affected() == 0 {
            return Err(DataError::RecordNotFound);
        }
        Ok(())
    }

    /// Adds a song to an owned playlist. Adding the same song twice is a no-op.
    pub async fn add_song(&self, playlist_id: i64, song_id: i64, user_id: i64) -> DataResult<()> {
        self.get(playlist_id, user_id).await?;
        let result = with_deadline(
            sqlx::query("INSERT OR IGNORE INTO playlist_songs (playlist_id, song_id) VALUES (?1, ?2)")
                .bind(playlist_id)
                .bind(song_id)
                .execute(&self.db),
        )
        .await;
        match result {
            Ok(_) => Ok(()),
            Err(DataError::Sqlx(sqlx::Error::Database(db_err))) if db_err.is_foreign_key_violation() => {
                Err(DataError::RecordNotFound)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn remove_song(&self, playlist_id: i64, song_id: i64, user_id: i64) -> DataResult<()> {
        self.get(playlist_id, user_id).await?;
        let result = with_deadline(
            sqlx::query("DELETE FROM playlist_songs WHERE playlist_id = ?1 AND song_id = ?2")
                .bind(playlist_id)
                .bind(song_id)
                .execute(&self.db),
        )
        .await?;
        if result.rows_affected() == 0 {
            return Err(DataError::RecordNotFound);
        }
        Ok(())
    }

    pub async fn songs(&self, playlist_id: i64, user_id: i64) -> DataResult<Vec<Song>> {
        self.get(playlist_id, user_id).await?;
        with_deadline(
            sqlx::query_as::<_, Song>(
                r#"SELECT songs.id, songs.created_at, songs.name, songs.artist, songs.song_url,
                          songs.thumbnail, songs.version
                   FROM songs
                   INNER JOIN playlist_songs ON playlist_songs.song_id = songs.id
                   WHERE playlist_songs.playlist_id = ?1
                   ORDER BY playlist_songs.added_at, songs.id"#,
            )
            .bind(playlist_id)
            .fetch_all(&self.db),
        )
        .await
    }
}
