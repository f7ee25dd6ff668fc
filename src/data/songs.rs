use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use super::{with_deadline, DataError, DataResult, Filters, Metadata};
use crate::validator::Validator;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Song {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub artist: String,
    pub song_url: String,
    pub thumbnail: String,
    pub version: i64,
}

#[derive(Debug, Clone, Default)]
pub struct NewSong {
    pub name: String,
    pub artist: String,
    pub song_url: String,
    pub thumbnail: String,
}

pub const SONG_SORT_SAFELIST: &[&str] = &["id", "name", "artist", "-id", "-name", "-artist"];

pub fn validate_song(v: &mut Validator, name: &str, artist: &str, song_url: &str, thumbnail: &str) {
    v.check(name.is_empty(), "name", "must be provided");
    v.check(name.len() > 30, "name", "must not be more than 30 bytes long");
    v.check(artist.is_empty(), "artist", "must be provided");
    v.check(artist.len() > 50, "artist", "must not be more than 50 bytes long");
    v.check(song_url.len() > 100, "song_url", "must not be more than 100 bytes long");
    v.check(thumbnail.len() > 100, "thumbnail", "must not be more than 100 bytes long");
}

#[derive(sqlx::FromRow)]
struct CountedSong {
    total: i64,
    #[sqlx(flatten)]
    song: Song,
}

const SONG_COLUMNS: &str = "id, created_at, name, artist, song_url, thumbnail, version";

#[derive(Clone)]
pub struct SongModel {
    db: SqlitePool,
}

impl SongModel {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn insert(&self, song: NewSong) -> DataResult<Song> {
        let query = format!(
            "INSERT INTO songs (name, artist, song_url, thumbnail) VALUES (?1, ?2, ?3, ?4) RETURNING {}",
            SONG_COLUMNS
        );
        with_deadline(
            sqlx::query_as::<_, Song>(&query)
                .bind(&song.name)
                .bind(&song.artist)
                .bind(&song.song_url)
                .bind(&song.thumbnail)
                .fetch_one(&self.db),
        )
        .await
    }

    pub async fn get(&self, id: i64) -> DataResult<Song> {
        if id < 1 {
            return Err(DataError::RecordNotFound);
        }
        let query = format!("SELECT {} FROM songs WHERE id = ?1", SONG_COLUMNS);
        with_deadline(sqlx::query_as::<_, Song>(&query).bind(id).fetch_one(&self.db)).await
    }

    pub async fn get_all(&self, name: &str, artist: &str, filters: &Filters) -> DataResult<(Vec<Song>, Metadata)> {
        let query = format!(
            r#"SELECT count(*) OVER() AS total, {}
               FROM songs
               WHERE (name LIKE '%' || ?1 || '%' OR ?1 = '')
               AND (artist LIKE '%' || ?2 || '%' OR ?2 = '')
               ORDER BY {} {}, id ASC
               LIMIT ?3 OFFSET ?4"#,
            SONG_COLUMNS,
            filters.sort_column(),
            filters.sort_direction()
        );

        let rows = with_deadline(
            sqlx::query_as::<_, CountedSong>(&query)
                .bind(name)
                .bind(artist)
                .bind(filters.limit())
                .bind(filters.offset())
                .fetch_all(&self.db),
        )
        .await?;

        let total = rows.first().map(|r| r.total).unwrap_or(0);
        let songs = rows.into_iter().map(|r| r.song).collect();
        Ok((songs, Metadata::calculate(total, filters.page, filters.page_size)))
    }

    pub async fn update(&self, song: &mut Song) -> DataResult<()> {
        let version: Option<i64> = with_deadline(
            sqlx::query_scalar(
                r#"UPDATE songs
                   SET name = ?1, artist = ?2, song_url = ?3, thumbnail = ?4, version = version + 1
                   WHERE id = ?5 AND version = ?6
                   RETURNING version"#,
            )
            .bind(&song.name)
            .bind(&song.artist)
            .bind(&song.song_url)
            .bind(&song.thumbnail)
            .bind(song.id)
            .bind(song.version)
            .fetch_optional(&self.db),
        )
        .await?;

        match version {
            Some(v) => {
                song.version = v;
                Ok(())
            }
            None => Err(DataError::EditConflict),
        }
    }

    pub async fn delete(&self, id: i64) -> DataResult<()> {
        if id < 1 {
            return Err(DataError::RecordNotFound);
        }
        let result =
            with_deadline(sqlx::query("DELETE FROM songs WHERE id = ?1").bind(id).execute(&self.db)).await?;
        if result.rows_affected() == 0 {
            return Err(DataError::RecordNotFound);
        }
        Ok(())
    }
}
