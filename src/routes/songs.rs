use std::collections::HashMap;

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::parse_id;
use crate::data::filters::validate_filters;
use crate::data::songs::{validate_song, NewSong, SONG_SORT_SAFELIST};
use crate::data::Filters;
use crate::error::{AppError, AppResult};
use crate::json::JsonBody;
use crate::state::AppState;
use crate::validator::Validator;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CreateSongInput {
    pub name: String,
    pub artist: String,
    pub song_url: String,
    pub thumbnail: String,
}

/// Absent fields are left unchanged.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateSongInput {
    pub name: Option<String>,
    pub artist: Option<String>,
    pub song_url: Option<String>,
    pub thumbnail: Option<String>,
}

fn read_string(qs: &HashMap<String, String>, key: &str, default: &str) -> String {
    qs.get(key).cloned().unwrap_or_else(|| default.to_string())
}

fn read_int(qs: &HashMap<String, String>, key: &str, default: i64, v: &mut Validator) -> i64 {
    match qs.get(key) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            v.add(key, "must be an integer value");
            default
        }),
    }
}

pub async fn list_songs(
    State(state): State<AppState>,
    query: Result<Query<HashMap<String, String>>, QueryRejection>,
) -> AppResult<Json<Value>> {
    let Query(qs) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let mut v = Validator::new();
    let name = read_string(&qs, "name", "");
    let artist = read_string(&qs, "artist", "");
    let filters = Filters {
        page: read_int(&qs, "page", 1, &mut v),
        page_size: read_int(&qs, "page_size", 20, &mut v),
        sort: read_string(&qs, "sort", "id"),
        sort_safelist: SONG_SORT_SAFELIST,
    };
    validate_filters(&mut v, &filters);
    v.finish()?;

    let (songs, metadata) = state.models.songs.get_all(&name, &artist, &filters).await?;
    Ok(Json(json!({ "songs": songs, "metadata": metadata })))
}

pub async fn show_song(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<Value>> {
    let song = state.models.songs.get(parse_id(&id)?).await?;
    Ok(Json(json!({ "song": song })))
}

pub async fn create_song(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<CreateSongInput>,
) -> AppResult<impl IntoResponse> {
    let mut v = Validator::new();
    validate_song(&mut v, &input.name, &input.artist, &input.song_url, &input.thumbnail);
    v.finish()?;

    let song = state
        .models
        .songs
        .insert(NewSong {
            name: input.name,
            artist: input.artist,
            song_url: input.song_url,
            thumbnail: input.thumbnail,
        })
        .await?;

    let location = format!("/v1/songs/{}", song.id);
    Ok((StatusCode::CREATED, [(header::LOCATION, location)], Json(json!({ "song": song }))))
}

pub async fn update_song(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(input): JsonBody<UpdateSongInput>,
) -> AppResult<Json<Value>> {
    let mut song = state.models.songs.get(parse_id(&id)?).await?;

    if let Some(name) = input.name {
        song.name = name;
    }
    if let Some(artist) = input.artist {
        song.artist = artist;
    }
    if let Some(song_url) = input.song_url {
        song.song_url = song_url;
    }
    if let Some(thumbnail) = input.thumbnail {
        song.thumbnail = thumbnail;
    }

    let mut v = Validator::new();
    validate_song(&mut v, &song.name, &song.artist, &song.song_url, &song.thumbnail);
    v.finish()?;

    state.models.songs.update(&mut song).await?;
    Ok(Json(json!({ "song": song })))
}

pub async fn delete_song(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<Value>> {
    state.models.songs.delete(parse_id(&id)?).await?;
    Ok(Json(json!({ "message": "song successfully deleted" })))
}
