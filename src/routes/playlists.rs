use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware::from_fn,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::parse_id;
use crate::data::playlists::validate_name;
use crate::error::AppResult;
use crate::json::JsonBody;
use crate::middleware::{gate::require_activated, Principal};
use crate::state::AppState;
use crate::validator::Validator;

/// Every playlist route needs an activated account.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/playlists/show/playlist/{id}", get(show_playlist))
        .route("/v1/playlists/create/playlist", post(create_playlist))
        .route("/v1/playlists/delete/playlist/{id}", delete(delete_playlist))
        .route("/v1/playlists/list/playlist", get(list_playlists))
        .route("/v1/playlists/add/songs", post(add_song))
        .route("/v1/playlists/remove/songs/{song_id}/{playlist_id}", delete(remove_song))
        .route("/v1/playlists/show/songs/{id}", get(playlist_songs))
        .route_layer(from_fn(require_activated))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CreatePlaylistInput {
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlaylistSongInput {
    pub playlist_id: i64,
    pub song_id: i64,
}

pub async fn show_playlist(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let user = principal.require_user()?;
    let playlist = state.models.playlists.get(parse_id(&id)?, user.id).await?;
    Ok(Json(json!({ "playlist": playlist })))
}

pub async fn create_playlist(
    State(state): State<AppState>,
    principal: Principal,
    JsonBody(input): JsonBody<CreatePlaylistInput>,
) -> AppResult<impl IntoResponse> {
    let user = principal.require_user()?;

    let mut v = Validator::new();
    validate_name(&mut v, &input.name);
    v.finish()?;

    let playlist = state.models.playlists.insert(&input.name, user.id).await?;
    Ok((StatusCode::CREATED, Json(json!({ "playlist": playlist }))))
}

pub async fn delete_playlist(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let user = principal.require_user()?;
    state.models.playlists.delete(parse_id(&id)?, user.id).await?;
    Ok(Json(json!({ "message": "playlist successfully deleted" })))
}

pub async fn list_playlists(State(state): State<AppState>, principal: Principal) -> AppResult<Json<Value>> {
    let user = principal.require_user()?;
    let playlists = state.models.playlists.list(user.id).await?;
    Ok(Json(json!({ "playlists": playlists })))
}

pub async fn add_song(
    State(state): State<AppState>,
    principal: Principal,
    JsonBody(input): JsonBody<PlaylistSongInput>,
) -> AppResult<impl IntoResponse> {
    let user = principal.require_user()?;

    let mut v = Validator::new();
    v.check(input.playlist_id < 1, "playlist_id", "must be a positive integer");
    v.check(input.song_id < 1, "song_id", "must be a positive integer");
    v.finish()?;

    state.models.playlists.add_song(input.playlist_id, input.song_id, user.id).await?;
    Ok((StatusCode::CREATED, Json(json!({ "message": "song successfully added to playlist" }))))
}

pub async fn remove_song(
    State(state): State<AppState>,
    principal: Principal,
    Path((song_id, playlist_id)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    let user = principal.require_user()?;
    state.models.playlists.remove_song(parse_id(&playlist_id)?, parse_id(&song_id)?, user.id).await?;
    Ok(Json(json!({ "message": "song successfully removed from playlist" })))
}

pub async fn playlist_songs(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let user = principal.require_user()?;
    let songs = state.models.playlists.songs(parse_id(&id)?, user.id).await?;
    Ok(Json(json!({ "songs": songs })))
}
