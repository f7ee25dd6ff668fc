use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;

use crate::data::users::{validate_email, validate_password_plaintext};
use crate::data::{DataError, Scope};
use crate::error::{AppError, AppResult};
use crate::json::JsonBody;
use crate::state::AppState;
use crate::validator::Validator;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CredentialsInput {
    pub email: String,
    pub password: String,
}

pub async fn create_authentication_token(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<CredentialsInput>,
) -> AppResult<impl IntoResponse> {
    let mut v = Validator::new();
    validate_email(&mut v, &input.email);
    validate_password_plaintext(&mut v, &input.password);
    v.finish()?;

    let user = match state.models.users.get_by_email(&input.email).await {
        Ok(user) => user,
        Err(DataError::RecordNotFound) => return Err(AppError::InvalidCredentials),
        Err(e) => return Err(e.into()),
    };

    if !user.password.matches(&input.password).await? {
        return Err(AppError::InvalidCredentials);
    }

    let token = state
        .tokens
        .issue(user.id, state.config.auth.authentication_ttl(), Scope::Authentication)
        .await?;

    Ok((StatusCode::CREATED, Json(json!({ "authentication_token": token }))))
}
