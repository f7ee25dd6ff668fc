use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::data::tokens::TokenError;
use crate::data::users::{validate_user, NewUser};
use crate::data::{Password, Scope};
use crate::error::{AppError, AppResult};
use crate::json::JsonBody;
use crate::mailer::Template;
use crate::state::AppState;
use crate::validator::Validator;

/// Every new account can read the catalogue.
pub const DEFAULT_PERMISSIONS: &[&str] = &["songs:read"];

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegisterUserInput {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ActivateUserInput {
    pub token: String,
}

pub async fn register_user(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<RegisterUserInput>,
) -> AppResult<impl IntoResponse> {
    let mut v = Validator::new();
    validate_user(&mut v, &input.name, &input.email, &input.password);
    v.finish()?;

    let password = Password::set(&input.password, state.config.auth.bcrypt_cost).await?;
    let user = state
        .models
        .users
        .insert(NewUser { name: input.name, email: input.email, password, activated: false })
        .await?;

    state.models.permissions.add_for_user(user.id, DEFAULT_PERMISSIONS).await?;

    let token = state.tokens.issue(user.id, state.config.auth.activation_ttl(), Scope::Activation).await?;

    let mailer = state.mailer.clone();
    let recipient = user.email.clone();
    let data = json!({ "activationToken": token.plaintext, "userID": user.id });
    state.background.spawn("welcome_email", async move {
        if let Err(e) = mailer.send(&recipient, Template::UserWelcome, data).await {
            tracing::error!(error = %e, "failed to send welcome email");
        }
    });

    Ok((StatusCode::CREATED, Json(json!({ "user": user }))))
}

pub async fn activate_user(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<ActivateUserInput>,
) -> AppResult<Json<Value>> {
    let mut user = match state.tokens.resolve(Scope::Activation, &input.token).await {
        Ok(user) => user,
        Err(TokenError::Malformed(_)) | Err(TokenError::NotFound) => {
            return Err(AppError::field("token", "invalid or expired activation token"));
        }
        Err(e) => return Err(e.into()),
    };

    user.activated = true;
    state.models.users.update(&mut user).await?;
    state.tokens.revoke_all(Scope::Activation, user.id).await?;

    Ok(Json(json!({ "user": user })))
}
