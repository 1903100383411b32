use axum::{extract::State, Form, Json};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::password,
    error::{AppError, AppResult},
    models::{NewUser, User},
    schema::users,
    state::AppState,
};

#[derive(Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub security_code: String,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
        }
    }
}

#[derive(Deserialize)]
pub struct TokenRequest {
    /// Clients send the email in the `username` field (OAuth2 password form).
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> AppResult<Json<UserResponse>> {
    if payload.security_code != state.config.signup_code {
        return Err(AppError::forbidden("invalid security code"));
    }

    let mut conn = state.db()?;

    let existing = users::table
        .filter(users::email.eq(&payload.email))
        .first::<User>(&mut conn)
        .optional()?;
    if existing.is_some() {
        return Err(AppError::bad_request("email already registered"));
    }

    let hashed_password = password::hash_password(&payload.password)
        .map_err(|err| AppError::internal(format!("failed to hash password: {err}")))?;

    let new_user = NewUser {
        id: Uuid::new_v4(),
        username: payload.username,
        email: payload.email,
        hashed_password,
    };

    diesel::insert_into(users::table)
        .values(&new_user)
        .execute(&mut conn)?;

    let user: User = users::table.find(new_user.id).first(&mut conn)?;
    info!(user_id = %user.id, "user signed up");

    Ok(Json(UserResponse::from(user)))
}

pub async fn token(
    State(state): State<AppState>,
    Form(payload): Form<TokenRequest>,
) -> AppResult<Json<TokenResponse>> {
    let mut conn = state.db()?;

    let user: User = users::table
        .filter(users::email.eq(&payload.username))
        .first(&mut conn)
        .map_err(|_| AppError::unauthorized())?;

    let valid = password::verify_password(&payload.password, &user.hashed_password)
        .map_err(|_| AppError::unauthorized())?;
    if !valid {
        return Err(AppError::unauthorized());
    }

    let access_token = state.jwt.generate_token(user.id).map_err(AppError::from)?;

    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
    }))
}
