use axum::{extract::State, Json};
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;

use crate::{
    auth::{password, AuthenticatedUser},
    error::{AppError, AppResult},
    models::User,
    routes::auth::UserResponse,
    schema::users,
    state::AppState,
};

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

pub async fn me(user: AuthenticatedUser) -> Json<UserResponse> {
    Json(UserResponse {
        id: user.user_id,
        username: user.username,
        email: user.email,
    })
}

pub async fn update_me(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> AppResult<Json<UserResponse>> {
    let mut conn = state.db()?;

    if let Some(ref email) = payload.email {
        if *email != user.email {
            let taken = users::table
                .filter(users::email.eq(email))
                .filter(users::id.ne(user.user_id))
                .first::<User>(&mut conn)
                .optional()?;
            if taken.is_some() {
                return Err(AppError::bad_request("email already registered"));
            }
            diesel::update(users::table.find(user.user_id))
                .set(users::email.eq(email))
                .execute(&mut conn)?;
        }
    }

    if let Some(ref username) = payload.username {
        diesel::update(users::table.find(user.user_id))
            .set(users::username.eq(username))
            .execute(&mut conn)?;
    }

    if let Some(ref new_password) = payload.password {
        let hashed = password::hash_password(new_password)
            .map_err(|err| AppError::internal(format!("failed to hash password: {err}")))?;
        diesel::update(users::table.find(user.user_id))
            .set(users::hashed_password.eq(hashed))
            .execute(&mut conn)?;
    }

    diesel::update(users::table.find(user.user_id))
        .set(users::updated_at.eq(Utc::now().naive_utc()))
        .execute(&mut conn)?;

    let refreshed: User = users::table.find(user.user_id).first(&mut conn)?;
    Ok(Json(UserResponse::from(refreshed)))
}
