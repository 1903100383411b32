use axum::{extract::State, Json};
use diesel::prelude::*;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    lifecycle::{fallback_html, DocumentStatus},
    models::Document,
    schema::documents,
    state::AppState,
};

#[derive(Deserialize)]
pub struct CallbackRequest {
    pub doc_id: Uuid,
    pub raw_text: String,
    pub corrected_html: Option<String>,
    pub status: Option<String>,
    /// Correlation token issued at dispatch time; without it the request
    /// cannot mutate anything.
    pub token: String,
}

pub async fn n8n_callback(
    State(state): State<AppState>,
    Json(payload): Json<CallbackRequest>,
) -> AppResult<Json<Value>> {
    let claims = state
        .jwt
        .verify_callback_token(&payload.token)
        .map_err(|err| {
            warn!(doc_id = %payload.doc_id, error = %err, "callback token rejected");
            AppError::unauthorized()
        })?;

    // A valid token for one document never opens another.
    if claims.doc_id != payload.doc_id {
        return Err(AppError::not_found());
    }

    let status = match payload.status.as_deref() {
        Some(value) => DocumentStatus::parse(value)
            .ok_or_else(|| AppError::bad_request(format!("unknown status '{value}'")))?,
        None => DocumentStatus::Ready,
    };

    let mut conn = state.db()?;
    let document: Document = documents::table
        .find(payload.doc_id)
        .first(&mut conn)
        .map_err(|_| AppError::not_found())?;

    // Supplied HTML is trusted workflow output and stored verbatim; only the
    // derived fallback escapes.
    let corrected_html = match payload.corrected_html {
        Some(html) if !html.is_empty() => html,
        _ => fallback_html(&payload.raw_text),
    };

    diesel::update(documents::table.find(document.id))
        .set((
            documents::raw_text.eq(&payload.raw_text),
            documents::corrected_html.eq(&corrected_html),
            documents::status.eq(status.as_str()),
            documents::status_detail.eq(None::<String>),
        ))
        .execute(&mut conn)?;

    info!(doc_id = %document.id, status = status.as_str(), "callback applied");

    Ok(Json(json!({ "status": "success" })))
}
