use axum::{
    extract::{Path, State},
    Json,
};
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use diesel::PgConnection;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{NewDocumentTag, NewTag, Tag};
use crate::routes::documents::{
    load_tags_for_documents, owned_document, to_document_response, DocumentResponse, TagResponse,
};
use crate::schema::{document_tags, tags};
use crate::state::AppState;
use crate::auth::AuthenticatedUser;

const DEFAULT_TAG_COLOR: &str = "blue";

#[derive(Deserialize)]
pub struct CreateTagRequest {
    pub name: String,
    pub color: Option<String>,
}

pub async fn create_tag(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Json(payload): Json<CreateTagRequest>,
) -> AppResult<Json<TagResponse>> {
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }

    let mut conn = state.db()?;
    let color = payload
        .color
        .unwrap_or_else(|| DEFAULT_TAG_COLOR.to_string());
    let tag = find_or_create_tag(&mut conn, &name, &color)?;

    Ok(Json(TagResponse::from(tag)))
}

pub async fn attach_tag(
    State(state): State<AppState>,
    Path((document_id, tag_name)): Path<(Uuid, String)>,
    user: AuthenticatedUser,
) -> AppResult<Json<DocumentResponse>> {
    let name = tag_name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::bad_request("tag name must not be empty"));
    }

    let mut conn = state.db()?;
    let doc = owned_document(&mut conn, document_id, user.user_id)?;

    let tag = find_or_create_tag(&mut conn, &name, DEFAULT_TAG_COLOR)?;

    // Re-attaching is a no-op; the association is a set.
    diesel::insert_into(document_tags::table)
        .values(&NewDocumentTag {
            document_id,
            tag_id: tag.id,
        })
        .on_conflict_do_nothing()
        .execute(&mut conn)?;

    info!(document_id = %document_id, tag = %tag.name, "tag attached");

    let mut tags_map = load_tags_for_documents(&mut conn, &[document_id])?;
    let tags = tags_map.remove(&document_id).unwrap_or_default();
    Ok(Json(to_document_response(doc, tags)))
}

pub async fn detach_tag(
    State(state): State<AppState>,
    Path((document_id, tag_id)): Path<(Uuid, Uuid)>,
    user: AuthenticatedUser,
) -> AppResult<Json<DocumentResponse>> {
    let mut conn = state.db()?;
    let doc = owned_document(&mut conn, document_id, user.user_id)?;

    // Detaching an absent tag is a no-op; the response reflects current
    // state either way.
    diesel::delete(
        document_tags::table
            .filter(document_tags::document_id.eq(document_id))
            .filter(document_tags::tag_id.eq(tag_id)),
    )
    .execute(&mut conn)?;

    let mut tags_map = load_tags_for_documents(&mut conn, &[document_id])?;
    let tags = tags_map.remove(&document_id).unwrap_or_default();
    Ok(Json(to_document_response(doc, tags)))
}

/// Duplicate names return the existing tag rather than erroring; the unique
/// constraint closes the create/create race.
fn find_or_create_tag(conn: &mut PgConnection, name: &str, color: &str) -> AppResult<Tag> {
    if let Some(tag) = tags::table
        .filter(tags::name.eq(name))
        .first::<Tag>(conn)
        .optional()?
    {
        return Ok(tag);
    }

    let new_tag = NewTag {
        id: Uuid::new_v4(),
        name: name.to_string(),
        color: color.to_string(),
    };

    match diesel::insert_into(tags::table)
        .values(&new_tag)
        .execute(conn)
    {
        Ok(_) => {}
        Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            let tag = tags::table.filter(tags::name.eq(name)).first(conn)?;
            return Ok(tag);
        }
        Err(err) => return Err(AppError::from(err)),
    }

    let tag = tags::table.find(new_tag.id).first(conn)?;
    Ok(tag)
}
