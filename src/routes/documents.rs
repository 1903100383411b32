use std::collections::HashMap;
use std::path::Path as FsPath;

use axum::extract::{Json, Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::{prelude::*, PgConnection};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::jobs::{enqueue_job, JOB_DISPATCH_WEBHOOK};
use crate::lifecycle::DocumentStatus;
use crate::models::{Document, NewDocument, Tag};
use crate::schema::{document_tags, documents, tags};
use crate::state::AppState;

const DEFAULT_PAGE_LIMIT: i64 = 100;

#[derive(Deserialize)]
pub struct DocumentListQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Serialize, Clone)]
pub struct TagResponse {
    pub id: Uuid,
    pub name: String,
    pub color: String,
}

impl From<Tag> for TagResponse {
    fn from(tag: Tag) -> Self {
        Self {
            id: tag.id,
            name: tag.name,
            color: tag.color,
        }
    }
}

#[derive(Serialize)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub upload_date: String,
    pub original_path: String,
    pub filename: Option<String>,
    pub raw_text: Option<String>,
    pub corrected_html: Option<String>,
    pub status: String,
    pub status_detail: Option<String>,
    pub tags: Vec<TagResponse>,
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub document_id: Uuid,
}

#[derive(Deserialize)]
pub struct UpdateDocumentRequest {
    pub corrected_html: Option<String>,
    pub filename: Option<String>,
}

pub async fn upload_and_convert(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<UploadResponse>)> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut original_name: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        let msg = format!("invalid multipart data: {err}");
        error!(error = %err, "invalid multipart data");
        AppError::bad_request(msg)
    })? {
        if field.name() == Some("file") {
            original_name = field.file_name().map(|n| n.to_string());
            let data = field.bytes().await.map_err(|err| {
                let msg = format!("failed to read file bytes: {err}");
                error!(error = %err, "failed to read file bytes");
                AppError::bad_request(msg)
            })?;
            file_bytes = Some(data.to_vec());
        }
    }

    let file_bytes = file_bytes.ok_or_else(|| {
        error!("upload rejected: missing file field");
        AppError::bad_request("file field is required")
    })?;
    let original_name = original_name.ok_or_else(|| {
        error!("upload rejected: missing original filename");
        AppError::bad_request("filename is required")
    })?;

    let doc_id = Uuid::new_v4();
    let stored_name = storage_name(doc_id, &original_name);
    let original_path = format!("uploads/{stored_name}");

    state.files.save(&stored_name, file_bytes).await.map_err(|err| {
        error!(error = %err, %stored_name, "failed to store uploaded file");
        AppError::internal(format!("failed to store uploaded file: {err}"))
    })?;

    let mut conn = state.db()?;
    let new_document = NewDocument {
        id: doc_id,
        owner_id: user.user_id,
        original_path,
        filename: Some(original_name.clone()),
        status: DocumentStatus::Processing.as_str().to_string(),
    };
    diesel::insert_into(documents::table)
        .values(&new_document)
        .execute(&mut conn)?;

    // The upload response never waits on the webhook; delivery runs from
    // the outbox.
    if let Err(err) = enqueue_job(
        &mut conn,
        JOB_DISPATCH_WEBHOOK,
        json!({ "document_id": doc_id }),
        None,
    ) {
        warn!(document_id = %doc_id, error = %err, "failed to enqueue dispatch job");
    }

    info!(document_id = %doc_id, filename = %original_name, "document uploaded");

    Ok((
        StatusCode::ACCEPTED,
        Json(UploadResponse {
            message: "file uploaded and processing started".to_string(),
            document_id: doc_id,
        }),
    ))
}

pub async fn list_documents(
    State(state): State<AppState>,
    Query(params): Query<DocumentListQuery>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<DocumentResponse>>> {
    let mut conn = state.db()?;

    let skip = params.skip.unwrap_or(0).max(0);
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(0, 1000);

    let docs: Vec<Document> = documents::table
        .filter(documents::owner_id.eq(user.user_id))
        .order(documents::upload_date.desc())
        .offset(skip)
        .limit(limit)
        .load(&mut conn)?;

    let doc_ids: Vec<Uuid> = docs.iter().map(|doc| doc.id).collect();
    let mut tags_map = load_tags_for_documents(&mut conn, &doc_ids)?;

    let response = docs
        .into_iter()
        .map(|doc| {
            let tags = tags_map.remove(&doc.id).unwrap_or_default();
            to_document_response(doc, tags)
        })
        .collect();

    Ok(Json(response))
}

pub async fn get_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<DocumentResponse>> {
    let mut conn = state.db()?;

    let doc = owned_document(&mut conn, document_id, user.user_id)?;
    let mut tags_map = load_tags_for_documents(&mut conn, &[document_id])?;
    let tags = tags_map.remove(&document_id).unwrap_or_default();

    Ok(Json(to_document_response(doc, tags)))
}

pub async fn update_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(payload): Json<UpdateDocumentRequest>,
) -> AppResult<Json<DocumentResponse>> {
    let mut conn = state.db()?;

    owned_document(&mut conn, document_id, user.user_id)?;

    if let Some(ref corrected_html) = payload.corrected_html {
        diesel::update(documents::table.find(document_id))
            .set(documents::corrected_html.eq(corrected_html))
            .execute(&mut conn)?;
    }
    if let Some(ref filename) = payload.filename {
        diesel::update(documents::table.find(document_id))
            .set(documents::filename.eq(filename))
            .execute(&mut conn)?;
    }

    let doc: Document = documents::table.find(document_id).first(&mut conn)?;
    let mut tags_map = load_tags_for_documents(&mut conn, &[document_id])?;
    let tags = tags_map.remove(&document_id).unwrap_or_default();

    Ok(Json(to_document_response(doc, tags)))
}

pub async fn delete_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<impl IntoResponse> {
    let doc = {
        let mut conn = state.db()?;
        owned_document(&mut conn, document_id, user.user_id)?
    };

    // Best-effort: a document row without its backing file is preferable to
    // an orphaned file without its row.
    if let Some(stored_name) = stored_file_name(&doc.original_path) {
        if let Err(err) = state.files.delete(stored_name).await {
            warn!(document_id = %doc.id, error = %err, "failed to remove stored file");
        }
    }

    let mut conn = state.db()?;
    diesel::delete(documents::table.find(document_id)).execute(&mut conn)?;

    info!(document_id = %document_id, "document deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Ownership and existence collapse to the same 404 so callers cannot probe
/// for other users' documents.
pub(crate) fn owned_document(
    conn: &mut PgConnection,
    document_id: Uuid,
    owner_id: Uuid,
) -> AppResult<Document> {
    documents::table
        .find(document_id)
        .filter(documents::owner_id.eq(owner_id))
        .first(conn)
        .map_err(AppError::from)
}

pub(crate) fn load_tags_for_documents(
    conn: &mut PgConnection,
    document_ids: &[Uuid],
) -> AppResult<HashMap<Uuid, Vec<Tag>>> {
    if document_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<(Uuid, Tag)> = document_tags::table
        .inner_join(tags::table)
        .filter(document_tags::document_id.eq_any(document_ids))
        .select((document_tags::document_id, tags::all_columns))
        .load(conn)?;

    let mut map: HashMap<Uuid, Vec<Tag>> = HashMap::new();
    for (doc_id, tag) in rows {
        map.entry(doc_id).or_default().push(tag);
    }
    Ok(map)
}

pub(crate) fn to_document_response(doc: Document, tags: Vec<Tag>) -> DocumentResponse {
    DocumentResponse {
        id: doc.id,
        owner_id: doc.owner_id,
        upload_date: to_iso(doc.upload_date),
        original_path: doc.original_path,
        filename: doc.filename,
        raw_text: doc.raw_text,
        corrected_html: doc.corrected_html,
        status: doc.status,
        status_detail: doc.status_detail,
        tags: tags.into_iter().map(TagResponse::from).collect(),
    }
}

pub(crate) fn to_iso(dt: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).to_rfc3339()
}

/// Storage key for a new upload: random id plus the original extension.
fn storage_name(doc_id: Uuid, original_name: &str) -> String {
    match FsPath::new(original_name).extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() => format!("{doc_id}.{ext}"),
        _ => doc_id.to_string(),
    }
}

fn stored_file_name(original_path: &str) -> Option<&str> {
    original_path.rsplit('/').next().filter(|name| !name.is_empty())
}
