use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
};
use tracing::error;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::export;
use crate::models::Document;
use crate::routes::documents::owned_document;
use crate::state::AppState;

const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

pub async fn export_pdf(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<impl IntoResponse> {
    let doc = {
        let mut conn = state.db()?;
        owned_document(&mut conn, document_id, user.user_id)?
    };

    let html = export_source(&doc);
    let title = export_title(&doc);
    let bytes = export::pdf::render(&title, &html).map_err(|err| {
        error!(document_id = %doc.id, error = %err, "PDF rendering failed");
        AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "failed to generate PDF")
    })?;

    let filename = attachment_name(&doc, "pdf");
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, attachment_disposition(&filename)),
        ],
        bytes,
    ))
}

pub async fn export_docx(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<impl IntoResponse> {
    let doc = {
        let mut conn = state.db()?;
        owned_document(&mut conn, document_id, user.user_id)?
    };

    let html = export_source(&doc);
    let title = export_title(&doc);
    let bytes = export::docx::render(&title, &html).map_err(|err| {
        error!(document_id = %doc.id, error = %err, "DOCX rendering failed");
        AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "failed to generate DOCX")
    })?;

    let filename = attachment_name(&doc, "docx");
    Ok((
        [
            (header::CONTENT_TYPE, DOCX_MIME.to_string()),
            (header::CONTENT_DISPOSITION, attachment_disposition(&filename)),
        ],
        bytes,
    ))
}

fn export_source(doc: &Document) -> String {
    doc.corrected_html
        .clone()
        .or_else(|| doc.raw_text.clone())
        .unwrap_or_default()
}

fn export_title(doc: &Document) -> String {
    doc.filename.clone().unwrap_or_else(|| "Document".to_string())
}

/// `report.pdf` exports as `report.pdf`, not `report.pdf.pdf`.
fn attachment_name(doc: &Document, extension: &str) -> String {
    let base = doc.filename.as_deref().unwrap_or("document");
    let suffix = format!(".{extension}");
    let stem = base.strip_suffix(suffix.as_str()).unwrap_or(base);
    format!("{stem}{suffix}")
}

fn attachment_disposition(filename: &str) -> String {
    let sanitized: String = filename
        .chars()
        .map(|ch| match ch {
            '"' | '\\' => '_',
            _ => ch,
        })
        .collect();
    format!("attachment; filename=\"{sanitized}\"")
}
