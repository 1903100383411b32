mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, body_to_vec, TestApp};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Deserialize)]
struct UploadResponse {
    document_id: Uuid,
}

#[derive(Deserialize)]
struct TagInfo {
    id: Uuid,
    name: String,
    color: String,
}

#[derive(Deserialize)]
struct DocumentInfo {
    tags: Vec<TagInfo>,
}

async fn setup(app: &TestApp) -> Result<(String, Uuid)> {
    app.signup("Tagger", "tagger@example.com", "pass").await?;
    let token = app.login_token("tagger@example.com", "pass").await?;

    let response = app
        .upload_document("tagged.txt", "text/plain", b"tag me", &token)
        .await?;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_to_vec(response.into_body()).await?;
    let upload: UploadResponse = serde_json::from_slice(&body)?;
    Ok((token, upload.document_id))
}

#[tokio::test]
async fn tag_create_is_find_or_create() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let (token, _doc_id) = setup(&app).await?;

    let first = app
        .post_json(
            "/tags",
            &json!({ "name": "Important", "color": "red" }),
            Some(&token),
        )
        .await?;
    assert_eq!(first.status(), StatusCode::OK);
    let body = body_to_vec(first.into_body()).await?;
    let tag: TagInfo = serde_json::from_slice(&body)?;
    assert_eq!(tag.name, "Important");
    assert_eq!(tag.color, "red");

    // Same name again: the existing tag comes back, color unchanged.
    let second = app
        .post_json(
            "/tags",
            &json!({ "name": "Important", "color": "green" }),
            Some(&token),
        )
        .await?;
    assert_eq!(second.status(), StatusCode::OK);
    let body = body_to_vec(second.into_body()).await?;
    let same: TagInfo = serde_json::from_slice(&body)?;
    assert_eq!(same.id, tag.id);
    assert_eq!(same.color, "red");

    // Omitted color falls back to the default.
    let defaulted = app
        .post_json("/tags", &json!({ "name": "Later" }), Some(&token))
        .await?;
    let body = body_to_vec(defaulted.into_body()).await?;
    let later: TagInfo = serde_json::from_slice(&body)?;
    assert_eq!(later.color, "blue");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn attach_is_idempotent_and_creates_lazily() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let (token, doc_id) = setup(&app).await?;

    // Tag does not exist yet; attaching creates it.
    let first = app
        .post_json(
            &format!("/documents/{doc_id}/tags/Invoice"),
            &json!({}),
            Some(&token),
        )
        .await?;
    assert_eq!(first.status(), StatusCode::OK);
    let body = body_to_vec(first.into_body()).await?;
    let doc: DocumentInfo = serde_json::from_slice(&body)?;
    assert_eq!(doc.tags.len(), 1);
    assert_eq!(doc.tags[0].name, "Invoice");

    // Attaching the same tag again leaves exactly one association.
    let second = app
        .post_json(
            &format!("/documents/{doc_id}/tags/Invoice"),
            &json!({}),
            Some(&token),
        )
        .await?;
    assert_eq!(second.status(), StatusCode::OK);
    let body = body_to_vec(second.into_body()).await?;
    let doc: DocumentInfo = serde_json::from_slice(&body)?;
    assert_eq!(doc.tags.len(), 1);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn detach_absent_tag_is_a_noop() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let (token, doc_id) = setup(&app).await?;

    let attach = app
        .post_json(
            &format!("/documents/{doc_id}/tags/Kept"),
            &json!({}),
            Some(&token),
        )
        .await?;
    let body = body_to_vec(attach.into_body()).await?;
    let doc: DocumentInfo = serde_json::from_slice(&body)?;
    assert_eq!(doc.tags.len(), 1);

    // Detaching a tag that was never attached changes nothing.
    let unrelated = Uuid::new_v4();
    let detach = app
        .delete(
            &format!("/documents/{doc_id}/tags/{unrelated}"),
            Some(&token),
        )
        .await?;
    assert_eq!(detach.status(), StatusCode::OK);
    let body = body_to_vec(detach.into_body()).await?;
    let doc: DocumentInfo = serde_json::from_slice(&body)?;
    assert_eq!(doc.tags.len(), 1);

    // Detaching the real one empties the set.
    let tag_id = doc.tags[0].id;
    let detach = app
        .delete(&format!("/documents/{doc_id}/tags/{tag_id}"), Some(&token))
        .await?;
    let body = body_to_vec(detach.into_body()).await?;
    let doc: DocumentInfo = serde_json::from_slice(&body)?;
    assert!(doc.tags.is_empty());

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn deleting_document_cascades_tag_associations() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let (token, doc_id) = setup(&app).await?;

    app.post_json(
        &format!("/documents/{doc_id}/tags/Orphaned"),
        &json!({}),
        Some(&token),
    )
    .await?;

    let delete = app.delete(&format!("/documents/{doc_id}"), Some(&token)).await?;
    assert_eq!(delete.status(), StatusCode::NO_CONTENT);

    let associations: i64 = app
        .with_conn(move |conn| {
            use diesel::prelude::*;
            use docrelay::schema::document_tags::dsl::{document_id, document_tags};
            document_tags
                .filter(document_id.eq(doc_id))
                .count()
                .get_result(conn)
                .map_err(Into::into)
        })
        .await?;
    assert_eq!(associations, 0);

    app.cleanup().await?;
    Ok(())
}
