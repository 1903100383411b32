use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;

use crate::state::AppState;

pub mod auth;
pub mod callback;
pub mod documents;
pub mod exports;
pub mod health;
pub mod tags;
pub mod users;

pub fn create_router(state: AppState) -> Router<()> {
    let cors = if let Some(origins) = state.config.cors_allowed_origin.as_ref() {
        let headers: Vec<HeaderValue> = origins
            .split(',')
            .filter_map(|value| {
                let trimmed = value.trim();
                (!trimmed.is_empty()).then(|| {
                    trimmed
                        .parse::<HeaderValue>()
                        .expect("invalid CORS allowed origin")
                })
            })
            .collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(headers))
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    };

    let documents_routes = Router::new()
        .route("/", get(documents::list_documents))
        .route(
            "/:id",
            get(documents::get_document)
                .put(documents::update_document)
                .delete(documents::delete_document),
        )
        .route(
            "/:id/tags/:tag",
            post(tags::attach_tag).delete(tags::detach_tag),
        );

    let uploads_dir = state.config.uploads_dir.clone();

    Router::new()
        .route("/signup", post(auth::signup))
        .route("/token", post(auth::token))
        .route("/n8n/callback", post(callback::n8n_callback))
        .route("/health", get(health::health_check))
        .route("/upload_and_convert", post(documents::upload_and_convert))
        .nest("/documents", documents_routes)
        .route("/tags", post(tags::create_tag))
        .route("/users/me", get(users::me).put(users::update_me))
        .route("/export/:id/pdf", get(exports::export_pdf))
        .route("/export/:id/docx", get(exports::export_docx))
        .nest_service("/uploads", ServeDir::new(uploads_dir))
        .with_state(state)
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024 * 512))
}
