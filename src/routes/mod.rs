use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod attachments;
pub mod health;

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

    let body_limit = state.config.max_upload_bytes;

    // The api token travels as the trailing path segment, so every route is
    // POST-only and unauthenticated at the router layer; handlers gate
    // through the authorization gateway themselves.
    let attachments_api = Router::new()
        .route(
            "/upload/:record_id/:file_name/:token",
            post(attachments::upload),
        )
        .route("/list/:record_id/:token", post(attachments::list))
        .route(
            "/download/:record_id/:attachment_id/:token",
            post(attachments::download),
        )
        .route(
            "/downloadAsZip/:record_id/:token",
            post(attachments::download_as_zip),
        )
        .route(
            "/delete/:record_id/:attachment_id/:token",
            post(attachments::delete),
        );

    Router::new()
        .nest(
            "/:company_key/:application_key/attachments_api",
            attachments_api,
        )
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(body_limit))
}
