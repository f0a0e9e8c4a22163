use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::state::AppState;

pub mod auth;
pub mod categories;
pub mod chat;
pub mod dashboard;
pub mod events;
pub mod files;
pub mod health;
pub mod timeline;

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

        let allow_origin = AllowOrigin::list(headers);

        CorsLayer::new()
            .allow_origin(allow_origin)
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

    let auth_routes = Router::new()
        .route("/signup", post(auth::signup))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me));

    let events_routes = Router::new()
        .route("/", get(events::list_events).post(events::create_event))
        .route(
            "/:id",
            get(events::get_event)
                .put(events::update_event)
                .delete(events::archive_event),
        )
        .route("/:id/files", get(files::list_files))
        .route(
            "/:id/upload",
            post(files::upload_file).delete(files::delete_file),
        )
        .route("/:id/chat", get(chat::chat_history).post(chat::send_message))
        .route("/:id/chat/stream", post(chat::send_message_stream))
        .route(
            "/:id/timeline",
            get(timeline::list_entries).post(timeline::create_entry),
        )
        .route("/:id/timeline/generate", post(timeline::generate_timeline))
        .route("/:id/timeline/cache", get(timeline::cached_timeline));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/events", events_routes)
        .route("/api/categories", get(categories::list_categories))
        .route("/api/dashboard/stats", get(dashboard::stats))
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024 * 64))
}

pub(crate) fn to_iso(dt: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).to_rfc3339()
}
