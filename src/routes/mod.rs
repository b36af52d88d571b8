pub mod auth;
pub mod chat;
pub mod faqs;
pub mod notices;
pub mod timetables;
pub mod uploads;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::{header::AUTHORIZATION, header::CONTENT_TYPE, Method},
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, services::ServeDir};

use crate::state::AppState;

/// Largest accepted upload body.
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    let api = Router::new()
        .route("/chat", post(chat::chat_handler))
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/login", post(auth::login_handler))
        .route(
            "/faqs",
            get(faqs::list_handler).post(faqs::create_handler),
        )
        .route(
            "/faqs/:id",
            put(faqs::update_handler).delete(faqs::delete_handler),
        )
        .route(
            "/notices",
            get(notices::list_handler).post(notices::create_handler),
        )
        .route(
            "/notices/:id",
            put(notices::update_handler).delete(notices::delete_handler),
        )
        .route(
            "/timetables",
            get(timetables::list_handler).post(timetables::create_handler),
        )
        .route(
            "/timetables/:id",
            put(timetables::update_handler).delete(timetables::delete_handler),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES));

    Router::new()
        .route("/", get(|| async { "Smart College Chatbot Backend Running" }))
        .nest("/api", api)
        .nest_service("/uploads", ServeDir::new(&state.config.upload_dir))
        .layer(cors)
        .with_state(state)
}
