//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! JSON API under `/api`, static landing page for everything else. The
//! middleware stack (outermost first) is request tracing, CORS, gzip and the
//! `performance` timing header.

pub mod auth;
pub mod contacts;
pub mod users;

use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::{HeaderValue, Method, header};
use axum::middleware::{self, Next};
use axum::response::{Json, Response};
use axum::routing::{get, patch, post};
use axum::Router;
use serde_json::{Value, json};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::Settings;
use crate::db;
use crate::error::ApiError;
use crate::state::AppState;

pub const PERFORMANCE_HEADER: &str = "performance";

fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/healthchecker", get(healthchecker))
        .route("/api/auth/signup", post(auth::signup))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/refresh_token", get(auth::refresh_token))
        .route("/api/auth/confirmed_email/{token}", get(auth::confirmed_email))
        .route("/api/auth/request_email", post(auth::request_email))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/me", get(auth::me))
        .route("/api/users/{user_id}/role", patch(users::update_role))
        .route("/api/contacts", get(contacts::list_contacts).post(contacts::create_contact))
        .route("/api/contacts/", get(contacts::list_contacts).post(contacts::create_contact))
        .route("/api/contacts/birthdays", get(contacts::upcoming_birthdays))
        .route(
            "/api/contacts/{contact_id}",
            get(contacts::get_contact)
                .put(contacts::update_contact)
                .delete(contacts::remove_contact),
        )
        .with_state(state)
}

/// Full application: API routes, static fallback and middleware.
pub fn app(state: AppState, settings: &Settings) -> Router {
    let static_files = ServeDir::new(&settings.static_dir).append_index_html_on_directories(true);

    api_routes(state)
        .fallback_service(static_files)
        .layer(middleware::from_fn(process_time))
        .layer(CompressionLayer::new())
        .layer(cors_layer(&settings.cors_origins))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) if origin != "*" => Some(value),
            _ => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
}

/// Stamp every response with the handling time in seconds.
async fn process_time(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let mut response = next.run(request).await;
    let elapsed = started.elapsed().as_secs_f64();
    if let Ok(value) = HeaderValue::from_str(&format!("{elapsed:.6}")) {
        response.headers_mut().insert(PERFORMANCE_HEADER, value);
    }
    response
}

/// `GET /api/healthchecker`: confirms the database answers.
async fn healthchecker(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    match db::ping(&state.pool).await {
        Ok(()) => Ok(Json(json!({ "message": "Welcome to the contact book API!" }))),
        Err(e) => {
            tracing::error!(error = %e, "database health check failed");
            Err(ApiError::Internal("Error connecting to the database".to_owned()))
        }
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
