//! Router configuration for talkboard.

use super::state::AppState;
use crate::api::{auth, certificates, live, registrations, reports, talks, users};
use axum::{
    Router,
    routing::{delete, get, post, put},
};
use talkboard_web::handlers::{health_check, readiness};
use talkboard_web::{correlation_id_layer, http_trace_layer};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

/// Build the complete Axum router.
///
/// Health checks and the talk catalog are public. Everything else needs a
/// session token, except certificate verification, which anyone holding a
/// token may call.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Catalog
        .route("/talks", get(talks::list_talks).post(talks::create_talk))
        .route(
            "/talks/:id",
            get(talks::get_talk).put(talks::update_talk).delete(talks::delete_talk),
        )
        .route("/talks/:id/materials", post(talks::add_material))
        .route("/talks/:id/materials/:material_id", delete(talks::remove_material))
        .route("/talks/:id/reconcile", post(talks::reconcile))
        .route("/talks/:id/roster", get(talks::roster))
        // Ledger
        .route(
            "/talks/:id/registrations",
            post(registrations::register).delete(registrations::cancel),
        )
        .route("/registrations/:id/attendance", put(registrations::set_attendance))
        .route("/me/registrations", get(registrations::mine))
        // Live feeds
        .route("/talks/:id/live", get(live::talk_feed))
        .route("/me/live", get(live::participant_feed))
        // Certificates
        .route(
            "/talks/:id/certificate",
            get(certificates::validate).post(certificates::issue),
        )
        .route("/certificates/:token", get(certificates::verify))
        // Administration
        .route("/reports", get(reports::report))
        .route(
            "/users",
            get(users::list).post(users::upsert).put(users::set_role).delete(users::delete),
        );

    let auth_routes = Router::new()
        .route("/google/login", get(auth::login))
        .route("/google/callback", get(auth::callback))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me));

    Router::new()
        // Health checks (no authentication)
        .route("/health", get(health_check))
        .route("/ready", get(readiness))
        .nest("/auth", auth_routes)
        .nest("/api", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(correlation_id_layer())
                .layer(http_trace_layer())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
