use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Public Router Module
///
/// Endpoints reachable without a principal: browsing listings and the account flow.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Load balancer probe.
        .route("/health", get(handlers::health))
        // GET /listings
        .route("/listings", get(handlers::list_listings))
        // GET /listings/{id}
        // Missing listings redirect back to the collection with a notice.
        .route("/listings/{id}", get(handlers::show_listing))
        // GET/POST /signup
        .route("/signup", get(handlers::signup_form).post(handlers::signup))
        // GET/POST /login
        // A successful POST replays the path the Identity Gate remembered.
        .route("/login", get(handlers::login_form).post(handlers::login))
        // GET /logout
        .route("/logout", get(handlers::logout))
}
