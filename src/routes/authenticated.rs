use crate::{AppState, handlers};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
};

/// Authenticated Router Module
///
/// Routes behind the Identity Gate. The gate runs as a route layer before any handler, and
/// every handler also takes `AuthUser` so ownership and authorship checks can compare the
/// principal against the stored owner or author.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /listings/new
        .route("/listings/new", get(handlers::new_listing_form))
        // POST /listings
        // Validation, geocoding and the photo upload happen in this order.
        .route(
            "/listings",
            post(handlers::create_listing).layer(listing_form_limit()),
        )
        // GET /listings/{id}/edit
        // Owner only.
        .route("/listings/{id}/edit", get(handlers::edit_listing_form))
        // PUT/DELETE /listings/{id}
        // Owner only. HTML forms reach these through POST ?_method=PUT|DELETE.
        .route(
            "/listings/{id}",
            put(handlers::update_listing)
                .layer(listing_form_limit())
                .delete(handlers::delete_listing),
        )
        // POST /listings/{id}/reviews
        .route("/listings/{id}/reviews", post(handlers::create_review))
        // DELETE /listings/{id}/reviews/{review_id}
        // Author only.
        .route(
            "/listings/{id}/reviews/{review_id}",
            delete(handlers::delete_review),
        )
}

/// Listing forms carry a photo, so they get a larger body allowance than axum's default.
fn listing_form_limit() -> DefaultBodyLimit {
    DefaultBodyLimit::max(handlers::MAX_LISTING_FORM_BYTES)
}
